//! tests/mod.rs
//! Pruebas unitarias del envío masivo.

mod support;
