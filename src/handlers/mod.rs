//! handlers/mod.rs
//! Módulo que agrupa los distintos handlers (campañas e historial).
pub mod campaign_handler;
pub mod history_handler;
