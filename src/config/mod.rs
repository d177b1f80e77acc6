//! config/mod.rs
//! Configuración global de la aplicación (leída del entorno una sola vez).

pub mod sender_config;
