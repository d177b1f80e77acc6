//! services/mod.rs
//! Módulo que agrupa distintos "servicios" o "capas de negocio" de la app.

pub mod batch_sender_service;
pub mod campaign_service;
pub mod message_builder;
pub mod send_log_service;
pub mod transport_service;
