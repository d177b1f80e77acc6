//! error.rs
//! Errores de dominio del envío masivo.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SenderError {
    /// Archivo o columna inválida: se aborta antes de enviar nada.
    #[error("input error: {0}")]
    Input(String),

    /// Falta configuración (credenciales SMTP, límites inválidos).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("SMTP authentication error: {0}")]
    Authentication(String),

    #[error("SMTP connection error: {0}")]
    Connection(String),

    /// Fallo de un mensaje concreto. `permanent`: 5xx o sobre rechazado por el cliente.
    #[error("transmission error: {message}")]
    Transmission { message: String, permanent: bool },

    /// No se pudo persistir un resultado; rompe la deduplicación diaria.
    #[error("send log write failed: {0}")]
    LogWrite(String),

    #[error("send log read failed: {0}")]
    LogRead(String),
}

impl SenderError {
    pub fn transient(message: impl Into<String>) -> Self {
        SenderError::Transmission {
            message: message.into(),
            permanent: false,
        }
    }

    /// Errores que invalidan la sesión completa del lote.
    pub fn is_batch_level(&self) -> bool {
        matches!(
            self,
            SenderError::Authentication(_) | SenderError::Connection(_)
        )
    }
}

pub type SenderResult<T> = std::result::Result<T, SenderError>;
