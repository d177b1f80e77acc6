//! models/send_model.rs
//! Filas del historial de envíos (`sends`).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendStatus {
    #[serde(rename = "sent")]
    Sent,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "dry-run")]
    DryRun,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
            SendStatus::DryRun => "dry-run",
        }
    }

    /// Estados que cuentan como "ya contactado hoy".
    pub fn contacted() -> [SendStatus; 2] {
        [SendStatus::Sent, SendStatus::DryRun]
    }
}

impl TryFrom<String> for SendStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "sent" => Ok(SendStatus::Sent),
            "failed" => Ok(SendStatus::Failed),
            "dry-run" => Ok(SendStatus::DryRun),
            other => Err(format!("unknown send status '{other}'")),
        }
    }
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Una fila inmutable del log. `timestamp` lo asigna SQLite (UTC).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SendRecord {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: SendStatus,
    pub timestamp: NaiveDateTime,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub total: usize,
    pub items: Vec<SendRecord>,
}
