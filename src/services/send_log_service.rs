//! services/send_log_service.rs
//! Historial de envíos en SQLite: solo inserciones, consultas y borrado total.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite};

use crate::error::{SenderError, SenderResult};
use crate::models::send_model::{SendRecord, SendStatus};

/// Acceso al log de envíos. La implementación real es [`SendLogService`].
#[async_trait]
pub trait SendLog: Send + Sync {
    /// Inserta una fila. Un fallo aquí es `SenderError::LogWrite`.
    async fn record(
        &self,
        email: &str,
        name: Option<&str>,
        status: SendStatus,
        error: Option<&str>,
    ) -> SenderResult<()>;

    /// Emails con alguno de `statuses` registrado en el día `day` (UTC).
    async fn query_sent_on(
        &self,
        day: NaiveDate,
        statuses: &[SendStatus],
    ) -> SenderResult<HashSet<String>>;

    async fn query_sent_today(&self, statuses: &[SendStatus]) -> SenderResult<HashSet<String>> {
        self.query_sent_on(Utc::now().date_naive(), statuses).await
    }
}

#[derive(Clone, Debug)]
pub struct SendLogService {
    db_pool: Pool<Sqlite>,
}

impl SendLogService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        SendLogService { db_pool }
    }

    /// Crea la tabla `sends` si no existe. Idempotente.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run send log migrations")?;
        Ok(())
    }

    /// Últimos `limit` envíos, del más reciente al más antiguo.
    pub async fn recent(&self, limit: u32) -> Result<Vec<SendRecord>> {
        let rows = sqlx::query_as::<_, SendRecord>(
            r#"
            SELECT id, email, name, status, timestamp, error_message
            FROM sends
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.db_pool)
        .await;

        match rows {
            Ok(rows) => Ok(rows),
            Err(e) if is_missing_table(&e) => Ok(Vec::new()),
            Err(e) => Err(e).context("Failed to read send history"),
        }
    }

    /// Borra todo el historial. Devuelve cuántas filas se eliminaron.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sends")
            .execute(&self.db_pool)
            .await
            .context("Failed to clear send history")?;

        log::warn!("Send history cleared ({} rows)", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SendLog for SendLogService {
    async fn record(
        &self,
        email: &str,
        name: Option<&str>,
        status: SendStatus,
        error: Option<&str>,
    ) -> SenderResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sends (email, name, status, error_message)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(email)
        .bind(name)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.db_pool)
        .await
        .map_err(|e| {
            log::error!("Could not log '{}' for {}: {}", status, email, e);
            SenderError::LogWrite(format!("{email} ({status}): {e}"))
        })?;

        Ok(())
    }

    async fn query_sent_on(
        &self,
        day: NaiveDate,
        statuses: &[SendStatus],
    ) -> SenderResult<HashSet<String>> {
        if statuses.is_empty() {
            return Ok(HashSet::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT DISTINCT email FROM sends WHERE status IN (");
        let mut separated = query.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        query.push(") AND date(timestamp) = ");
        query.push_bind(day.format("%Y-%m-%d").to_string());

        let rows: std::result::Result<Vec<(String,)>, sqlx::Error> =
            query.build_query_as().fetch_all(&self.db_pool).await;

        match rows {
            Ok(rows) => Ok(rows.into_iter().map(|(email,)| email).collect()),
            // Primera ejecución: todavía no hay tabla, nadie fue contactado.
            Err(e) if is_missing_table(&e) => Ok(HashSet::new()),
            Err(e) => Err(SenderError::LogRead(format!(
                "could not read today's sends: {e}"
            ))),
        }
    }
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("no such table"))
}
