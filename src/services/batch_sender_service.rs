//! services/batch_sender_service.rs
//! Envía un lote sobre una única sesión SMTP, con reintentos por mensaje,
//! y deja exactamente una fila en el log por destinatario.

use std::sync::Arc;
use std::time::Duration;

use crate::config::sender_config::{SenderConfig, SmtpSettings};
use crate::error::{SenderError, SenderResult};
use crate::models::campaign_model::BatchReport;
use crate::models::recipient_model::Recipient;
use crate::models::send_model::SendStatus;
use crate::services::message_builder::MessageBuilder;
use crate::services::send_log_service::SendLog;
use crate::services::transport_service::{TransportConnector, TransportSession};

/// Pausa simulada por destinatario en modo dry-run.
pub const DRY_RUN_PACING: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Intentos totales por destinatario (no reintentos).
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Espera tras el intento `attempt` (base 0): 1s, 2s, 4s...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt)
    }
}

/// Resultado de un único intento de envío.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure(String),
    TerminalFailure(String),
}

impl AttemptOutcome {
    /// Clasifica un error de envío. Los errores de conexión no son de un
    /// mensaje sino de la sesión: se devuelven como `Err`.
    pub fn from_error(err: SenderError) -> SenderResult<Self> {
        match err {
            SenderError::Transmission {
                message,
                permanent: false,
            } => Ok(AttemptOutcome::TransientFailure(message)),
            SenderError::Transmission {
                message,
                permanent: true,
            } => Ok(AttemptOutcome::TerminalFailure(message)),
            e if e.is_batch_level() => Err(e),
            e @ (SenderError::LogWrite(_) | SenderError::LogRead(_)) => Err(e),
            other => Ok(AttemptOutcome::TerminalFailure(other.to_string())),
        }
    }
}

enum Delivery {
    Sent,
    Failed(String),
}

pub struct BatchSender {
    log: Arc<dyn SendLog>,
    connector: Arc<dyn TransportConnector>,
    builder: MessageBuilder,
    smtp: Option<SmtpSettings>,
    per_email_delay: Duration,
    dry_run_pacing: Duration,
    retry: RetryPolicy,
}

impl BatchSender {
    pub fn new(
        config: &SenderConfig,
        log: Arc<dyn SendLog>,
        connector: Arc<dyn TransportConnector>,
    ) -> SenderResult<Self> {
        Ok(BatchSender {
            log,
            connector,
            builder: MessageBuilder::new(config)?,
            smtp: config.smtp.clone(),
            per_email_delay: config.per_email_delay,
            dry_run_pacing: DRY_RUN_PACING,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dry_run_pacing(mut self, pacing: Duration) -> Self {
        self.dry_run_pacing = pacing;
        self
    }

    pub fn has_transport_settings(&self) -> bool {
        self.smtp.is_some()
    }

    /// Envía el lote en orden. Solo devuelve `Err` si no se pudo escribir en
    /// el log (o falta configuración SMTP); cualquier otro fallo queda
    /// registrado como `failed` por destinatario.
    pub async fn send_batch(
        &self,
        recipients: &[Recipient],
        subject: &str,
        body_template: &str,
        dry_run: bool,
    ) -> SenderResult<BatchReport> {
        let mut report = BatchReport::default();

        if dry_run {
            for recipient in recipients {
                log::info!("  [DRY RUN] Would send to {}", recipient.email);
                self.record(recipient, SendStatus::DryRun, None).await?;
                report.dry_run += 1;
                tokio::time::sleep(self.dry_run_pacing).await;
                self.pace().await;
            }
            return Ok(report);
        }

        let settings = self.smtp.as_ref().ok_or_else(|| {
            SenderError::Configuration("SMTP settings are not configured".to_string())
        })?;

        let mut session = match self.connector.open(settings).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("Could not open SMTP session for batch: {}", e);
                self.fail_all(recipients, &e.to_string(), &mut report).await?;
                return Ok(report);
            }
        };

        let outcome = self
            .send_with_session(session.as_mut(), recipients, subject, body_template, &mut report)
            .await;
        session.close().await;

        outcome.map(|_| report)
    }

    async fn send_with_session(
        &self,
        session: &mut dyn TransportSession,
        recipients: &[Recipient],
        subject: &str,
        body_template: &str,
        report: &mut BatchReport,
    ) -> SenderResult<()> {
        for (i, recipient) in recipients.iter().enumerate() {
            log::info!("Processing email to: {}", recipient.email);

            match self.deliver(session, recipient, subject, body_template).await {
                Ok(Delivery::Sent) => {
                    log::info!("  Successfully sent to {}", recipient.email);
                    self.record(recipient, SendStatus::Sent, None).await?;
                    report.sent += 1;
                }
                Ok(Delivery::Failed(reason)) => {
                    log::error!("  Giving up on {}: {}", recipient.email, reason);
                    self.record(recipient, SendStatus::Failed, Some(&reason)).await?;
                    report.failed += 1;
                }
                Err(e @ (SenderError::LogWrite(_) | SenderError::LogRead(_))) => return Err(e),
                Err(e) => {
                    // La sesión ya no sirve: el resto del lote queda como fallido.
                    log::error!("SMTP session lost during batch: {}", e);
                    self.fail_all(&recipients[i..], &e.to_string(), report).await?;
                    return Ok(());
                }
            }

            self.pace().await;
        }

        Ok(())
    }

    async fn deliver(
        &self,
        session: &mut dyn TransportSession,
        recipient: &Recipient,
        subject: &str,
        body_template: &str,
    ) -> SenderResult<Delivery> {
        let mut last_error = String::from("no delivery attempt was made");

        for attempt in 0..self.retry.max_attempts {
            match self.attempt(session, recipient, subject, body_template).await? {
                AttemptOutcome::Success => return Ok(Delivery::Sent),
                AttemptOutcome::TerminalFailure(reason) => return Ok(Delivery::Failed(reason)),
                AttemptOutcome::TransientFailure(reason) => {
                    log::warn!(
                        "  Attempt {} failed for {}: {}",
                        attempt + 1,
                        recipient.email,
                        reason
                    );
                    last_error = reason;
                    if attempt + 1 < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        Ok(Delivery::Failed(last_error))
    }

    /// Cada intento construye un mensaje nuevo.
    async fn attempt(
        &self,
        session: &mut dyn TransportSession,
        recipient: &Recipient,
        subject: &str,
        body_template: &str,
    ) -> SenderResult<AttemptOutcome> {
        let message = match self.builder.build(recipient, subject, body_template) {
            Ok(message) => message,
            Err(e) => return Ok(AttemptOutcome::TerminalFailure(e.to_string())),
        };

        match session.send(&message).await {
            Ok(()) => Ok(AttemptOutcome::Success),
            Err(e) => AttemptOutcome::from_error(e),
        }
    }

    async fn fail_all(
        &self,
        recipients: &[Recipient],
        reason: &str,
        report: &mut BatchReport,
    ) -> SenderResult<()> {
        for recipient in recipients {
            self.record(recipient, SendStatus::Failed, Some(reason)).await?;
            report.failed += 1;
            self.pace().await;
        }
        Ok(())
    }

    async fn record(
        &self,
        recipient: &Recipient,
        status: SendStatus,
        error: Option<&str>,
    ) -> SenderResult<()> {
        self.log
            .record(&recipient.email, recipient.name.as_deref(), status, error)
            .await
    }

    /// Espera tras cada destinatario registrado, también tras el último.
    async fn pace(&self) {
        if !self.per_email_delay.is_zero() {
            tokio::time::sleep(self.per_email_delay).await;
        }
    }
}
