//! services/campaign_service.rs
//! Orquestador de campañas: filtra quién ya recibió correo hoy, aplica el
//! tope diario, parte en lotes y los envía con pausa entre lotes.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{SenderError, SenderResult};
use crate::models::campaign_model::{CampaignConfig, CampaignSummary};
use crate::models::recipient_model::Recipient;
use crate::models::send_model::SendStatus;
use crate::services::batch_sender_service::BatchSender;
use crate::services::send_log_service::SendLog;

/// Destinatarios que aún no se contactaron hoy, en el orden original,
/// sin duplicados y truncados a `total_per_day`.
pub fn eligible_recipients(
    recipients: &[Recipient],
    already_sent_today: &HashSet<String>,
    total_per_day: usize,
) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    recipients
        .iter()
        .filter(|r| !already_sent_today.contains(&r.email))
        .filter(|r| seen.insert(r.email.clone()))
        .take(total_per_day)
        .cloned()
        .collect()
}

/// Lotes consecutivos de `batch_size`; el último puede ser menor.
pub fn partition(eligible: &[Recipient], batch_size: usize) -> Vec<&[Recipient]> {
    eligible.chunks(batch_size.max(1)).collect()
}

pub struct CampaignService {
    log: Arc<dyn SendLog>,
    sender: BatchSender,
}

impl CampaignService {
    pub fn new(log: Arc<dyn SendLog>, sender: BatchSender) -> Self {
        CampaignService { log, sender }
    }

    /// Validar -> filtrar -> (lote -> envío -> pausa)* -> fin.
    ///
    /// Errores de entrada o configuración abortan antes de escribir en el log.
    /// Sin destinatarios nuevos no hace falta SMTP: la ejecución es un no-op.
    /// Los fallos de lote o de mensaje quedan registrados y no detienen la
    /// campaña; solo un fallo de escritura en el log la interrumpe.
    pub async fn run(
        &self,
        recipients: &[Recipient],
        campaign: &CampaignConfig,
    ) -> SenderResult<CampaignSummary> {
        self.validate(recipients, campaign)?;

        let already_sent = self.log.query_sent_today(&SendStatus::contacted()).await?;
        let eligible = eligible_recipients(recipients, &already_sent, campaign.total_per_day);

        let mut summary = CampaignSummary {
            requested: recipients.len(),
            already_sent_today: recipients
                .iter()
                .map(|r| r.email.as_str())
                .filter(|email| already_sent.contains(*email))
                .collect::<HashSet<_>>()
                .len(),
            eligible: eligible.len(),
            ..Default::default()
        };

        if eligible.is_empty() {
            log::info!("No new recipients to send to today.");
            return Ok(summary);
        }

        if !campaign.dry_run && !self.sender.has_transport_settings() {
            return Err(SenderError::Configuration(
                "SMTP settings are not configured (SMTP_HOST, SMTP_USER, SMTP_PASSWORD)"
                    .to_string(),
            ));
        }

        log::info!("Found {} emails to send.", eligible.len());

        let batches = partition(&eligible, campaign.batch_size);
        summary.batches = batches.len();

        for (i, batch) in batches.iter().enumerate() {
            log::info!(
                "--- Starting Batch {}/{} ({} recipients) ---",
                i + 1,
                batches.len(),
                batch.len()
            );

            let report = self
                .sender
                .send_batch(batch, &campaign.subject, &campaign.body_template, campaign.dry_run)
                .await?;
            summary.absorb(report);

            log::info!(
                "--- Batch {}/{} finished: {} sent, {} failed, {} dry-run ---",
                i + 1,
                batches.len(),
                report.sent,
                report.failed,
                report.dry_run
            );

            if i + 1 < batches.len() {
                log::info!(
                    "--- Waiting {} seconds before next batch ---",
                    campaign.batch_interval.as_secs()
                );
                tokio::time::sleep(campaign.batch_interval).await;
            }
        }

        log::info!(
            "All batches processed: {} emails attempted.",
            summary.attempted()
        );
        Ok(summary)
    }

    fn validate(&self, recipients: &[Recipient], campaign: &CampaignConfig) -> SenderResult<()> {
        campaign.validate()?;

        if let Some(r) = recipients.iter().find(|r| r.email.trim().is_empty()) {
            return Err(SenderError::Input(format!(
                "recipient {:?} has no email",
                r.name.as_deref().unwrap_or("<unnamed>")
            )));
        }

        Ok(())
    }
}
