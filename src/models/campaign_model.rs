//! models/campaign_model.rs
//! Parámetros de una campaña y su resumen final.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::sender_config::SenderConfig;
use crate::error::{SenderError, SenderResult};

pub const DEFAULT_SUBJECT: &str = "Hello from Your Company!";
pub const DEFAULT_BODY_TEMPLATE: &str =
    "Hi {name},\n\nThis is a test email.\n\nBest regards,\n{company_name}";

/// Inmutable durante la ejecución de la campaña.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub subject: String,
    pub body_template: String,
    pub total_per_day: usize,
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub dry_run: bool,
}

impl CampaignConfig {
    /// Toma los límites por defecto de la configuración global.
    pub fn from_sender_config(
        config: &SenderConfig,
        subject: impl Into<String>,
        body_template: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        CampaignConfig {
            subject: subject.into(),
            body_template: body_template.into(),
            total_per_day: config.total_per_day,
            batch_size: config.batch_size,
            batch_interval: config.batch_interval,
            dry_run,
        }
    }

    pub fn validate(&self) -> SenderResult<()> {
        if self.total_per_day == 0 {
            return Err(SenderError::Configuration(
                "total_per_day must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SenderError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.subject.trim().is_empty() {
            return Err(SenderError::Configuration("subject is empty".to_string()));
        }
        Ok(())
    }
}

/// Conteos por lote, devueltos por el batch sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub sent: usize,
    pub failed: usize,
    pub dry_run: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub requested: usize,
    pub already_sent_today: usize,
    pub eligible: usize,
    pub batches: usize,
    pub sent: usize,
    pub failed: usize,
    pub dry_run: usize,
}

impl CampaignSummary {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed + self.dry_run
    }

    pub fn absorb(&mut self, report: BatchReport) {
        self.sent += report.sent;
        self.failed += report.failed;
        self.dry_run += report.dry_run;
    }
}

/// POST /api/campaigns
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchCampaignRequest {
    /// Contenido CSV con columnas `email` y (opcional) `name`.
    pub csv: String,
    pub subject: Option<String>,
    pub body_template: Option<String>,
    pub total_per_day: Option<usize>,
    pub batch_size: Option<usize>,
    pub batch_interval_seconds: Option<u64>,
    #[serde(default)]
    pub dry_run: bool,
}

impl LaunchCampaignRequest {
    pub fn campaign_config(&self, defaults: &SenderConfig) -> CampaignConfig {
        let mut campaign = CampaignConfig::from_sender_config(
            defaults,
            self.subject.clone().unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            self.body_template
                .clone()
                .unwrap_or_else(|| DEFAULT_BODY_TEMPLATE.to_string()),
            self.dry_run,
        );
        if let Some(n) = self.total_per_day {
            campaign.total_per_day = n;
        }
        if let Some(n) = self.batch_size {
            campaign.batch_size = n;
        }
        if let Some(secs) = self.batch_interval_seconds {
            campaign.batch_interval = Duration::from_secs(secs);
        }
        campaign
    }
}
