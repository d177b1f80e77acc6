//! handlers/campaign_handler.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::{
    config::sender_config::SenderConfig,
    error::SenderError,
    models::{campaign_model::LaunchCampaignRequest, recipient_model::parse_recipients},
    services::campaign_service::CampaignService,
};

/// Marca de "hay una campaña en curso" en este proceso.
#[derive(Clone, Default)]
pub struct CampaignSlot(Arc<AtomicBool>);

impl CampaignSlot {
    fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// POST /api/campaigns
pub async fn launch_campaign_endpoint(
    campaign_service: web::Data<CampaignService>,
    sender_config: web::Data<SenderConfig>,
    slot: web::Data<CampaignSlot>,
    body: web::Json<LaunchCampaignRequest>,
) -> HttpResponse {
    let req = body.into_inner();
    let campaign = req.campaign_config(&sender_config);

    // Entrada y configuración se validan antes de lanzar nada.
    let recipients = match parse_recipients(req.csv.as_bytes()) {
        Ok(recipients) => recipients,
        Err(e) => return bad_request(&e),
    };
    if let Err(e) = campaign.validate() {
        return bad_request(&e);
    }
    if !campaign.dry_run {
        if let Err(e) = sender_config.require_smtp() {
            return bad_request(&e);
        }
    }

    if !slot.try_acquire() {
        return HttpResponse::Conflict().json(json!({
            "success": false,
            "error": "A campaign is already running"
        }));
    }

    let loaded = recipients.len();
    let service = campaign_service.clone();
    let slot = slot.get_ref().clone();

    tokio::spawn(async move {
        match service.run(&recipients, &campaign).await {
            Ok(summary) => log::info!(
                "Campaign finished: {} attempted ({} sent, {} failed, {} dry-run)",
                summary.attempted(),
                summary.sent,
                summary.failed,
                summary.dry_run
            ),
            Err(e) => log::error!("Campaign aborted: {}", e),
        }
        slot.release();
    });

    HttpResponse::Accepted().json(json!({
        "success": true,
        "recipients_loaded": loaded,
        "message": "Campaign started. Check /api/history for results."
    }))
}

fn bad_request(e: &SenderError) -> HttpResponse {
    log::warn!("Campaign rejected: {}", e);
    HttpResponse::BadRequest().json(json!({
        "success": false,
        "error": e.to_string()
    }))
}
