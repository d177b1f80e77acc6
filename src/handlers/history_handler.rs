//! handlers/history_handler.rs
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{
    models::send_model::{HistoryResponse, SendStatus},
    services::send_log_service::{SendLog, SendLogService},
};

const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Deserialize)]
pub struct HistoryQuery {
    limit: Option<u32>,
}

/// GET /api/history
pub async fn list_history_endpoint(
    log_service: web::Data<SendLogService>,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    match log_service.recent(limit).await {
        Ok(items) => HttpResponse::Ok().json(HistoryResponse {
            total: items.len(),
            items,
        }),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Internal server error",
            "details": format!("{:?}", e)
        })),
    }
}

/// GET /api/history/today
pub async fn sent_today_endpoint(log_service: web::Data<SendLogService>) -> HttpResponse {
    match log_service.query_sent_today(&SendStatus::contacted()).await {
        Ok(emails) => {
            let mut emails: Vec<String> = emails.into_iter().collect();
            emails.sort();
            HttpResponse::Ok().json(json!({ "total": emails.len(), "emails": emails }))
        }
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Internal server error",
            "details": e.to_string()
        })),
    }
}

/// DELETE /api/history
pub async fn clear_history_endpoint(log_service: web::Data<SendLogService>) -> HttpResponse {
    match log_service.clear().await {
        Ok(removed) => HttpResponse::Ok().json(json!({
            "success": true,
            "removed": removed
        })),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": format!("{:?}", e)
        })),
    }
}
