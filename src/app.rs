//! app.rs
use crate::handlers::{campaign_handler, history_handler};
use actix_web::web;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/campaigns").route(
                    "",
                    web::post().to(campaign_handler::launch_campaign_endpoint),
                ),
            )
            .service(
                web::scope("/history")
                    .route("", web::get().to(history_handler::list_history_endpoint))
                    .route("", web::delete().to(history_handler::clear_history_endpoint))
                    .route(
                        "/today",
                        web::get().to(history_handler::sent_today_endpoint),
                    ),
            ),
    );
}
