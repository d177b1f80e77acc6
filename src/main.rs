use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::sender_config::SenderConfig;
use crate::handlers::campaign_handler::CampaignSlot;
use crate::logger::init_logger;
use crate::models::campaign_model::{CampaignConfig, DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT};
use crate::models::recipient_model::load_recipients;
use crate::services::batch_sender_service::BatchSender;
use crate::services::campaign_service::CampaignService;
use crate::services::send_log_service::{SendLog, SendLogService};
use crate::services::transport_service::SmtpConnector;

mod app;
mod config;
mod error;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

#[derive(Parser)]
#[command(name = "bulk_sender", about = "Send personalized emails to a CSV recipient list")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a campaign to the recipients of a CSV file.
    Send {
        /// CSV with an `email` column and an optional `name` column.
        csv_file: PathBuf,
        /// Simulate sending without contacting the SMTP server.
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value = DEFAULT_SUBJECT)]
        subject: String,
        /// File with the body template ({name}, {company_name}, {unsubscribe_link}).
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
    /// Start the HTTP operator API.
    Serve,
    /// Print the latest send log rows.
    History {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Delete every row of the send log.
    ClearHistory {
        #[arg(long)]
        yes: bool,
    },
}

async fn setup_database(path: &Path) -> Result<Pool<Sqlite>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("No se pudo crear el directorio {}", dir.display()))?;
    }

    let db_url = format!("sqlite:{}", path.to_string_lossy());
    log::info!("Conectando a SQLite en {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite")?;

    Ok(db_pool)
}

fn build_campaign_service(
    config: &SenderConfig,
    log_service: &SendLogService,
) -> Result<CampaignService> {
    let send_log: Arc<dyn SendLog> = Arc::new(log_service.clone());
    let sender = BatchSender::new(config, send_log.clone(), Arc::new(SmtpConnector))?;
    Ok(CampaignService::new(send_log, sender))
}

async fn run_send(
    config: &SenderConfig,
    log_service: &SendLogService,
    csv_file: &Path,
    dry_run: bool,
    subject: String,
    body_file: Option<PathBuf>,
) -> Result<()> {
    let body_template = match body_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read body template {}", path.display()))?,
        None => DEFAULT_BODY_TEMPLATE.to_string(),
    };

    let recipients = load_recipients(csv_file)?;
    log::info!("Loaded {} recipients from {}", recipients.len(), csv_file.display());

    let campaign = CampaignConfig::from_sender_config(config, subject, body_template, dry_run);
    let service = build_campaign_service(config, log_service)?;

    let summary = service.run(&recipients, &campaign).await?;
    println!(
        "Campaign finished: {} emails attempted ({} sent, {} failed, {} dry-run, {} already contacted today).",
        summary.attempted(),
        summary.sent,
        summary.failed,
        summary.dry_run,
        summary.already_sent_today
    );
    Ok(())
}

async fn serve(config: SenderConfig, log_service: SendLogService) -> Result<()> {
    let campaign_service = web::Data::new(build_campaign_service(&config, &log_service)?);
    let log_service = web::Data::new(log_service);
    let slot = web::Data::new(CampaignSlot::default());
    let addr = config.server_addr.clone();
    let config = web::Data::new(config);

    log::info!("Levantando servidor en {}", addr);
    HttpServer::new(move || {
        App::new()
            // Las listas CSV viajan dentro del JSON
            .app_data(web::JsonConfig::default().limit(8 * 1024 * 1024))
            .app_data(campaign_service.clone())
            .app_data(log_service.clone())
            .app_data(slot.clone())
            .app_data(config.clone())
            .configure(app::init_app)
    })
    .workers(1)
    .bind(&addr)
    .with_context(|| format!("Could not bind {addr}"))?
    .run()
    .await
    .context("HTTP server error")
}

async fn run(cli: Cli) -> Result<()> {
    let config = SenderConfig::from_env()?;

    let db_pool = setup_database(&config.database_path).await?;
    let log_service = SendLogService::new(db_pool);
    log_service.initialize().await?;

    match cli.command {
        Command::Send {
            csv_file,
            dry_run,
            subject,
            body_file,
        } => run_send(&config, &log_service, &csv_file, dry_run, subject, body_file).await,
        Command::Serve => serve(config, log_service).await,
        Command::History { limit } => {
            for row in log_service.recent(limit).await? {
                println!(
                    "{:>6}  {}  {:<8}  {:<32}  {}  {}",
                    row.id,
                    row.timestamp,
                    row.status,
                    row.email,
                    row.name.as_deref().unwrap_or("-"),
                    row.error_message.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Command::ClearHistory { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear the send history without --yes");
            }
            let removed = log_service.clear().await?;
            println!("Send history has been cleared ({removed} rows).");
            Ok(())
        }
    }
}

#[actix_web::main]
async fn main() {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    if let Err(e) = run(Cli::parse()).await {
        log::error!("{:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
