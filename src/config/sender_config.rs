//! config/sender_config.rs
//! Configuración del remitente, del transporte SMTP y de los límites de envío.
//! Se construye una vez al arrancar y se pasa explícitamente a los servicios.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::{SenderError, SenderResult};

pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_PER_EMAIL_DELAY_SEC: f64 = 1.0;
pub const DEFAULT_TOTAL_PER_DAY: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_BATCH_INTERVAL_SEC: u64 = 600;

/// Modo TLS del transporte ("starttls", "tls" o "none").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    StartTls,
    Implicit,
    None,
}

impl TlsMode {
    fn parse(raw: &str) -> SenderResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "starttls" => Ok(TlsMode::StartTls),
            "tls" | "ssl" => Ok(TlsMode::Implicit),
            "none" => Ok(TlsMode::None),
            other => Err(SenderError::Configuration(format!(
                "SMTP_TLS must be starttls, tls or none (got '{other}')"
            ))),
        }
    }
}

/// Qué hacer con placeholders que no son {name}, {company_name} ni {unsubscribe_link}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderPolicy {
    /// Se dejan literales en el cuerpo.
    #[default]
    Keep,
    /// El mensaje no se construye (`SenderError::Template`).
    Reject,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub tls: TlsMode,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub from_name: String,
    pub from_email: String,
    pub company_name: String,
    pub unsubscribe_link: String,

    /// `None` si falta host, usuario o contraseña.
    pub smtp: Option<SmtpSettings>,

    pub per_email_delay: Duration,
    pub total_per_day: usize,
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub placeholder_policy: PlaceholderPolicy,

    pub database_path: PathBuf,
    pub server_addr: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            from_name: "Your Name".to_string(),
            from_email: "your_email@example.com".to_string(),
            company_name: "Your Company".to_string(),
            unsubscribe_link: "#".to_string(),
            smtp: None,
            per_email_delay: Duration::from_secs_f64(DEFAULT_PER_EMAIL_DELAY_SEC),
            total_per_day: DEFAULT_TOTAL_PER_DAY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: Duration::from_secs(DEFAULT_BATCH_INTERVAL_SEC),
            placeholder_policy: PlaceholderPolicy::Keep,
            database_path: PathBuf::from("data").join("send_history.db"),
            server_addr: "0.0.0.0:5022".to_string(),
        }
    }
}

impl SenderConfig {
    /// Lee la configuración de las variables de entorno (después de `dotenv()`).
    pub fn from_env() -> SenderResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Igual que `from_env`, pero con una fuente de variables inyectable.
    pub fn from_lookup<F>(lookup: F) -> SenderResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = SenderConfig::default();

        let smtp = match (get("SMTP_HOST"), get("SMTP_USER"), get("SMTP_PASSWORD")) {
            (Some(host), Some(user), Some(password)) => Some(SmtpSettings {
                host,
                port: parse_or("SMTP_PORT", get("SMTP_PORT"), DEFAULT_SMTP_PORT)?,
                user,
                password,
                tls: TlsMode::parse(&get("SMTP_TLS").unwrap_or_default())?,
                timeout: Duration::from_secs(parse_or("SMTP_TIMEOUT_SEC", get("SMTP_TIMEOUT_SEC"), 30)?),
            }),
            _ => None,
        };

        let per_email_delay = parse_seconds(
            "PER_EMAIL_DELAY_SEC",
            get("PER_EMAIL_DELAY_SEC"),
            DEFAULT_PER_EMAIL_DELAY_SEC,
        )?;

        let placeholder_policy = match get("UNKNOWN_PLACEHOLDERS").as_deref() {
            None | Some("keep") => PlaceholderPolicy::Keep,
            Some("reject") => PlaceholderPolicy::Reject,
            Some(other) => {
                return Err(SenderError::Configuration(format!(
                    "UNKNOWN_PLACEHOLDERS must be keep or reject (got '{other}')"
                )))
            }
        };

        let config = SenderConfig {
            from_name: get("FROM_NAME").unwrap_or(defaults.from_name),
            from_email: get("FROM_EMAIL").unwrap_or(defaults.from_email),
            company_name: get("COMPANY_NAME").unwrap_or(defaults.company_name),
            unsubscribe_link: get("UNSUBSCRIBE_LINK").unwrap_or(defaults.unsubscribe_link),
            smtp,
            per_email_delay,
            total_per_day: parse_or("TOTAL_PER_DAY", get("TOTAL_PER_DAY"), DEFAULT_TOTAL_PER_DAY)?,
            batch_size: parse_or("BATCH_SIZE", get("BATCH_SIZE"), DEFAULT_BATCH_SIZE)?,
            batch_interval: Duration::from_secs(parse_or(
                "BATCH_INTERVAL_SEC",
                get("BATCH_INTERVAL_SEC"),
                DEFAULT_BATCH_INTERVAL_SEC,
            )?),
            placeholder_policy,
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            server_addr: get("SERVER_ADDR").unwrap_or(defaults.server_addr),
        };

        if config.total_per_day == 0 || config.batch_size == 0 {
            return Err(SenderError::Configuration(
                "TOTAL_PER_DAY and BATCH_SIZE must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    /// Credenciales SMTP o error de configuración (sin credenciales no se envía nada).
    pub fn require_smtp(&self) -> SenderResult<&SmtpSettings> {
        self.smtp.as_ref().ok_or_else(|| {
            SenderError::Configuration(
                "SMTP_HOST, SMTP_USER and SMTP_PASSWORD must be set".to_string(),
            )
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> SenderResult<T> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| SenderError::Configuration(format!("{key} has an invalid value: '{v}'"))),
    }
}

fn parse_seconds(key: &str, raw: Option<String>, default: f64) -> SenderResult<Duration> {
    let secs: f64 = parse_or(key, raw, default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| SenderError::Configuration(format!("{key} must be a non-negative number")))
}
