//! tests/support.rs
//! Dobles de prueba: transporte guionizado, servidor SMTP local, log que
//! falla y SQLite en memoria.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::Message;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::config::sender_config::{SenderConfig, SmtpSettings, TlsMode};
use crate::error::{SenderError, SenderResult};
use crate::models::recipient_model::Recipient;
use crate::models::send_model::{SendRecord, SendStatus};
use crate::services::batch_sender_service::{BatchSender, RetryPolicy};
use crate::services::send_log_service::{SendLog, SendLogService};
use crate::services::transport_service::{TransportConnector, TransportSession};

pub fn test_config() -> SenderConfig {
    SenderConfig {
        from_name: "Campaign Bot".to_string(),
        from_email: "bot@acme.test".to_string(),
        company_name: "Acme".to_string(),
        unsubscribe_link: "https://acme.test/unsubscribe".to_string(),
        smtp: Some(SmtpSettings {
            host: "smtp.acme.test".to_string(),
            port: 587,
            user: "bot".to_string(),
            password: "secret".to_string(),
            tls: TlsMode::StartTls,
            timeout: Duration::from_secs(5),
        }),
        per_email_delay: Duration::ZERO,
        batch_interval: Duration::ZERO,
        ..SenderConfig::default()
    }
}

pub fn recipients(emails: &[&str]) -> Vec<Recipient> {
    emails.iter().map(|e| Recipient::new(*e, None)).collect()
}

/// Pool de un solo connection: cada conexión a `:memory:` es otra base.
pub async fn memory_pool() -> Pool<Sqlite> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}

pub async fn memory_log() -> SendLogService {
    let log = SendLogService::new(memory_pool().await);
    log.initialize().await.expect("migrations");
    log
}

/// Filas en orden de inserción.
pub async fn all_rows(log: &SendLogService) -> Vec<SendRecord> {
    let mut rows = log.recent(10_000).await.expect("history");
    rows.sort_by_key(|r| r.id);
    rows
}

pub fn with_status(rows: &[SendRecord], status: SendStatus) -> Vec<String> {
    rows.iter()
        .filter(|r| r.status == status)
        .map(|r| r.email.clone())
        .collect()
}

pub fn fast_sender(
    config: &SenderConfig,
    log: Arc<dyn SendLog>,
    connector: Arc<dyn TransportConnector>,
) -> BatchSender {
    BatchSender::new(config, log, connector)
        .expect("batch sender")
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::ZERO,
        })
        .with_dry_run_pacing(Duration::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    Accept,
    RejectCredentials,
    Unreachable,
}

/// Cada llamada registrada por el transporte de prueba.
#[derive(Debug, Default)]
pub struct TransportCalls {
    pub opens: usize,
    pub closes: usize,
    /// Destinatario de cada `send`, incluidos los que fallaron.
    pub sends: Vec<String>,
    /// Mensajes formateados, en el mismo orden que `sends`.
    pub messages: Vec<String>,
}

/// Conector cuyo resultado de `send` sigue un guion; sin guion, todo se entrega.
#[derive(Clone)]
pub struct ScriptedConnector {
    open: OpenBehavior,
    script: Arc<Mutex<VecDeque<SenderResult<()>>>>,
    pub calls: Arc<Mutex<TransportCalls>>,
}

impl ScriptedConnector {
    pub fn new(open: OpenBehavior) -> Self {
        ScriptedConnector {
            open,
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(TransportCalls::default())),
        }
    }

    pub fn accepting() -> Self {
        Self::new(OpenBehavior::Accept)
    }

    pub fn then(self, result: SenderResult<()>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn opens(&self) -> usize {
        self.calls.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.calls.lock().unwrap().closes
    }

    pub fn sends(&self) -> Vec<String> {
        self.calls.lock().unwrap().sends.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn open(&self, _settings: &SmtpSettings) -> SenderResult<Box<dyn TransportSession>> {
        self.calls.lock().unwrap().opens += 1;
        match self.open {
            OpenBehavior::Accept => Ok(Box::new(ScriptedSession {
                script: self.script.clone(),
                calls: self.calls.clone(),
            })),
            OpenBehavior::RejectCredentials => Err(SenderError::Authentication(
                "535 5.7.8 Username and Password not accepted".to_string(),
            )),
            OpenBehavior::Unreachable => Err(SenderError::Connection(
                "could not connect to smtp.acme.test:587: connection refused".to_string(),
            )),
        }
    }
}

struct ScriptedSession {
    script: Arc<Mutex<VecDeque<SenderResult<()>>>>,
    calls: Arc<Mutex<TransportCalls>>,
}

#[async_trait]
impl TransportSession for ScriptedSession {
    async fn send(&mut self, message: &Message) -> SenderResult<()> {
        {
            let mut calls = self.calls.lock().unwrap();
            let to = message
                .envelope()
                .to()
                .first()
                .map(|a| a.to_string())
                .unwrap_or_default();
            calls.sends.push(to);
            calls
                .messages
                .push(String::from_utf8_lossy(&message.formatted()).into_owned());
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn close(self: Box<Self>) {
        self.calls.lock().unwrap().closes += 1;
    }
}

/// Log cuyas escrituras fallan siempre.
pub struct BrokenLog;

#[async_trait]
impl SendLog for BrokenLog {
    async fn record(
        &self,
        email: &str,
        _name: Option<&str>,
        _status: SendStatus,
        _error: Option<&str>,
    ) -> SenderResult<()> {
        Err(SenderError::LogWrite(format!("{email}: disk I/O error")))
    }

    async fn query_sent_on(
        &self,
        _day: NaiveDate,
        _statuses: &[SendStatus],
    ) -> SenderResult<HashSet<String>> {
        Ok(HashSet::new())
    }
}

/// Lo que vio el servidor SMTP local.
#[derive(Debug, Default)]
pub struct SmtpServerLog {
    pub connections: usize,
    /// Cada `RCPT TO`, aceptado o no.
    pub rcpt: Vec<String>,
    /// Destinatarios cuyo `DATA` terminó con 250.
    pub delivered: Vec<String>,
}

/// Servidor SMTP en 127.0.0.1 sin TLS. Acepta AUTH (o lo rechaza con 535)
/// y responde a cada `RCPT TO` según el guion de esa dirección; agotado el
/// guion, acepta. Sirve varias conexiones, como un servidor real.
pub struct LoopbackSmtp {
    pub port: u16,
    pub log: Arc<Mutex<SmtpServerLog>>,
}

impl LoopbackSmtp {
    pub async fn start(reject_auth: bool, rcpt_replies: &[(&str, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let port = listener.local_addr().expect("local addr").port();
        let log = Arc::new(Mutex::new(SmtpServerLog::default()));

        let mut script: HashMap<String, VecDeque<String>> = HashMap::new();
        for (address, reply) in rcpt_replies {
            script
                .entry(address.to_string())
                .or_default()
                .push_back(reply.to_string());
        }
        let script = Arc::new(Mutex::new(script));

        let server_log = log.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = server_log.clone();
                let script = script.clone();
                tokio::spawn(async move {
                    let _ = serve_smtp(stream, reject_auth, script, log).await;
                });
            }
        });

        LoopbackSmtp { port, log }
    }

    pub fn settings(&self) -> SmtpSettings {
        SmtpSettings {
            host: "127.0.0.1".to_string(),
            port: self.port,
            user: "bot".to_string(),
            password: "secret".to_string(),
            tls: TlsMode::None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn connections(&self) -> usize {
        self.log.lock().unwrap().connections
    }

    pub fn rcpt(&self) -> Vec<String> {
        self.log.lock().unwrap().rcpt.clone()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.log.lock().unwrap().delivered.clone()
    }
}

async fn serve_smtp(
    stream: TcpStream,
    reject_auth: bool,
    script: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    log: Arc<Mutex<SmtpServerLog>>,
) -> std::io::Result<()> {
    log.lock().unwrap().connections += 1;

    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    write.write_all(b"220 loopback.test ESMTP ready\r\n").await?;

    let mut current_rcpt: Option<String> = None;

    while let Some(line) = lines.next_line().await? {
        let command = line.to_ascii_uppercase();

        let reply = if command.starts_with("EHLO") || command.starts_with("HELO") {
            "250-loopback.test\r\n250-8BITMIME\r\n250 AUTH PLAIN LOGIN".to_string()
        } else if command.starts_with("AUTH") {
            if reject_auth {
                "535 5.7.8 Authentication credentials invalid".to_string()
            } else {
                "235 2.7.0 Authentication successful".to_string()
            }
        } else if command.starts_with("MAIL FROM") {
            current_rcpt = None;
            "250 2.1.0 OK".to_string()
        } else if command.starts_with("RCPT TO") {
            let address = line
                .split_once('<')
                .and_then(|(_, rest)| rest.split_once('>'))
                .map(|(address, _)| address.to_string())
                .unwrap_or_default();
            log.lock().unwrap().rcpt.push(address.clone());
            let scripted = script
                .lock()
                .unwrap()
                .get_mut(&address)
                .and_then(|replies| replies.pop_front());
            match scripted {
                Some(reply) => reply,
                None => {
                    current_rcpt = Some(address);
                    "250 2.1.5 OK".to_string()
                }
            }
        } else if command == "DATA" {
            write.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await?;
            while let Some(body_line) = lines.next_line().await? {
                if body_line == "." {
                    break;
                }
            }
            if let Some(address) = current_rcpt.take() {
                log.lock().unwrap().delivered.push(address);
            }
            "250 2.0.0 Queued".to_string()
        } else if command == "QUIT" {
            write.write_all(b"221 2.0.0 Bye\r\n").await?;
            return Ok(());
        } else if command == "RSET" || command == "NOOP" {
            "250 2.0.0 OK".to_string()
        } else {
            "502 5.5.2 Command not recognized".to_string()
        };

        write.write_all(reply.as_bytes()).await?;
        write.write_all(b"\r\n").await?;
    }

    Ok(())
}
