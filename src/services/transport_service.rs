//! services/transport_service.rs
//! Sesión SMTP autenticada: se abre una por lote y se reutiliza para todos
//! los destinatarios del lote.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::Error as SmtpError;
use lettre::Message;

use crate::config::sender_config::{SmtpSettings, TlsMode};
use crate::error::{SenderError, SenderResult};

/// Una conexión abierta y autenticada.
#[async_trait]
pub trait TransportSession: Send {
    /// Falla con `Transmission` (por mensaje) o, si la sesión murió y no se
    /// pudo restablecer, con `Connection`/`Authentication`.
    async fn send(&mut self, message: &Message) -> SenderResult<()>;

    async fn close(self: Box<Self>);
}

/// Abre sesiones. Falla con `Authentication` o `Connection`.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn open(&self, settings: &SmtpSettings) -> SenderResult<Box<dyn TransportSession>>;
}

#[derive(Debug, Clone, Default)]
pub struct SmtpConnector;

#[async_trait]
impl TransportConnector for SmtpConnector {
    async fn open(&self, settings: &SmtpSettings) -> SenderResult<Box<dyn TransportSession>> {
        let conn = connect(settings).await?;

        log::info!(
            "Connected to SMTP server {}:{} as {}",
            settings.host,
            settings.port,
            settings.user
        );

        Ok(Box::new(SmtpSession {
            conn: Some(conn),
            settings: settings.clone(),
        }))
    }
}

/// Conecta, negocia TLS y autentica.
async fn connect(settings: &SmtpSettings) -> SenderResult<AsyncSmtpConnection> {
    let hello = ClientId::default();
    let tls = || {
        TlsParameters::new(settings.host.clone())
            .map_err(|e| SenderError::Connection(format!("invalid TLS parameters: {e}")))
    };

    let implicit_tls = match settings.tls {
        TlsMode::Implicit => Some(tls()?),
        TlsMode::StartTls | TlsMode::None => None,
    };

    let mut conn = AsyncSmtpConnection::connect_tokio1(
        (settings.host.as_str(), settings.port),
        Some(settings.timeout),
        &hello,
        implicit_tls,
        None,
    )
    .await
    .map_err(|e| {
        SenderError::Connection(format!(
            "could not connect to {}:{}: {e}",
            settings.host, settings.port
        ))
    })?;

    if settings.tls == TlsMode::StartTls {
        conn.starttls(tls()?, &hello)
            .await
            .map_err(|e| SenderError::Connection(format!("STARTTLS failed: {e}")))?;
    }

    let credentials = Credentials::new(settings.user.clone(), settings.password.clone());
    if let Err(e) = conn
        .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
        .await
    {
        conn.abort().await;
        return Err(if e.is_permanent() || e.is_client() {
            SenderError::Authentication(e.to_string())
        } else {
            SenderError::Connection(format!("authentication did not complete: {e}"))
        });
    }

    Ok(conn)
}

/// Ante cualquier respuesta de error, lettre cierra la conexión (QUIT); la
/// sesión la vuelve a abrir antes del siguiente envío.
struct SmtpSession {
    conn: Option<AsyncSmtpConnection>,
    settings: SmtpSettings,
}

impl SmtpSession {
    async fn live_connection(&mut self) -> SenderResult<&mut AsyncSmtpConnection> {
        let conn = match self.conn.take() {
            Some(conn) if !conn.has_broken() => conn,
            _ => {
                log::warn!(
                    "SMTP connection to {}:{} was closed, reconnecting",
                    self.settings.host,
                    self.settings.port
                );
                connect(&self.settings).await?
            }
        };
        Ok(self.conn.insert(conn))
    }
}

/// Clasifica un error de `send` sobre una conexión que sí estaba abierta.
fn classify_send_error(e: SmtpError) -> SenderError {
    if e.is_permanent() || e.is_client() {
        // 5xx, o lettre rechazó el sobre antes de escribir nada.
        SenderError::Transmission {
            message: e.to_string(),
            permanent: true,
        }
    } else if e.is_tls() {
        SenderError::Connection(e.to_string())
    } else {
        // 4xx, red o respuesta ilegible: el próximo intento reconecta.
        SenderError::transient(e.to_string())
    }
}

#[async_trait]
impl TransportSession for SmtpSession {
    async fn send(&mut self, message: &Message) -> SenderResult<()> {
        let timeout = self.settings.timeout;
        let conn = self.live_connection().await?;

        let sent = tokio::time::timeout(
            timeout,
            conn.send(message.envelope(), &message.formatted()),
        )
        .await;

        match sent {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(classify_send_error(e)),
            Err(_) => {
                // Estado del protocolo desconocido: se descarta la conexión.
                self.conn = None;
                Err(SenderError::transient(format!(
                    "send timed out after {:?}",
                    timeout
                )))
            }
        }
    }

    async fn close(mut self: Box<Self>) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if conn.has_broken() {
            return;
        }
        if let Err(e) = conn.quit().await {
            log::debug!("SMTP QUIT failed: {}", e);
        }
    }
}

