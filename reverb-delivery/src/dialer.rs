//! Opening outbound sessions.

use async_trait::async_trait;
use reverb_common::config::ClientTimeouts;
use reverb_smtp::client::{ClientError, SmtpClient};

use crate::smtp_transaction::{SmtpSession, stage};

/// An open SMTP session, past the greeting.
#[async_trait]
pub trait MailSession: Send {
    /// EHLO, falling back to HELO if the server refuses it.
    async fn hello(&mut self, helo: &str) -> Result<(), ClientError>;

    /// MAIL FROM, a single RCPT TO and the DATA transfer.
    async fn send_mail(&mut self, from: &str, to: &str, message: &[u8]) -> Result<(), ClientError>;

    async fn quit(&mut self) -> Result<(), ClientError>;
}

/// Connects to a candidate host.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Session: MailSession;

    /// Connects, greets with `helo`, upgrades with STARTTLS and greets again.
    /// The returned session is ready for [`MailSession::send_mail`].
    async fn dial_encrypted(&self, host: &str, helo: &str) -> Result<Self::Session, ClientError>;

    /// Connects and reads the greeting. [`MailSession::hello`] comes next.
    async fn dial_plain(&self, host: &str) -> Result<Self::Session, ClientError>;
}

/// Dials real exchangers over TCP.
#[derive(Debug, Clone)]
pub struct SmtpDialer {
    port: u16,
    timeouts: ClientTimeouts,
    accept_invalid_certs: bool,
}

impl SmtpDialer {
    #[must_use]
    pub const fn new(port: u16, timeouts: ClientTimeouts) -> Self {
        Self {
            port,
            timeouts,
            accept_invalid_certs: false,
        }
    }

    /// Skips certificate and host name checks after STARTTLS.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    async fn connect(&self, host: &str) -> Result<SmtpClient, ClientError> {
        let mut client =
            stage("connect", self.timeouts.connect(), SmtpClient::connect(host, self.port))
                .await?
                .accept_invalid_certs(self.accept_invalid_certs);

        stage("greeting", self.timeouts.ehlo(), client.read_greeting())
            .await?
            .expect_success()?;

        Ok(client)
    }
}

#[async_trait]
impl Dialer for SmtpDialer {
    type Session = SmtpSession;

    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self))]
    async fn dial_encrypted(&self, host: &str, helo: &str) -> Result<SmtpSession, ClientError> {
        let mut client = self.connect(host).await?;

        let ehlo = stage("EHLO", self.timeouts.ehlo(), client.ehlo(helo))
            .await?
            .expect_success()?;

        if !ehlo.has_extension("STARTTLS") {
            return Err(ClientError::TlsError(format!(
                "{host} does not advertise STARTTLS"
            )));
        }

        stage("STARTTLS", self.timeouts.starttls(), client.starttls()).await?;

        stage("EHLO", self.timeouts.ehlo(), client.ehlo(helo))
            .await?
            .expect_success()?;

        tracing::debug!(%host, "TLS negotiated via STARTTLS");
        Ok(SmtpSession::new(client, self.timeouts.clone()))
    }

    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self))]
    async fn dial_plain(&self, host: &str) -> Result<SmtpSession, ClientError> {
        let client = self.connect(host).await?;
        Ok(SmtpSession::new(client, self.timeouts.clone()))
    }
}
