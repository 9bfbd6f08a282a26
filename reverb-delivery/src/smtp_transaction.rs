//! One SMTP transaction over an open session.
//!
//! Each stage runs under its own timeout from [`ClientTimeouts`]. Any
//! failure ends the transaction; the engine decides what happens next.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reverb_common::config::ClientTimeouts;
use reverb_smtp::client::{ClientError, SmtpClient};

use crate::dialer::MailSession;

/// Runs `operation`, turning an expired `limit` into [`ClientError::Timeout`].
pub(crate) async fn stage<T>(
    name: &'static str,
    limit: Duration,
    operation: impl Future<Output = Result<T, ClientError>> + Send,
) -> Result<T, ClientError> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| ClientError::Timeout {
            stage: name,
            secs: limit.as_secs(),
        })?
}

/// A [`MailSession`] backed by a live [`SmtpClient`].
pub struct SmtpSession {
    client: SmtpClient,
    timeouts: ClientTimeouts,
}

impl SmtpSession {
    pub(crate) const fn new(client: SmtpClient, timeouts: ClientTimeouts) -> Self {
        Self { client, timeouts }
    }
}

#[async_trait]
impl MailSession for SmtpSession {
    async fn hello(&mut self, helo: &str) -> Result<(), ClientError> {
        let ehlo = stage("EHLO", self.timeouts.ehlo(), self.client.ehlo(helo)).await?;
        if ehlo.is_success() {
            return Ok(());
        }

        tracing::debug!(
            server = %self.client.server_domain(),
            response = %ehlo.message(),
            "EHLO refused, falling back to HELO"
        );

        stage("HELO", self.timeouts.ehlo(), self.client.helo(helo))
            .await?
            .expect_success()
            .map(|_| ())
    }

    async fn send_mail(&mut self, from: &str, to: &str, message: &[u8]) -> Result<(), ClientError> {
        stage("MAIL FROM", self.timeouts.mail_from(), self.client.mail_from(from))
            .await?
            .expect_success()?;

        stage("RCPT TO", self.timeouts.rcpt_to(), self.client.rcpt_to(to))
            .await?
            .expect_success()?;

        stage("DATA", self.timeouts.data(), self.client.data())
            .await?
            .expect(354)?;

        let accepted = stage("DATA", self.timeouts.data(), self.client.send_data(message))
            .await?
            .expect_success()?;

        tracing::debug!(
            server = %self.client.server_domain(),
            response = %accepted.message(),
            tls = self.client.is_tls(),
            "Message accepted"
        );

        Ok(())
    }

    async fn quit(&mut self) -> Result<(), ClientError> {
        stage("QUIT", self.timeouts.quit(), self.client.quit())
            .await?
            .expect_success()
            .map(|_| ())
    }
}
