//! Direct delivery: resolve, order, and try each exchanger until one
//! accepts the message.

use async_trait::async_trait;
use reverb_common::{CancelScope, config::TlsPolicy};
use tracing::{debug, info, warn};

use crate::{
    dialer::{Dialer, MailSession},
    dns::{DnsError, MxRecord, MxResolver},
    error::{DeliveryAttempt, DeliveryError},
};

/// Sends one finished message to one recipient.
#[async_trait]
pub trait Deliver: Send + Sync + 'static {
    /// The attempt that succeeded.
    async fn deliver(
        &self,
        recipient: &str,
        message: &[u8],
        scope: &CancelScope,
    ) -> Result<DeliveryAttempt, DeliveryError>;
}

/// The text after the last `@`.
///
/// # Errors
///
/// [`DeliveryError::Address`] when there is no `@`, or nothing on one side of it.
pub fn recipient_domain(recipient: &str) -> Result<&str, DeliveryError> {
    match recipient.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(domain),
        _ => Err(DeliveryError::Address(recipient.to_string())),
    }
}

/// Orders MX answers into the hosts to try.
///
/// Lower preference first, resolver order kept on ties, root `.` removed.
/// With nothing usable, the domain itself is the only host.
pub fn candidate_hosts(mut records: Vec<MxRecord>, domain: &str) -> Vec<String> {
    records.sort_by_key(|record| record.preference);

    let hosts: Vec<String> = records
        .into_iter()
        .map(|record| record.exchange.trim_end_matches('.').to_string())
        .filter(|host| !host.is_empty())
        .collect();

    if hosts.is_empty() {
        vec![domain.to_string()]
    } else {
        hosts
    }
}

pub struct DirectDelivery<R, D> {
    resolver: R,
    dialer: D,
    /// Sent in EHLO/HELO.
    hostname: String,
    /// Reverse-path for every outbound transaction.
    mail_from: String,
    tls: TlsPolicy,
}

impl<R: MxResolver, D: Dialer> DirectDelivery<R, D> {
    pub fn new(
        resolver: R,
        dialer: D,
        hostname: impl Into<String>,
        mail_from: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            dialer,
            hostname: hostname.into(),
            mail_from: mail_from.into(),
            tls: TlsPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_tls_policy(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    async fn resolve(&self, domain: &str) -> (Vec<String>, Option<DnsError>) {
        match self.resolver.lookup_mx(domain).await {
            Ok(records) => {
                if records.is_empty() {
                    debug!("No MX records for {domain}, delivering to the domain directly");
                }
                (candidate_hosts(records, domain), None)
            }
            Err(err) => {
                warn!("MX lookup for {domain} failed, delivering to the domain directly: {err}");
                (vec![domain.to_string()], Some(err))
            }
        }
    }

    /// A session ready for MAIL FROM, following the TLS policy.
    async fn open(&self, host: &str) -> Result<D::Session, String> {
        let mut encrypted_failure = None;

        if self.tls.attempts_tls() {
            match self.dialer.dial_encrypted(host, &self.hostname).await {
                Ok(session) => return Ok(session),
                Err(err) if !self.tls.allows_plaintext() => {
                    return Err(format!("starttls: {err}"));
                }
                Err(err) => {
                    debug!(%host, "Encrypted session failed, retrying in plaintext: {err}");
                    encrypted_failure = Some(err);
                }
            }
        }

        let mut session = self.dialer.dial_plain(host).await.map_err(|err| {
            encrypted_failure.map_or_else(
                || err.to_string(),
                |tls| format!("starttls: {tls}; plaintext: {err}"),
            )
        })?;

        session
            .hello(&self.hostname)
            .await
            .map_err(|err| format!("hello: {err}"))?;

        Ok(session)
    }

    async fn attempt(&self, host: &str, recipient: &str, message: &[u8]) -> Result<(), String> {
        let mut session = self.open(host).await?;

        session
            .send_mail(&self.mail_from, recipient, message)
            .await
            .map_err(|err| err.to_string())?;

        if let Err(err) = session.quit().await {
            warn!(%host, "QUIT failed after the message was accepted: {err}");
        }

        Ok(())
    }
}

#[async_trait]
impl<R, D> Deliver for DirectDelivery<R, D>
where
    R: MxResolver + 'static,
    D: Dialer + 'static,
{
    #[tracing::instrument(level = tracing::Level::INFO, skip(self, message, scope), fields(bytes = message.len()))]
    async fn deliver(
        &self,
        recipient: &str,
        message: &[u8],
        scope: &CancelScope,
    ) -> Result<DeliveryAttempt, DeliveryError> {
        let domain = recipient_domain(recipient)?;
        let (hosts, resolution) = self.resolve(domain).await;
        let mut attempts = Vec::with_capacity(hosts.len());

        for host in hosts {
            scope.check()?;

            match self.attempt(&host, recipient, message).await {
                Ok(()) => {
                    info!(%host, %recipient, "Delivered");
                    return Ok(DeliveryAttempt::delivered(host));
                }
                Err(detail) => {
                    warn!(%host, %recipient, "Delivery attempt failed: {detail}");
                    attempts.push(DeliveryAttempt::failed(host, detail));
                }
            }
        }

        Err(DeliveryError::Exhausted {
            recipient: recipient.to_string(),
            attempts,
            resolution,
        })
    }
}
