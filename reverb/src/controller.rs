use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use reverb_common::{
    Signal,
    address::{AddressError, parse_mailbox},
    config::ServerTimeouts,
    internal, logging,
};
use reverb_delivery::{DeliveryConfig, DirectDelivery, DnsResolver, SmtpDialer};
use reverb_echo::{
    DkimConfig, Replier, ReplierIdentity, ReplyConfig, compose::is_single_address, dkim::Signer,
};
use reverb_smtp::{Listener, SessionConfig};
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::watch,
};

/// 10 MiB
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// The processor every accepted message goes through in production.
pub type Echo = Replier<DirectDelivery<DnsResolver, SmtpDialer>>;

/// Why a configuration was refused at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("hostname must be set")]
    MissingHostname,

    #[error("reply.from_address is not a single address: {0:?}")]
    FromAddress(String),

    #[error("reply.mail_from is not a valid mailbox {value:?}: {source}")]
    MailFrom {
        value: String,
        #[source]
        source: AddressError,
    },

    #[error("max_message_bytes must be greater than 0")]
    ZeroMessageSize,

    #[error("timeouts.{0} must be greater than 0")]
    ZeroTimeout(&'static str),

    #[error("dkim.{0} must be set")]
    MissingDkimField(&'static str),

    #[error("dkim.private_key_path does not exist: {}", .0.display())]
    MissingKeyFile(PathBuf),
}

/// The whole process, as read from `reverb.config.ron`.
#[derive(Debug, Clone, Deserialize)]
pub struct Reverb {
    /// Default: `0.0.0.0:25`
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Announced to clients, sent in EHLO and used for Message-IDs.
    #[serde(default)]
    pub hostname: String,

    /// Default: 10 MiB
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    #[serde(default)]
    pub timeouts: ServerTimeouts,

    #[serde(default)]
    pub reply: ReplyConfig,

    /// Replies go out unsigned when absent.
    #[serde(default)]
    pub dkim: Option<DkimConfig>,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 25))
}

const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

#[tracing::instrument(level = tracing::Level::TRACE, err)]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            interrupted?;
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

impl Reverb {
    /// Checks everything that can be checked without touching the network.
    ///
    /// # Errors
    ///
    /// The first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.trim().is_empty() {
            return Err(ConfigError::MissingHostname);
        }

        if !is_single_address(&self.reply.from_address) {
            return Err(ConfigError::FromAddress(self.reply.from_address.clone()));
        }

        parse_mailbox(&self.reply.mail_from).map_err(|source| ConfigError::MailFrom {
            value: self.reply.mail_from.clone(),
            source,
        })?;

        if self.max_message_bytes == 0 {
            return Err(ConfigError::ZeroMessageSize);
        }

        if self.timeouts.read_secs == 0 {
            return Err(ConfigError::ZeroTimeout("read_secs"));
        }

        if self.timeouts.write_secs == 0 {
            return Err(ConfigError::ZeroTimeout("write_secs"));
        }

        if let Some(dkim) = &self.dkim {
            if dkim.domain.is_empty() {
                return Err(ConfigError::MissingDkimField("domain"));
            }
            if dkim.selector.is_empty() {
                return Err(ConfigError::MissingDkimField("selector"));
            }
            if dkim.private_key_path.as_os_str().is_empty() {
                return Err(ConfigError::MissingDkimField("private_key_path"));
            }
            if !dkim.private_key_path.is_file() {
                return Err(ConfigError::MissingKeyFile(dkim.private_key_path.clone()));
            }
        }

        Ok(())
    }

    /// The signer, if one is configured. A key that cannot be used stops
    /// startup here rather than at the first reply.
    fn signer(&self) -> anyhow::Result<Option<Signer>> {
        self.dkim
            .as_ref()
            .map(|dkim| {
                Signer::from_config(dkim).with_context(|| {
                    format!("Failed to load DKIM key for {}", dkim.private_key_path.display())
                })
            })
            .transpose()
    }

    /// Builds the reply pipeline: signer, resolver, dialer and delivery.
    ///
    /// # Errors
    ///
    /// If the signing key is unusable or the resolver cannot be created.
    pub fn echo(&self) -> anyhow::Result<Echo> {
        let signer = self.signer()?;

        let resolver = DnsResolver::with_dns_config(self.delivery.dns.clone())
            .context("Failed to initialise DNS resolver")?;

        let tls = self.delivery.tls;
        if tls.accepts_invalid_certs() {
            internal!(
                level = WARN,
                "Certificate validation is disabled for outbound delivery"
            );
        }

        let dialer = SmtpDialer::new(self.delivery.port, self.delivery.timeouts.clone())
            .accept_invalid_certs(tls.accepts_invalid_certs());

        let delivery =
            DirectDelivery::new(resolver, dialer, self.hostname.clone(), self.reply.mail_from.clone())
                .with_tls_policy(tls.policy);

        let replier = Replier::new(ReplierIdentity::new(self.hostname.clone(), &self.reply), delivery);

        Ok(match signer {
            Some(signer) => replier.with_signer(signer),
            None => replier,
        })
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            hostname: self.hostname.clone(),
            max_message_bytes: self.max_message_bytes,
            timeouts: self.timeouts.clone(),
        }
    }

    /// Run the responder until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, a component fails to start, or the
    /// listener fails while serving.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        self.validate()?;

        internal!("Controller running");

        let echo = self.echo()?;
        let listener = Listener::bind(self.listen, self.session_config(), Arc::new(echo)).await?;
        internal!(level = INFO, "Listening on {}", listener.local_addr()?);

        let (sender, receiver) = watch::channel(Signal::Running);
        let mut serving = tokio::spawn(listener.serve(receiver));

        tokio::select! {
            served = &mut serving => {
                served.context("Listener task failed")??;
                internal!("Shutting down...");
                return Ok(());
            }
            signalled = shutdown() => signalled?,
        };

        sender.send_replace(Signal::Shutdown);
        internal!("Shutting down...");

        serving.await.context("Listener task failed")??;

        Ok(())
    }
}
