//! MX resolution for direct delivery.
//!
//! Every lookup goes to the system resolver; nothing is cached. Ordering
//! and the fallback to the bare domain belong to the engine, so a resolver
//! only reports what DNS said.

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::{
    ResolveError, TokioResolver, config::ResolverOpts, name_server::TokioConnectionProvider,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS lookup failed: {0}")]
    LookupFailed(#[from] ResolveError),

    #[error("DNS query timed out for domain: {0}")]
    Timeout(String),

    #[error("Failed to initialise resolver: {0}")]
    Init(#[source] ResolveError),
}

/// One MX answer, as returned by DNS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    /// Lower is preferred.
    pub preference: u16,
    /// May carry the trailing root `.`.
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

/// Domain to MX answers.
///
/// A domain that exists but has no MX records is `Ok(vec![])`, not an error.
#[async_trait]
pub trait MxResolver: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Per-query timeout.
    ///
    /// Default: 5 seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    5
}

/// Queries per lookup before the resolver gives up.
const ATTEMPTS: usize = 2;

impl DnsConfig {
    /// Upper bound on one whole lookup, retries included.
    pub const fn lookup_budget(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.saturating_mul(ATTEMPTS as u64 + 1))
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug)]
pub struct DnsResolver {
    resolver: TokioResolver,
    config: DnsConfig,
}

impl DnsResolver {
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new() -> Result<Self, DnsError> {
        Self::with_dns_config(DnsConfig::default())
    }

    /// # Errors
    ///
    /// Returns an error if the resolver cannot be initialized.
    pub fn with_dns_config(config: DnsConfig) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);
        opts.attempts = ATTEMPTS;

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())
            .map_err(DnsError::Init)?
            .with_options(opts)
            .build();

        Ok(Self { resolver, config })
    }
}

#[async_trait]
impl MxResolver for DnsResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        debug!("Resolving MX records for domain: {domain}");

        let lookup = tokio::time::timeout(self.config.lookup_budget(), self.resolver.mx_lookup(domain))
            .await
            .map_err(|_| DnsError::Timeout(domain.to_string()))?;

        match lookup {
            Ok(mx_lookup) => {
                let records: Vec<MxRecord> = mx_lookup
                    .iter()
                    .map(|mx| {
                        let record = MxRecord::new(mx.preference(), mx.exchange().to_utf8());
                        debug!(
                            "Found MX record: {} (preference: {})",
                            record.exchange, record.preference
                        );
                        record
                    })
                    .collect();

                Ok(records)
            }
            Err(err) if err.is_no_records_found() => {
                debug!("No MX records found for {domain}");
                Ok(Vec::new())
            }
            Err(err) => {
                warn!("MX lookup failed for {domain}: {err}");
                Err(DnsError::LookupFailed(err))
            }
        }
    }
}
