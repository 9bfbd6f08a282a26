use core::fmt::{self, Display, Formatter};

use reverb_common::Cancelled;
use thiserror::Error;

use crate::dns::DnsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Failed(String),
}

/// What happened at one candidate host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub host: String,
    pub outcome: AttemptOutcome,
}

impl DeliveryAttempt {
    pub fn delivered(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            outcome: AttemptOutcome::Delivered,
        }
    }

    pub fn failed(host: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            outcome: AttemptOutcome::Failed(detail.into()),
        }
    }
}

impl Display for DeliveryAttempt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Delivered => write!(f, "{}: delivered", self.host),
            AttemptOutcome::Failed(detail) => write!(f, "{}: {detail}", self.host),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid recipient address: {0}")]
    Address(String),

    #[error("delivery cancelled: {0}")]
    Cancelled(#[from] Cancelled),

    /// Every candidate host failed. The lookup failure, if there was one,
    /// is reported first.
    #[error("delivery failed for {recipient}: {}", summarize(.resolution.as_ref(), .attempts))]
    Exhausted {
        recipient: String,
        attempts: Vec<DeliveryAttempt>,
        resolution: Option<DnsError>,
    },
}

fn summarize(resolution: Option<&DnsError>, attempts: &[DeliveryAttempt]) -> String {
    resolution
        .map(|err| format!("mx lookup: {err}"))
        .into_iter()
        .chain(attempts.iter().map(ToString::to_string))
        .collect::<Vec<_>>()
        .join(" | ")
}
