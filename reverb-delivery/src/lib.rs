//! Direct delivery of a reply to the recipient domain's exchangers.
//!
//! - [`dns`]: MX lookups behind the [`MxResolver`] trait
//! - [`dialer`]: encrypted and plaintext connections behind [`Dialer`]
//! - [`engine`]: host ordering, fallback and the aggregate failure

mod config;
pub mod dialer;
pub mod dns;
pub mod engine;
mod error;
mod smtp_transaction;

pub use config::DeliveryConfig;
pub use dialer::{Dialer, MailSession, SmtpDialer};
pub use dns::{DnsConfig, DnsError, DnsResolver, MxRecord, MxResolver};
pub use engine::{Deliver, DirectDelivery, candidate_hosts, recipient_domain};
pub use error::{AttemptOutcome, DeliveryAttempt, DeliveryError};
pub use smtp_transaction::SmtpSession;
