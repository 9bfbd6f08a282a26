//! Outbound TLS policy.
//!
//! Direct delivery historically fell back from STARTTLS to plaintext
//! without asking. Here that fallback is a named policy, and certificate
//! validation stays on unless it is switched off explicitly.

use serde::{Deserialize, Serialize};

/// How STARTTLS is negotiated with each candidate host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Try an encrypted session first and fall back to plaintext on the
    /// same host if anything in the encrypted dial fails (RFC 3207 4.1).
    #[default]
    Opportunistic,

    /// Only ever deliver over an encrypted session. A host that cannot
    /// complete STARTTLS is recorded as failed and the next one is tried.
    Required,

    /// Never attempt STARTTLS.
    ///
    /// **WARNING**: Only use for testing or explicitly non-sensitive domains.
    Disabled,
}

impl TlsPolicy {
    /// Whether the encrypted dial should be attempted at all.
    #[must_use]
    pub const fn attempts_tls(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether a plaintext session may carry the message.
    #[must_use]
    pub const fn allows_plaintext(self) -> bool {
        !matches!(self, Self::Required)
    }
}

/// Certificate validation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsCertificatePolicy {
    /// Accept any certificate, including self-signed and mismatched ones.
    ///
    /// **SECURITY WARNING**: host name verification is the only identity
    /// check performed during delivery. Turning it off leaves the encrypted
    /// session open to interception.
    ///
    /// Default: `false`
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    /// Default: `Opportunistic`
    #[serde(default)]
    pub policy: TlsPolicy,

    #[serde(default)]
    pub certificate: TlsCertificatePolicy,
}

impl TlsConfig {
    #[must_use]
    pub const fn new(policy: TlsPolicy) -> Self {
        Self {
            policy,
            certificate: TlsCertificatePolicy {
                accept_invalid_certs: false,
            },
        }
    }

    /// Plaintext only. For tests against local servers.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(TlsPolicy::Disabled)
    }

    #[must_use]
    pub const fn accepts_invalid_certs(&self) -> bool {
        self.certificate.accept_invalid_certs
    }
}
