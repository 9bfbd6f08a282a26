use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How replies identify themselves.
///
/// Required fields default to empty so that a missing one is reported by
/// validation rather than as a parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// Header From, optionally with a display name: `Echo <echo@example.com>`.
    #[serde(default)]
    pub from_address: String,

    /// Reverse-path for outbound MAIL FROM.
    #[serde(default)]
    pub mail_from: String,

    /// Replaces any display name in `from_address`.
    #[serde(default)]
    pub from_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkimConfig {
    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub selector: String,

    /// Agent or user identifier (`i=`).
    #[serde(default)]
    pub identifier: Option<String>,

    /// PEM file holding an RSA private key, PKCS#1 or PKCS#8.
    #[serde(default)]
    pub private_key_path: PathBuf,
}

/// Who replies are from. Fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplierIdentity {
    /// Used for Message-IDs and in EHLO.
    pub hostname: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub mail_from: String,
}

impl ReplierIdentity {
    pub fn new(hostname: impl Into<String>, reply: &ReplyConfig) -> Self {
        Self {
            hostname: hostname.into(),
            from_address: reply.from_address.clone(),
            from_name: reply.from_name.clone().filter(|name| !name.is_empty()),
            mail_from: reply.mail_from.clone(),
        }
    }
}
