//! DKIM signing of composed replies.
//!
//! Only RSA keys are accepted, and the key is loaded once. Anything else is
//! refused before the server starts.

use std::{
    fmt::{self, Debug, Formatter},
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use mail_auth::{
    common::{
        crypto::{RsaKey, Sha256},
        headers::HeaderWriter,
    },
    dkim::{DkimSigner, Done},
};
use rustls_pemfile::Item;
use rustls_pki_types::PrivateKeyDer;
use thiserror::Error;
use tracing::debug;

use crate::config::DkimConfig;

/// Headers covered by every signature, in this order.
pub const SIGNED_HEADERS: [&str; 9] = [
    "From",
    "To",
    "Subject",
    "Date",
    "Message-ID",
    "In-Reply-To",
    "References",
    "MIME-Version",
    "Content-Type",
];

/// DER encoding of the rsaEncryption OID, 1.2.840.113549.1.1.1.
const RSA_ENCRYPTION_OID: &[u8] = &[
    0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01,
];

#[derive(Debug, Error)]
pub enum SignError {
    #[error("read signing key {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("signing key {} is {kind}, only RSA keys are supported", .path.display())]
    UnsupportedKey { path: PathBuf, kind: &'static str },

    #[error("invalid signing key {}: {reason}", .path.display())]
    InvalidKey { path: PathBuf, reason: String },

    #[error("sign reply: {0}")]
    Signing(#[from] mail_auth::Error),
}

fn is_rsa_pkcs8(der: &[u8]) -> bool {
    // The algorithm identifier sits near the front of PrivateKeyInfo.
    der[..der.len().min(32)]
        .windows(RSA_ENCRYPTION_OID.len())
        .any(|window| window == RSA_ENCRYPTION_OID)
}

/// The first RSA private key in the PEM file at `path`.
fn classify(path: &Path) -> Result<PrivateKeyDer<'static>, SignError> {
    let file = File::open(path).map_err(|source| SignError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    for item in rustls_pemfile::read_all(&mut BufReader::new(file)) {
        let item = item.map_err(|err| SignError::InvalidKey {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let unsupported = |kind| SignError::UnsupportedKey {
            path: path.to_path_buf(),
            kind,
        };

        match item {
            Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Item::Pkcs8Key(key) if is_rsa_pkcs8(key.secret_pkcs8_der()) => {
                return Ok(PrivateKeyDer::Pkcs8(key));
            }
            Item::Pkcs8Key(_) => return Err(unsupported("a non-RSA PKCS#8 key")),
            Item::Sec1Key(_) => return Err(unsupported("an EC key")),
            _ => {}
        }
    }

    Err(SignError::InvalidKey {
        path: path.to_path_buf(),
        reason: "no private key found".to_string(),
    })
}

pub struct Signer {
    inner: DkimSigner<RsaKey<Sha256>, Done>,
    domain: String,
    selector: String,
}

impl Debug for Signer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("domain", &self.domain)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Loads and checks the key named by `config`.
    ///
    /// # Errors
    ///
    /// [`SignError`] if the file cannot be read or does not hold a usable RSA key.
    pub fn from_config(config: &DkimConfig) -> Result<Self, SignError> {
        let path = config.private_key_path.as_path();
        let invalid = |err: mail_auth::Error| SignError::InvalidKey {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };

        let key = RsaKey::<Sha256>::from_key_der(classify(path)?).map_err(invalid)?;

        let mut inner = DkimSigner::from_key(key)
            .domain(config.domain.clone())
            .selector(config.selector.clone())
            .headers(SIGNED_HEADERS);

        if let Some(identifier) = &config.identifier {
            inner = inner.agent_user_identifier(identifier.clone());
        }

        debug!(
            domain = %config.domain,
            selector = %config.selector,
            "Loaded DKIM key from {}",
            path.display()
        );

        Ok(Self {
            inner,
            domain: config.domain.clone(),
            selector: config.selector.clone(),
        })
    }

    /// `message` with a DKIM-Signature header prepended.
    ///
    /// # Errors
    ///
    /// [`SignError::Signing`] if the signature cannot be computed.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignError> {
        let signature = self.inner.sign(message)?;

        let mut signed = Vec::with_capacity(message.len() + 512);
        signature.write_header(&mut signed);
        signed.extend_from_slice(message);

        Ok(signed)
    }
}
