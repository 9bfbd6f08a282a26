use reverb_common::config::{ClientTimeouts, TlsConfig};
use serde::{Deserialize, Serialize};

use crate::dns::DnsConfig;

/// Settings for direct delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Port dialled on every exchanger.
    ///
    /// Default: 25
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub timeouts: ClientTimeouts,

    #[serde(default)]
    pub dns: DnsConfig,
}

const fn default_port() -> u16 {
    25
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            tls: TlsConfig::default(),
            timeouts: ClientTimeouts::default(),
            dns: DnsConfig::default(),
        }
    }
}
