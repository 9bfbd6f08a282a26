//! Timeouts for the inbound session and the outbound delivery client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inbound session timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// Upper bound on every read from the peer.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::server_read_secs")]
    pub read_secs: u64,

    /// Upper bound on every write to the peer.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::server_write_secs")]
    pub write_secs: u64,

    /// Deadline for a whole echo, from the end of DATA through the last
    /// delivery attempt. Checked between host attempts.
    ///
    /// Default: 300 seconds
    #[serde(default = "defaults::server_delivery_secs")]
    pub delivery_secs: u64,
}

impl ServerTimeouts {
    pub const fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub const fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub const fn delivery(&self) -> Duration {
        Duration::from_secs(self.delivery_secs)
    }
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read_secs: defaults::server_read_secs(),
            write_secs: defaults::server_write_secs(),
            delivery_secs: defaults::server_delivery_secs(),
        }
    }
}

/// Per-stage timeouts for an outbound SMTP session.
///
/// A host attempt in flight is only ever bounded by these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Default: 30 seconds
    #[serde(default = "defaults::client_connect_secs")]
    pub connect_secs: u64,

    /// Covers the greeting and EHLO/HELO.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::client_ehlo_secs")]
    pub ehlo_secs: u64,

    /// Covers STARTTLS and the handshake that follows.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::client_starttls_secs")]
    pub starttls_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::client_mail_from_secs")]
    pub mail_from_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::client_rcpt_to_secs")]
    pub rcpt_to_secs: u64,

    /// DATA and the message transfer.
    ///
    /// Default: 120 seconds
    #[serde(default = "defaults::client_data_secs")]
    pub data_secs: u64,

    /// Default: 10 seconds (doesn't fail delivery if it expires)
    #[serde(default = "defaults::client_quit_secs")]
    pub quit_secs: u64,
}

impl ClientTimeouts {
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub const fn ehlo(&self) -> Duration {
        Duration::from_secs(self.ehlo_secs)
    }

    pub const fn starttls(&self) -> Duration {
        Duration::from_secs(self.starttls_secs)
    }

    pub const fn mail_from(&self) -> Duration {
        Duration::from_secs(self.mail_from_secs)
    }

    pub const fn rcpt_to(&self) -> Duration {
        Duration::from_secs(self.rcpt_to_secs)
    }

    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::client_connect_secs(),
            ehlo_secs: defaults::client_ehlo_secs(),
            starttls_secs: defaults::client_starttls_secs(),
            mail_from_secs: defaults::client_mail_from_secs(),
            rcpt_to_secs: defaults::client_rcpt_to_secs(),
            data_secs: defaults::client_data_secs(),
            quit_secs: defaults::client_quit_secs(),
        }
    }
}

mod defaults {
    pub const fn server_read_secs() -> u64 {
        30
    }
    pub const fn server_write_secs() -> u64 {
        30
    }
    pub const fn server_delivery_secs() -> u64 {
        300 // 5 minutes
    }

    pub const fn client_connect_secs() -> u64 {
        30
    }
    pub const fn client_ehlo_secs() -> u64 {
        30
    }
    pub const fn client_starttls_secs() -> u64 {
        30
    }
    pub const fn client_mail_from_secs() -> u64 {
        30
    }
    pub const fn client_rcpt_to_secs() -> u64 {
        30
    }
    pub const fn client_data_secs() -> u64 {
        120 // 2 minutes
    }
    pub const fn client_quit_secs() -> u64 {
        10
    }
}
