pub mod address;
pub mod cancel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod message;
pub mod status;
pub mod traits;

pub use cancel::{CancelScope, Cancelled};
pub use message::InboundMessage;
pub use tracing;

/// Process lifecycle, broadcast to listeners and in-flight echoes over a
/// `tokio::sync::watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    #[default]
    Running,
    Shutdown,
}
