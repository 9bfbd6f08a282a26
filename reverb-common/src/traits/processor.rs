use async_trait::async_trait;

use crate::{CancelScope, InboundMessage};

/// Consumes a message accepted by the inbound session.
///
/// The session maps `Ok` to acceptance of DATA and `Err` to a permanent
/// rejection carrying the error's text.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn echo(&self, message: InboundMessage, scope: CancelScope) -> Result<(), Self::Error>;
}
