use reverb_delivery::DeliveryError;
use thiserror::Error;

use crate::{compose::ComposeError, decode::DecodeError, dkim::SignError};

/// Why an inbound message produced no reply.
///
/// Every variant drops the message. Nothing is retried.
#[derive(Debug, Error)]
pub enum EchoError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unable to determine reply recipient")]
    NoRecipient,

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
