//! Reply synthesis for reverb.
//!
//! An inbound message is decoded, its thread and reply target worked out,
//! and its text rebuilt into an in-thread reply. The reply is optionally
//! DKIM signed and handed to a [`Deliver`](reverb_delivery::Deliver).

pub mod body;
pub mod compose;
mod config;
pub mod decode;
pub mod dkim;
mod error;
pub mod recipient;
mod replier;
pub mod thread;

pub use config::{DkimConfig, ReplierIdentity, ReplyConfig};
pub use error::EchoError;
pub use replier::Replier;
