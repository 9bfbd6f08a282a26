//! SMTP plumbing for reverb.
//!
//! The inbound half ([`listener`], [`session`]) accepts messages and hands
//! them to a [`Processor`](reverb_common::traits::Processor). The outbound
//! half ([`client`]) speaks to remote exchangers during direct delivery.

pub mod client;
pub mod command;
pub mod connection;
pub mod listener;
pub mod session;

pub use listener::Listener;
pub use session::{Session, SessionConfig};
