//! Outbound SMTP client used for direct delivery.
//!
//! Speaks plain TCP and upgrades in place with STARTTLS. Every command
//! returns the parsed [`Response`]; deciding what a code means is left to
//! the caller.

mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::{SmtpClient, dot_stuff};
