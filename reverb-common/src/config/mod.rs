//! Configuration primitives shared by the inbound and outbound sides.
//!
//! - [`timeouts`]: session and delivery client timeouts
//! - [`tls`]: outbound STARTTLS policy and certificate validation

pub mod timeouts;
pub mod tls;

pub use timeouts::{ClientTimeouts, ServerTimeouts};
pub use tls::{TlsCertificatePolicy, TlsConfig, TlsPolicy};
