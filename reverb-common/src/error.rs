//! Errors shared by the inbound listener and its sessions.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// The peer went quiet for longer than the read timeout, or a write
    /// could not be flushed in time.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),

    #[error("Shutdown requested")]
    Shutdown,
}

impl SessionError {
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Returns `true` if the error is a client-side issue.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Timeout(_))
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[from] io::Error),

    #[error("Sessions still running after {0} seconds")]
    DrainTimeout(u64),
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn session_error_classification() {
        assert!(SessionError::Shutdown.is_shutdown());
        assert!(!SessionError::Shutdown.is_client_error());

        assert!(SessionError::Protocol("bad".to_string()).is_client_error());
        assert!(SessionError::Timeout(30).is_client_error());
        assert_eq!(
            SessionError::Timeout(30).to_string(),
            "Session timed out after 30 seconds"
        );
    }

    #[test]
    fn bind_error_keeps_source() {
        let err = ListenerError::BindFailed {
            address: "0.0.0.0:25".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };

        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Failed to bind to 0.0.0.0:25: access denied"
        );
    }
}
