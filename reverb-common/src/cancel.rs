use std::time::Duration;

use thiserror::Error;
use tokio::{sync::watch, time::Instant};

use crate::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancelled {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("shutdown requested")]
    Shutdown,
}

/// Cancellation for one echo, from decoding through the last delivery attempt.
///
/// Checked cooperatively between host attempts only. Work already in flight
/// is bounded by its own transport timeouts.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    deadline: Option<Instant>,
    shutdown: Option<watch::Receiver<Signal>>,
}

impl CancelScope {
    /// A scope that never cancels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<Signal>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Errors once shutdown has been signalled or the deadline has passed.
    pub fn check(&self) -> Result<(), Cancelled> {
        if let Some(shutdown) = &self.shutdown
            && *shutdown.borrow() == Signal::Shutdown
        {
            return Err(Cancelled::Shutdown);
        }

        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Cancelled::DeadlineExceeded);
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::sync::watch;

    use super::{CancelScope, Cancelled};
    use crate::Signal;

    #[test]
    fn unbounded_scope_never_cancels() {
        assert_eq!(CancelScope::new().check(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let scope = CancelScope::new().with_timeout(Duration::from_secs(5));
        assert_eq!(scope.check(), Ok(()));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(scope.check(), Err(Cancelled::DeadlineExceeded));
    }

    #[test]
    fn shutdown_is_observed_by_clones() {
        let (tx, rx) = watch::channel(Signal::Running);
        let scope = CancelScope::new().with_shutdown(rx);
        let clone = scope.clone();

        assert_eq!(scope.check(), Ok(()));
        tx.send(Signal::Shutdown).unwrap();
        assert_eq!(scope.check(), Err(Cancelled::Shutdown));
        assert_eq!(clone.check(), Err(Cancelled::Shutdown));
    }
}
