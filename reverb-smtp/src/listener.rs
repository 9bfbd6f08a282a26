use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::future::join_all;
use reverb_common::{
    Signal,
    error::{ListenerError, SessionError},
    internal, tracing,
    traits::Processor,
};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};

use crate::session::{Session, SessionConfig};

/// How long in-flight sessions get to finish once shutdown is signalled.
pub const DRAIN_GRACE: Duration = Duration::from_secs(10);

pub struct Listener<P: Processor> {
    listener: TcpListener,
    config: Arc<SessionConfig>,
    processor: Arc<P>,
    drain_grace: Duration,
}

impl<P: Processor> Listener<P> {
    /// Binds `socket`. Nothing is accepted until [`Listener::serve`].
    ///
    /// # Errors
    ///
    /// [`ListenerError::BindFailed`] if the socket cannot be bound.
    pub async fn bind(
        socket: SocketAddr,
        config: SessionConfig,
        processor: Arc<P>,
    ) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(socket)
            .await
            .map_err(|source| ListenerError::BindFailed {
                address: socket.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            processor,
            drain_grace: DRAIN_GRACE,
        })
    }

    #[must_use]
    pub const fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// # Errors
    ///
    /// Propagates the OS error for the bound socket.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` flips, then waits up to the
    /// drain grace for open sessions.
    ///
    /// # Errors
    ///
    /// [`ListenerError::DrainTimeout`] if sessions outlive the grace period.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn serve(self, mut shutdown: watch::Receiver<Signal>) -> Result<(), ListenerError> {
        let socket = self.local_addr()?;
        internal!(level = INFO, "Serving SMTP on {socket}");

        let mut sessions: Vec<JoinHandle<()>> = Vec::default();

        loop {
            if *shutdown.borrow_and_update() == Signal::Shutdown {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    internal!(level = INFO, "SMTP listener {socket} received shutdown signal, finishing sessions ...");
                    break;
                }

                connection = self.listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            internal!(level = WARN, "{}", ListenerError::AcceptFailed(err));
                            continue;
                        }
                    };

                    tracing::debug!("Connection received on {socket} from {peer}");
                    let session = Session::new(
                        stream,
                        peer,
                        Arc::clone(&self.config),
                        Arc::clone(&self.processor),
                        shutdown.clone(),
                    );

                    sessions.retain(|handle| !handle.is_finished());
                    sessions.push(tokio::spawn(async move {
                        match session.run().await {
                            Ok(()) => {}
                            Err(SessionError::Shutdown) => {
                                internal!(level = DEBUG, "Session with {peer} ended by shutdown");
                            }
                            Err(err) => internal!(level = ERROR, "Error: {err}"),
                        }
                    }));
                }
            }
        }

        drop(self.listener);

        tokio::time::timeout(self.drain_grace, join_all(sessions))
            .await
            .map_err(|_| ListenerError::DrainTimeout(self.drain_grace.as_secs()))?;

        internal!(level = INFO, "SMTP listener {socket} stopped");
        Ok(())
    }
}
