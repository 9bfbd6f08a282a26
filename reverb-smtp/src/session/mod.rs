//! One inbound SMTP conversation.
//!
//! The command loop parses each line, checks sequencing and hands the
//! transaction to [`Session::mail`], [`Session::rcpt`], [`Session::data`],
//! [`Session::reset`] and [`Session::logout`]. Only this session touches its
//! [`Envelope`].

mod response;

use std::{borrow::Cow, net::SocketAddr, sync::Arc};

use reverb_common::{
    CancelScope, Signal,
    address::Mailbox,
    config::ServerTimeouts,
    envelope::Envelope,
    error::SessionError,
    incoming, internal,
    status::Status,
    tracing,
    traits::Processor,
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::watch,
};

pub use self::response::Reply;
use crate::{
    command::{Command, CommandError, HeloVariant},
    connection::Connection,
};

/// Longest command line accepted before it is rejected as too long.
const COMMAND_LINE_LIMIT: u64 = 4096;

/// Read granularity while receiving DATA.
const DATA_CHUNK_LIMIT: u64 = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Announced in the greeting and the EHLO reply.
    pub hostname: String,
    /// Upper bound on an accepted payload, after dot-unstuffing.
    pub max_message_bytes: usize,
    pub timeouts: ServerTimeouts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    Greeted,
    MailFrom,
    RcptTo,
}

/// Why [`Session::data`] did not accept a payload.
#[derive(Debug, Error)]
pub enum DataError<E> {
    #[error("at least one recipient is required")]
    NoRecipients,

    #[error(transparent)]
    Rejected(E),
}

pub struct Session<Stream, P: Processor> {
    peer: SocketAddr,
    connection: Connection<Stream>,
    config: Arc<SessionConfig>,
    processor: Arc<P>,
    shutdown: watch::Receiver<Signal>,
    state: State,
    envelope: Envelope,
}

impl<Stream, P> Session<Stream, P>
where
    Stream: AsyncRead + AsyncWrite + Unpin + Send,
    P: Processor,
{
    pub fn new(
        stream: Stream,
        peer: SocketAddr,
        config: Arc<SessionConfig>,
        processor: Arc<P>,
        shutdown: watch::Receiver<Signal>,
    ) -> Self {
        Self {
            peer,
            connection: Connection::new(stream, config.timeouts.read(), config.timeouts.write()),
            config,
            processor,
            shutdown,
            state: State::Connected,
            envelope: Envelope::default(),
        }
    }

    /// Opens a new transaction with `from` as the reverse-path.
    pub fn mail(&mut self, from: Option<Mailbox>) {
        self.envelope = Envelope::with_sender(from);
        self.state = State::MailFrom;
    }

    pub fn rcpt(&mut self, to: Mailbox) {
        self.envelope.add_recipient(to);
        self.state = State::RcptTo;
    }

    /// Hands the accepted payload to the processor and starts a fresh
    /// transaction, whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`DataError::NoRecipients`] when no RCPT was accepted, otherwise
    /// whatever the processor returned.
    pub async fn data(&mut self, payload: Vec<u8>) -> Result<(), DataError<P::Error>> {
        if self.envelope.recipients().is_empty() {
            return Err(DataError::NoRecipients);
        }

        let message = std::mem::take(&mut self.envelope).into_message(payload);
        self.state = State::Greeted;

        let sender = message.sender.clone();
        let recipients = message.recipients.len();
        let bytes = message.len();

        let scope = CancelScope::new()
            .with_timeout(self.config.timeouts.delivery())
            .with_shutdown(self.shutdown.clone());

        self.processor
            .echo(message, scope)
            .await
            .map_err(DataError::Rejected)?;

        internal!(
            level = INFO,
            "Echoed message from <{sender}> ({recipients} recipient(s), {bytes} bytes)"
        );

        Ok(())
    }

    /// Abandons the current transaction.
    pub fn reset(&mut self) {
        self.envelope = Envelope::default();
        if self.state != State::Connected {
            self.state = State::Greeted;
        }
    }

    pub fn logout(&mut self) {
        self.envelope = Envelope::default();
        self.state = State::Connected;
        internal!(level = DEBUG, "Session with {} closed", self.peer);
    }

    /// Runs the command loop until QUIT, disconnect, timeout or shutdown.
    ///
    /// # Errors
    ///
    /// Connection failures, timeouts and shutdown end the session with an
    /// error. QUIT and a clean disconnect do not.
    #[tracing::instrument(skip_all, fields(peer = %self.peer))]
    pub async fn run(mut self) -> Result<(), SessionError> {
        internal!(level = DEBUG, "Connected to {}", self.peer);

        let greeting = format!("{} ESMTP reverb", self.config.hostname);
        self.connection
            .send(&Reply::new(Status::ServiceReady, greeting))
            .await?;

        loop {
            let line = tokio::select! {
                line = self.connection.read_line(COMMAND_LINE_LIMIT) => line,
                _ = self.shutdown.changed() => {
                    let notice = format!("4.3.0 {} Service shutting down", self.config.hostname);
                    self.connection.send(&Reply::new(Status::Unavailable, notice)).await?;
                    self.logout();
                    return Err(SessionError::Shutdown);
                }
            };

            let Some(line) = self.timed(line).await? else {
                self.logout();
                return Ok(());
            };

            if !line.ends_with(b"\n") && line.len() as u64 == COMMAND_LINE_LIMIT {
                self.discard_line().await?;
                self.connection
                    .send(&Reply::new(Status::SyntaxError, "5.5.2 Error: line too long"))
                    .await?;
                continue;
            }

            incoming!("{}", String::from_utf8_lossy(&line).trim_end());

            if !self.dispatch(Command::try_from(line.as_slice())).await? {
                self.logout();
                return Ok(());
            }
        }
    }

    /// Handles one parsed command. Returns `false` once the session should end.
    async fn dispatch(&mut self, command: Result<Command, CommandError>) -> Result<bool, SessionError> {
        let reply = match command {
            Ok(Command::Helo(variant)) => {
                self.reset();
                self.state = State::Greeted;
                self.hello(&variant)
            }
            Ok(Command::MailFrom(sender, params)) => match self.state {
                State::Connected => sequence_error("5.5.1 Error: send HELO/EHLO first"),
                State::MailFrom | State::RcptTo => {
                    sequence_error("5.5.1 Error: nested MAIL command")
                }
                State::Greeted => {
                    if params.size().is_some_and(|size| size > self.config.max_message_bytes) {
                        Reply::new(
                            Status::ExceededStorage,
                            "5.3.4 Message size exceeds fixed maximum message size",
                        )
                    } else {
                        self.mail(sender);
                        Reply::new(Status::Ok, "2.1.0 Ok")
                    }
                }
            },
            Ok(Command::RcptTo(recipient)) => match self.state {
                State::MailFrom | State::RcptTo => {
                    self.rcpt(recipient);
                    Reply::new(Status::Ok, "2.1.5 Ok")
                }
                _ => sequence_error("5.5.1 Error: need MAIL command"),
            },
            Ok(Command::Data) => match self.state {
                State::MailFrom | State::RcptTo if !self.envelope.recipients().is_empty() => {
                    return self.receive_data().await.map(|()| true);
                }
                State::MailFrom | State::RcptTo => sequence_error(format!(
                    "5.5.1 Error: {}",
                    DataError::<P::Error>::NoRecipients
                )),
                _ => sequence_error("5.5.1 Error: need MAIL command"),
            },
            Ok(Command::Rset) => {
                self.reset();
                Reply::new(Status::Ok, "2.0.0 Ok")
            }
            Ok(Command::Noop) => Reply::new(Status::Ok, "2.0.0 Ok"),
            Ok(Command::Vrfy) => Reply::new(
                Status::CannotVerify,
                "2.0.0 Cannot VRFY user, but will accept message and attempt delivery",
            ),
            Ok(Command::Help) => Reply::new(Status::HelpMessage, "2.0.0 See RFC 5321"),
            Ok(Command::StartTls) => {
                Reply::new(Status::NotImplemented, "5.5.1 Error: command not implemented")
            }
            Ok(Command::Quit) => {
                self.connection
                    .send(&Reply::new(Status::GoodBye, "2.0.0 Bye"))
                    .await?;
                return Ok(false);
            }
            Err(CommandError::Unrecognised(_)) => {
                Reply::new(Status::SyntaxError, "5.5.2 Error: command not recognized")
            }
            Err(CommandError::Syntax(reason)) => {
                Reply::new(Status::ParameterSyntax, format!("5.5.4 Error: {reason}"))
            }
        };

        self.connection.send(&reply).await?;
        Ok(true)
    }

    fn hello(&self, variant: &HeloVariant) -> Reply {
        let hostname = self.config.hostname.clone();
        internal!(level = DEBUG, "{variant} from {}", variant.client_id());

        match variant {
            HeloVariant::Helo(_) => Reply::new(Status::Ok, hostname),
            HeloVariant::Ehlo(_) => Reply::multi(
                Status::Ok,
                vec![
                    Cow::Owned(hostname),
                    Cow::Owned(format!("SIZE {}", self.config.max_message_bytes)),
                    Cow::Borrowed("8BITMIME"),
                    Cow::Borrowed("PIPELINING"),
                    Cow::Borrowed("HELP"),
                ],
            ),
        }
    }

    /// Reads the payload after a 354 and answers the terminating dot.
    async fn receive_data(&mut self) -> Result<(), SessionError> {
        self.connection
            .send(&Reply::new(
                Status::StartMailInput,
                "End data with <CR><LF>.<CR><LF>",
            ))
            .await?;

        let Some(payload) = self.read_payload().await? else {
            self.reset();
            return self
                .connection
                .send(&Reply::new(
                    Status::ExceededStorage,
                    "5.3.4 Message size exceeds fixed maximum message size",
                ))
                .await
                .map(|_| ());
        };

        let reply = match self.data(payload).await {
            Ok(()) => Reply::new(Status::Ok, "2.0.0 Ok: echoed"),
            Err(err) => {
                internal!(level = ERROR, "Echo failed: {err}");
                Reply::new(Status::TransactionFailed, format!("5.0.0 {err}"))
            }
        };

        self.connection.send(&reply).await.map(|_| ())
    }

    /// Collects DATA lines until the lone dot, removing dot-stuffing.
    ///
    /// Returns `None` if the payload outgrew the cap. The rest of the
    /// payload is still consumed so the peer stays in sync.
    async fn read_payload(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        let cap = self.config.max_message_bytes;
        let mut payload = Vec::new();
        let mut exceeded = false;
        let mut at_line_start = true;

        loop {
            let chunk = self.connection.read_line(DATA_CHUNK_LIMIT).await;
            let Some(chunk) = self.timed(chunk).await? else {
                return Err(SessionError::Protocol(
                    "Connection closed during DATA".to_string(),
                ));
            };

            if at_line_start && matches!(chunk.as_slice(), b".\r\n" | b".\n") {
                break;
            }

            let body = if at_line_start && chunk.starts_with(b".") {
                &chunk[1..]
            } else {
                chunk.as_slice()
            };

            if !exceeded {
                if payload.len() + body.len() > cap {
                    exceeded = true;
                    payload = Vec::new();
                } else {
                    payload.extend_from_slice(body);
                }
            }

            at_line_start = chunk.ends_with(b"\n");
        }

        if exceeded {
            internal!(level = WARN, "Payload from {} exceeded {cap} bytes", self.peer);
            return Ok(None);
        }

        Ok(Some(payload))
    }

    /// Consumes the remainder of an over-long command line.
    async fn discard_line(&mut self) -> Result<(), SessionError> {
        loop {
            let chunk = self.connection.read_line(COMMAND_LINE_LIMIT).await;
            match self.timed(chunk).await? {
                Some(chunk) if !chunk.ends_with(b"\n") => {}
                _ => return Ok(()),
            }
        }
    }

    /// Tells the peer about a read timeout before giving up on it.
    async fn timed<T>(&mut self, read: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(SessionError::Timeout(_)) = read {
            let notice = format!("4.4.2 {} Error: timeout exceeded", self.config.hostname);
            // The peer may already be gone, the timeout is what gets reported.
            let _ = self
                .connection
                .send(&Reply::new(Status::Unavailable, notice))
                .await;
        }

        read
    }
}

fn sequence_error(text: impl Into<Cow<'static, str>>) -> Reply {
    Reply::new(Status::InvalidCommandSequence, text)
}
