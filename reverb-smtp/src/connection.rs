use core::fmt::Display;
use std::time::Duration;

use reverb_common::{error::SessionError, outgoing, tracing};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// A buffered peer stream whose every read and write is bounded by a timeout.
pub struct Connection<Stream> {
    stream: BufReader<Stream>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Connection<Stream> {
    pub fn new(stream: Stream, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            read_timeout,
            write_timeout,
        }
    }

    /// Writes `response` followed by CRLF and flushes.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn send<S: Display + Send + Sync>(&mut self, response: &S) -> Result<usize, SessionError> {
        let buffer = format!("{response}\r\n");
        outgoing!("{}", buffer.trim_end());

        let stream = &mut self.stream;
        tokio::time::timeout(self.write_timeout, async move {
            stream.write_all(buffer.as_bytes()).await?;
            stream.flush().await?;
            Ok::<_, std::io::Error>(buffer.len())
        })
        .await
        .map_err(|_| SessionError::Timeout(self.write_timeout.as_secs()))?
        .map_err(SessionError::from)
    }

    /// Reads up to and including the next LF, but never more than `limit`
    /// bytes. A chunk without a trailing LF means the line was longer.
    ///
    /// Returns `None` once the peer has closed the stream.
    pub async fn read_line(&mut self, limit: u64) -> Result<Option<Vec<u8>>, SessionError> {
        let mut line = Vec::new();
        let read = tokio::time::timeout(
            self.read_timeout,
            (&mut self.stream).take(limit).read_until(b'\n', &mut line),
        )
        .await
        .map_err(|_| SessionError::Timeout(self.read_timeout.as_secs()))??;

        Ok((read > 0).then_some(line))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use reverb_common::error::SessionError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::Connection;

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn reads_lines_and_reports_eof() {
        let (client, server) = tokio::io::duplex(256);
        let mut connection = Connection::new(server, SECOND, SECOND);

        let mut client = client;
        client.write_all(b"EHLO a\r\nNOOP\r\n").await.unwrap();
        drop(client);

        assert_eq!(connection.read_line(512).await.unwrap().unwrap(), b"EHLO a\r\n");
        assert_eq!(connection.read_line(512).await.unwrap().unwrap(), b"NOOP\r\n");
        assert!(connection.read_line(512).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn long_lines_come_back_in_chunks() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut connection = Connection::new(server, SECOND, SECOND);

        client.write_all(b"abcdefgh\r\n").await.unwrap();

        assert_eq!(connection.read_line(4).await.unwrap().unwrap(), b"abcd");
        assert_eq!(connection.read_line(4).await.unwrap().unwrap(), b"efgh");
        assert_eq!(connection.read_line(4).await.unwrap().unwrap(), b"\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let (_client, server) = tokio::io::duplex(256);
        let mut connection = Connection::new(server, Duration::from_secs(30), SECOND);

        assert!(matches!(
            connection.read_line(512).await,
            Err(SessionError::Timeout(30))
        ));
    }

    #[tokio::test]
    async fn send_appends_crlf() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut connection = Connection::new(server, SECOND, SECOND);

        assert_eq!(connection.send(&"250 2.0.0 Ok").await.unwrap(), 14);
        drop(connection);

        let mut received = String::new();
        client.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "250 2.0.0 Ok\r\n");
    }
}
