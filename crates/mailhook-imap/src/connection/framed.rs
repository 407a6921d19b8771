//! Framed I/O for the IMAP protocol.
//!
//! Server responses are CRLF-terminated lines that may announce a literal
//! (`{n}` at the end of the line) followed by `n` raw bytes. A message body
//! arrives as one such literal, so a single response can span many reads.
//!
//! The I/O timeout bounds each read and write on its own, so a large FETCH
//! runs as long as the server keeps sending.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::{Error, Result};

const READ_CHUNK: usize = 8 * 1024;

/// Longest line accepted outside a literal.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest literal (message body) accepted.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Literal-aware reader and writer over a byte stream.
pub struct FramedStream<S> {
    stream: S,
    buf: BytesMut,
    io_timeout: Duration,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream. Every read and write must make progress
    /// within `io_timeout`.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            io_timeout,
        }
    }

    /// Reads one complete response, literals included.
    ///
    /// # Errors
    ///
    /// Returns an error on EOF, I/O failure, a stalled read, or an oversized
    /// line or literal.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();
        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(len) = literal_length(&line) else {
                return Ok(response);
            };
            if len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            while self.buf.len() < len {
                self.fill().await?;
            }
            response.extend_from_slice(&self.buf.split_to(len));
        }
    }

    /// Reads responses until the one tagged `tag`, which ends the returned
    /// list.
    ///
    /// # Errors
    ///
    /// Returns an error if a response cannot be read.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();
        loop {
            let response = self.read_response().await?;
            let done = response
                .strip_prefix(tag.as_bytes())
                .is_some_and(|rest| rest.first() == Some(&b' '));
            responses.push(response);
            if done {
                return Ok(responses);
            }
        }
    }

    /// Writes one serialized command and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or stalls.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = &mut self.stream;
        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        timeout(self.io_timeout, write)
            .await
            .map_err(|_| Error::Timeout(self.io_timeout))??;
        Ok(())
    }

    /// Returns the inner stream, dropping anything still buffered.
    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn read_line(&mut self) -> Result<BytesMut> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = find_crlf(&self.buf[scanned..]) {
                return Ok(self.buf.split_to(scanned + pos + 2));
            }
            if self.buf.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            // A CR at the very end may pair with an LF in the next read.
            scanned = self.buf.len().saturating_sub(1);
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        self.buf.reserve(READ_CHUNK);
        let read = timeout(self.io_timeout, self.stream.read_buf(&mut self.buf))
            .await
            .map_err(|_| Error::Timeout(self.io_timeout))??;
        if read == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        Ok(())
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Length of the literal announced at the end of `line`, if any.
///
/// Accepts both `{123}` and the non-synchronizing `{123+}`.
fn literal_length(line: &[u8]) -> Option<usize> {
    let inner = line.strip_suffix(b"}\r\n")?;
    let inner = inner.strip_suffix(b"+").unwrap_or(inner);
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
