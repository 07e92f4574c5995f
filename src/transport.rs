//! `\r\n` line framing over a byte stream.
//!
//! A TCP connection is split into a [`LineReader`] owned by the read loop and a
//! [`LineWriter`] that can be shared between threads. Each `write_line` call is
//! a single locked `write_all`, so lines from different callers never
//! interleave.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;

use crate::error::TransportError;

pub const TERMINATOR: &[u8] = b"\r\n";

/// Longest inbound line, terminator included. Room for IRCv3 message tags on
/// top of the 512-byte message.
pub const MAX_INBOUND_LINE: usize = 8704;

/// Open a TCP connection and split it into its read and write halves.
pub fn connect(
    host: &str,
    port: u16,
) -> Result<(LineReader<TcpStream>, LineWriter<TcpStream>), TransportError> {
    let stream = TcpStream::connect((host, port))?;
    stream.set_nodelay(true)?;
    let read_half = stream.try_clone()?;
    tracing::debug!(host, port, "connected");
    Ok((LineReader::new(read_half), LineWriter::new(stream)))
}

pub struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
    /// Inside a line that overflowed [`MAX_INBOUND_LINE`].
    discarding: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
            discarding: false,
        }
    }

    /// Block until one complete line is buffered and return it without its
    /// terminator. Bytes after the terminator stay buffered for the next call.
    /// Lines longer than [`MAX_INBOUND_LINE`] are dropped whole.
    pub fn read_line(&mut self) -> Result<String, TransportError> {
        loop {
            let room = (MAX_INBOUND_LINE - self.pending.len()) as u64;
            let n = (&mut self.inner)
                .take(room)
                .read_until(b'\n', &mut self.pending)?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            // A bare \n is line content, keep reading until \r\n.
            if self.pending.ends_with(TERMINATOR) {
                if self.discarding {
                    self.discarding = false;
                    self.pending.clear();
                    continue;
                }
                let len = self.pending.len() - TERMINATOR.len();
                let line = String::from_utf8_lossy(&self.pending[..len]).into_owned();
                self.pending.clear();
                tracing::trace!(line = %line, "read");
                return Ok(line);
            }
            if self.pending.len() >= MAX_INBOUND_LINE {
                if !self.discarding {
                    tracing::warn!(limit = MAX_INBOUND_LINE, "dropping oversized inbound line");
                    self.discarding = true;
                }
                // Keep a trailing \r so a terminator split across reads is seen.
                let split_cr = self.pending.last() == Some(&b'\r');
                self.pending.clear();
                if split_cr {
                    self.pending.push(b'\r');
                }
            }
        }
    }
}

pub struct LineWriter<W> {
    inner: Mutex<W>,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Send `text` followed by the terminator as one unit of I/O.
    pub fn write_line(&self, text: &str) -> Result<(), TransportError> {
        let mut buf = Vec::with_capacity(text.len() + TERMINATOR.len());
        buf.extend_from_slice(text.as_bytes());
        buf.extend_from_slice(TERMINATOR);

        // A writer poisoned by a panicking thread still holds a usable stream.
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.write_all(&buf)?;
        inner.flush()?;
        tracing::trace!(line = text, "write");
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
