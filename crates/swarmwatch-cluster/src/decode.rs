//! Newline-delimited JSON framing for the Engine API event stream.

use crate::error::{ClusterError, ClusterResult};

/// Longest unterminated line the decoder buffers before giving up.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream into complete lines.
///
/// Chunks arrive with arbitrary boundaries; partial lines are buffered
/// until their terminating `\n` shows up, up to `max_line` bytes.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_line: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
        }
    }

    /// Feed a chunk and return every line it completed, without the
    /// terminator. Blank lines are dropped.
    ///
    /// Fails with [`ClusterError::Decode`] once the unterminated tail
    /// grows past the line limit; the buffered bytes are discarded.
    pub fn push(&mut self, chunk: &[u8]) -> ClusterResult<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line);
            }
        }

        if self.buf.len() > self.max_line {
            let pending = self.buf.len();
            self.buf = Vec::new();
            return Err(ClusterError::Decode(format!(
                "event line exceeds {} bytes ({pending} buffered without a newline)",
                self.max_line
            )));
        }
        Ok(lines)
    }

    /// Bytes received but not yet terminated.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
