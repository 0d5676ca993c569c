//! Byte-stream line extraction.
//!
//! Serial input arrives in arbitrary chunks; the scanner accumulates bytes
//! and yields complete lines. A line ends at `\n` (telemetry and ColonHex
//! frames) or at a profile-specific frame terminator (`#` for the delimited
//! profile, which transmits frames without a trailing newline). The frame
//! terminator stays attached to the yielded line so classification can see
//! it; newlines are stripped.

use bytes::BytesMut;

use crate::profile::FrameFormat;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Accumulates raw received bytes and yields complete lines.
///
/// Handles partial reads internally — callers always get complete lines.
#[derive(Debug)]
pub struct LineScanner {
    buf: BytesMut,
    extra_terminators: &'static [u8],
}

impl LineScanner {
    /// Create a scanner splitting on the given profile's terminators.
    pub fn new(format: &dyn FrameFormat) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            extra_terminators: format.extra_line_terminators(),
        }
    }

    /// Append received bytes to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete line, if one is buffered.
    ///
    /// Empty lines are skipped. Returns `None` when more data is needed.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self
                .buf
                .iter()
                .position(|b| *b == b'\n' || self.extra_terminators.contains(b))?;

            let terminator = self.buf[pos];
            let mut raw = self.buf.split_to(pos + 1);
            if terminator == b'\n' {
                raw.truncate(raw.len() - 1);
            }
            // Leading newline remnants ("\r\n" splits) and blank lines are noise.
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Number of buffered, not-yet-complete bytes.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
