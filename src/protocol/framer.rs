//! Message reassembly for the diagnostic port.
//!
//! The diagnostic port speaks whitespace-terminated ASCII tokens, but a
//! single TCP read can end half way through a token. The framer keeps the
//! unterminated tail of each read and prepends it to the next one:
//!
//! ```text
//! read 1:  "+a8\n=d4?/00"     -> tokens ["+a8"], carry "=d4?/00"
//! read 2:  "0f\n"             -> tokens ["=d4?/000f"], carry ""
//! ```
//!
//! Telnet negotiation from QEMU arrives as 3-byte sequences starting with
//! `0xFF`; any such triplets at the start of the buffer are dropped.

use bytes::{Buf, BytesMut};

use crate::error::FrameError;

/// First byte of an out-of-band escape triplet.
pub const ESCAPE: u8 = 0xFF;

/// Length of an escape triplet.
pub const ESCAPE_LEN: usize = 3;

/// Whitespace as understood by the diagnostic port (includes VT and FF).
#[must_use]
pub const fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Drops every complete escape triplet at the front of `buf`.
///
/// A triplet cut short by the end of the buffer is left in place.
/// Returns the number of bytes removed.
pub fn strip_escapes(buf: &mut BytesMut) -> usize {
    let mut dropped = 0;
    while buf.len() >= ESCAPE_LEN && buf[0] == ESCAPE {
        tracing::trace!("dropping escape sequence {}", hex::encode(&buf[..ESCAPE_LEN]));
        buf.advance(ESCAPE_LEN);
        dropped += ESCAPE_LEN;
    }
    dropped
}

/// Splits a byte stream into whitespace-terminated tokens.
#[derive(Debug, Default)]
pub struct MessageFramer {
    carry: BytesMut,
}

impl MessageFramer {
    /// Creates a new framer with an empty carry buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            carry: BytesMut::new(),
        }
    }

    /// Feeds one read's worth of bytes and returns the completed tokens.
    ///
    /// The unterminated tail is held back for the next call. On error the
    /// completed part of the read is discarded but the tail is kept.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<String>, FrameError> {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(data);

        strip_escapes(&mut buf);
        if buf.first() == Some(&ESCAPE) {
            // partial triplet, wait for the rest
            self.carry = buf;
            return Ok(Vec::new());
        }

        let end = buf.iter().rposition(|&b| is_space(b)).map_or(0, |i| i + 1);
        self.carry = buf.split_off(end);

        if !buf.is_ascii() {
            return Err(FrameError::NotText { len: buf.len() });
        }

        let tokens = buf[..]
            .split(|&b| is_space(b))
            .filter(|token| !token.is_empty())
            .map(|token| String::from_utf8_lossy(token).into_owned())
            .collect::<Vec<_>>();

        if !tokens.is_empty() {
            tracing::trace!("framed {} tokens, {} bytes carried", tokens.len(), self.carry.len());
        }
        Ok(tokens)
    }

    /// Returns the unterminated bytes held for the next read.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    /// Clears the carry buffer.
    pub fn clear(&mut self) {
        self.carry.clear();
    }
}
