//! Outbound frame construction
//!
//! One frame per token: the token's UTF-8 bytes, optionally followed by the
//! deployment delimiter. The delimiter is a framing terminator, never part of
//! the logical value, so it is appended after the payload and never prepended.

use crate::config::Delimiter;

/// One framed token, ready for a characteristic write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    bytes: Vec<u8>,
}

impl OutboundFrame {
    /// Frame a token for the wire. The token is treated as opaque text; no
    /// validation of its content happens here.
    pub fn new(token: &str, delimiter: Delimiter) -> Self {
        let payload = token.as_bytes();
        let mut bytes = Vec::with_capacity(payload.len() + 1);
        bytes.extend_from_slice(payload);
        if let Some(terminator) = delimiter.as_byte() {
            bytes.push(terminator);
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
