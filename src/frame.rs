//! Inbound frame classification and decoding.
//!
//! Frames arrive from the transport tagged with a [`FrameKind`]. Text frames
//! pass through unchanged, binary frames become spaced lowercase hex, and
//! anything else is rejected.

use crate::constants::HEARTBEAT_PAYLOAD;
use crate::error::SessionError;

/// Kind of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
    /// Any other frame, carrying its raw WebSocket opcode.
    Other(u8),
}

/// One message received from the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// How the payload should be interpreted.
    pub kind: FrameKind,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: text.into().into_bytes(),
        }
    }

    /// Builds a binary frame.
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload: payload.into(),
        }
    }

    /// Decodes this frame into displayable text.
    pub fn decode(&self) -> Result<String, SessionError> {
        decode(self.kind, &self.payload)
    }
}

/// Converts a frame payload into displayable text.
///
/// Text payloads are returned as-is (invalid UTF-8 is replaced, although the
/// WebSocket transport never delivers it). Binary payloads are rendered with
/// [`format_hex`].
///
/// # Errors
///
/// Returns [`SessionError::UnsupportedFrameKind`] for [`FrameKind::Other`].
pub fn decode(kind: FrameKind, payload: &[u8]) -> Result<String, SessionError> {
    match kind {
        FrameKind::Text => Ok(String::from_utf8_lossy(payload).into_owned()),
        FrameKind::Binary => Ok(format_hex(payload)),
        FrameKind::Other(opcode) => Err(SessionError::UnsupportedFrameKind(opcode)),
    }
}

/// Lowercase hex with a space after every byte: `[0x4a, 0xff]` -> `"4a ff "`.
pub fn format_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        out.push_str(&hex::encode([*byte]));
        out.push(' ');
    }
    out
}

/// Returns `true` iff `text` is exactly the reserved keep-alive literal.
pub fn is_heartbeat(text: &str) -> bool {
    text.as_bytes() == HEARTBEAT_PAYLOAD.as_bytes()
}
