//! Transport seam between the session loops and the connection.
//!
//! The session only needs two directions: the console loop writes text
//! frames through a [`FrameSink`], the stream loop reads frames from a
//! [`FrameSource`]. [`crate::ws`] implements both over `tokio-tungstenite`;
//! tests use in-memory implementations.

use async_trait::async_trait;

use crate::error::SessionError;
use crate::frame::Frame;

/// Write half of a duplex connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Sends `text` as one text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), SessionError>;

    /// Sends a close frame and shuts the write half down.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Read half of a duplex connection.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Waits for the next frame.
    ///
    /// A close frame or end of stream is reported as
    /// [`SessionError::Closed`]; it is never returned as a frame.
    async fn recv(&mut self) -> Result<Frame, SessionError>;
}
