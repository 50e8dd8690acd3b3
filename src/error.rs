//! Session error type.
//!
//! Every failure in the bridge is terminal: the loop that hits it stops and
//! reports the error to the session coordinator unchanged. The coordinator
//! surfaces the first one as the session outcome.

use std::io;

/// Boxed transport error, so the trait seams stay independent of the
/// WebSocket library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Terminal outcome of a bridge session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Dialing the remote endpoint failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Target URL as given by the operator.
        url: String,
        /// Underlying handshake or URL error.
        #[source]
        source: BoxError,
    },

    /// The terminal line editor could not be set up.
    #[error("failed to initialise line reader: {0}")]
    LineReaderInit(#[source] io::Error),

    /// Reading from the connection or the console failed.
    #[error("read failed: {0}")]
    Read(#[source] BoxError),

    /// The peer closed the connection (close frame or end of stream).
    #[error("connection closed (code {code}){}", format_reason(.reason))]
    Closed {
        /// WebSocket close code (1005 = no code, 1006 = abnormal).
        code: u16,
        /// Close reason sent by the peer, possibly empty.
        reason: String,
    },

    /// The operator closed the console (Ctrl-D / end of input).
    #[error("console closed")]
    ConsoleEof,

    /// The operator interrupted the console (Ctrl-C).
    #[error("interrupted")]
    Interrupted,

    /// Sending an outbound frame failed.
    #[error("write failed: {0}")]
    Write(#[source] BoxError),

    /// A frame arrived whose kind is neither text nor binary.
    #[error("unknown websocket frame type: {0}")]
    UnsupportedFrameKind(u8),

    /// Writing a rendered record to the terminal failed.
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),

    /// Both loops stopped without reporting an outcome.
    #[error("session ended without an outcome")]
    NoOutcome,

    /// A session task panicked or was aborted before reporting.
    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SessionError {
    /// Returns `true` for outcomes caused by the operator ending the session.
    ///
    /// The binary exits with status 0 for these.
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, Self::ConsoleEof | Self::Interrupted)
    }

    /// Wraps any error as a read failure.
    pub fn read(err: impl Into<BoxError>) -> Self {
        Self::Read(err.into())
    }

    /// Wraps any error as a write failure.
    pub fn write(err: impl Into<BoxError>) -> Self {
        Self::Write(err.into())
    }
}

fn format_reason(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(": {reason}")
    }
}
