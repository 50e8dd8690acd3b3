//! Application-wide constants for wsbridge.
//!
//! # Categories
//!
//! - **Protocol**: reserved payloads and close codes
//! - **Console**: prompt defaults
//! - **Environment**: variable names read at startup

// ============================================================================
// Protocol
// ============================================================================

/// Keep-alive payload sent by the remote endpoint.
///
/// Matched byte-for-byte. `{"type": "heartbeat"}` (extra space) is a regular
/// message and is rendered.
pub const HEARTBEAT_PAYLOAD: &str = r#"{"type":"heartbeat"}"#;

/// Close code reported when the peer sent a close frame without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the stream ended without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Capacity of the session completion channel.
///
/// Only the first outcome is observed; later ones are dropped by `try_send`.
pub const COMPLETION_SLOTS: usize = 1;

// ============================================================================
// Console
// ============================================================================

/// Prompt shown in front of the operator's input line.
pub const DEFAULT_PROMPT: &str = "> ";

// ============================================================================
// Environment
// ============================================================================

/// Overrides the `Origin` header sent during the handshake.
pub const ENV_ORIGIN: &str = "WSBRIDGE_ORIGIN";

/// Path of a file that receives log output instead of stderr.
pub const ENV_LOG_FILE: &str = "WSBRIDGE_LOG_FILE";

/// Disables colour output when set to a non-empty value (<https://no-color.org>).
pub const ENV_NO_COLOR: &str = "NO_COLOR";
