//! wsbridge - interactive terminal client for one WebSocket connection.
//!
//! Lines typed at the prompt are sent as text frames; frames from the server
//! are decoded, keep-alive heartbeats are dropped, and everything else is
//! printed with its payload size.
//!
//! # Architecture
//!
//! - **Session** - owns the connection and console, runs the two loops,
//!   returns the first failure
//! - **Console** - raw-mode line editor with a prompt-aware output sink
//! - **Transport** - `FrameSink` / `FrameSource` traits, implemented over
//!   WebSocket by [`ws`]
//!
//! # Modules
//!
//! - [`session`] - coordinator, console loop, stream loop
//! - [`frame`] - decoding and heartbeat detection
//! - [`render`] - output records
//! - [`config`] - configuration loading

pub mod config;
pub mod console;
pub mod constants;
pub mod error;
pub mod frame;
pub mod render;
pub mod session;
pub mod transport;
pub mod ws;

pub use config::Config;
pub use error::SessionError;
pub use frame::{Frame, FrameKind};
pub use render::Renderer;
pub use session::Session;
