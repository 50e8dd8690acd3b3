//! Output renderer for inbound messages.
//!
//! Each rendered record is three lines:
//!
//! ```text
//! < {"hello":"world"}
//! < JSON payload size: 17 bytes
//! <
//! ```
//!
//! The renderer owns its output sink and is handed to the stream loop by the
//! session coordinator.

use std::fmt;
use std::io::{self, Write};

use crossterm::style::Stylize;

/// Writes decoded payloads to the terminal.
pub struct Renderer {
    out: Box<dyn Write + Send>,
    color: bool,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Creates a renderer writing to `out`, green when `color` is set.
    pub fn new(out: Box<dyn Write + Send>, color: bool) -> Self {
        Self { out, color }
    }

    /// Writes one record for `text` and flushes the sink.
    ///
    /// The size annotation is the UTF-8 byte length, not the character count.
    pub fn render(&mut self, text: &str) -> io::Result<()> {
        self.line(&format!("< {text}"))?;
        self.line(&format!("< JSON payload size: {} bytes", text.len()))?;
        self.line("<")?;
        self.out.flush()
    }

    fn line(&mut self, line: &str) -> io::Result<()> {
        if self.color {
            writeln!(self.out, "{}", line.green())
        } else {
            writeln!(self.out, "{line}")
        }
    }
}
