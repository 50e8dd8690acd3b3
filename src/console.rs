//! Terminal line reader.
//!
//! # Modes
//!
//! - **Raw** (stdin is a TTY): crossterm raw mode plus an [`EventStream`].
//!   Keys are mapped onto a [`tui_input::Input`] with the usual readline
//!   bindings (arrows, Home/End, Ctrl-A/E/U/K/W, Ctrl-C interrupts, Ctrl-D on
//!   an empty line ends input).
//! - **Plain** (stdin is a pipe or file): one line per `read_line`, no prompt.
//!
//! Output written through [`LineReader::output`] erases the prompt line
//! first and redraws it, with any half-typed input, on flush. Rendered
//! messages therefore never interleave with what the operator is typing.
//!
//! [`Console::release`] clears the prompt and restores the terminal. It is
//! idempotent and also runs on drop.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use crossterm::cursor::{MoveLeft, MoveToColumn};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::tty::IsTty;
use crossterm::queue;
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tui_input::{Input, InputRequest};

use crate::error::SessionError;

/// Line-editing collaborator used by the console loop.
#[async_trait]
pub trait LineReader: Send + 'static {
    /// Waits for the operator to submit one line (without the newline).
    ///
    /// Ending input yields [`SessionError::ConsoleEof`], Ctrl-C yields
    /// [`SessionError::Interrupted`].
    async fn read_line(&mut self) -> Result<String, SessionError>;

    /// Output sink that cooperates with the prompt line.
    fn output(&self) -> Box<dyn Write + Send>;

    /// Releases the terminal. Safe to call any number of times.
    fn release(&mut self);
}

// ============================================================================
// Key handling
// ============================================================================

/// Result of applying one key press to the input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Enter: the line is complete.
    Submit(String),
    /// Ctrl-C.
    Interrupt,
    /// Ctrl-D on an empty line.
    Eof,
    /// The buffer or cursor changed.
    Redraw,
    /// Nothing to do.
    Ignore,
}

/// Maps an editing key to its [`InputRequest`].
///
/// Enter, Ctrl-C and Ctrl-D are session-level keys and handled by
/// [`apply_key`].
pub fn key_request(key: &KeyEvent) -> Option<InputRequest> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let req = match key.code {
        KeyCode::Char('a') if ctrl => InputRequest::GoToStart,
        KeyCode::Char('e') if ctrl => InputRequest::GoToEnd,
        KeyCode::Char('b') if ctrl => InputRequest::GoToPrevChar,
        KeyCode::Char('f') if ctrl => InputRequest::GoToNextChar,
        KeyCode::Char('h') if ctrl => InputRequest::DeletePrevChar,
        KeyCode::Char('u') if ctrl => InputRequest::DeleteLine,
        KeyCode::Char('k') if ctrl => InputRequest::DeleteTillEnd,
        KeyCode::Char('w') if ctrl => InputRequest::DeletePrevWord,
        KeyCode::Char('b') if alt => InputRequest::GoToPrevWord,
        KeyCode::Char('f') if alt => InputRequest::GoToNextWord,
        KeyCode::Char(_) if ctrl || alt => return None,
        KeyCode::Char(c) => InputRequest::InsertChar(c),
        KeyCode::Backspace => InputRequest::DeletePrevChar,
        KeyCode::Delete => InputRequest::DeleteNextChar,
        KeyCode::Left if ctrl || alt => InputRequest::GoToPrevWord,
        KeyCode::Right if ctrl || alt => InputRequest::GoToNextWord,
        KeyCode::Left => InputRequest::GoToPrevChar,
        KeyCode::Right => InputRequest::GoToNextChar,
        KeyCode::Home => InputRequest::GoToStart,
        KeyCode::End => InputRequest::GoToEnd,
        _ => return None,
    };
    Some(req)
}

/// Applies a key press to `input`.
pub fn apply_key(input: &mut Input, key: &KeyEvent) -> KeyOutcome {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => {
            let line = input.value().to_string();
            input.reset();
            KeyOutcome::Submit(line)
        }
        KeyCode::Char('c') if ctrl => {
            input.reset();
            KeyOutcome::Interrupt
        }
        KeyCode::Char('d') if ctrl => {
            if input.value().is_empty() {
                return KeyOutcome::Eof;
            }
            input.handle(InputRequest::DeleteNextChar);
            KeyOutcome::Redraw
        }
        _ => match key_request(key) {
            Some(req) => {
                input.handle(req);
                KeyOutcome::Redraw
            }
            None => KeyOutcome::Ignore,
        },
    }
}

// ============================================================================
// Console
// ============================================================================

/// Prompt and input shared between the reader and its output sink.
#[derive(Debug)]
struct PromptState {
    prompt: String,
    input: Input,
    raw: bool,
    /// A `read_line` is waiting, so the prompt is on screen.
    active: bool,
    /// The prompt line was erased by an output write and awaits a redraw.
    erased: bool,
}

impl PromptState {
    fn new(prompt: &str, raw: bool) -> Self {
        Self {
            prompt: prompt.to_string(),
            input: Input::default(),
            raw,
            active: false,
            erased: false,
        }
    }
}

type SharedPrompt = Arc<Mutex<PromptState>>;

fn lock(state: &SharedPrompt) -> MutexGuard<'_, PromptState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn clear_line(out: &mut impl Write) -> io::Result<()> {
    queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))
}

fn draw_prompt(out: &mut impl Write, state: &PromptState) -> io::Result<()> {
    let value = state.input.value();
    clear_line(out)?;
    queue!(out, Print(&state.prompt), Print(value))?;

    // Display columns right of the cursor; wide characters count twice.
    let full_width = Input::new(value.to_string()).visual_cursor();
    let tail = full_width.saturating_sub(state.input.visual_cursor());
    if tail > 0 {
        queue!(out, MoveLeft(u16::try_from(tail).unwrap_or(u16::MAX)))?;
    }
    Ok(())
}

enum Mode {
    Raw(EventStream),
    Plain(Lines<BufReader<Stdin>>),
}

/// Stdin-backed [`LineReader`].
pub struct Console {
    mode: Mode,
    state: SharedPrompt,
    released: bool,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            Mode::Raw(_) => "raw",
            Mode::Plain(_) => "plain",
        };
        f.debug_struct("Console")
            .field("mode", &mode)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Console {
    /// Opens the console, entering raw mode when stdin is a terminal.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LineReaderInit`] if raw mode cannot be enabled.
    pub fn open(prompt: &str) -> Result<Self, SessionError> {
        let raw = io::stdin().is_tty();
        let mode = if raw {
            terminal::enable_raw_mode().map_err(SessionError::LineReaderInit)?;
            Mode::Raw(EventStream::new())
        } else {
            Mode::Plain(BufReader::new(tokio::io::stdin()).lines())
        };
        log::debug!("Console opened (raw: {raw})");

        Ok(Self {
            mode,
            state: Arc::new(Mutex::new(PromptState::new(prompt, raw))),
            released: false,
        })
    }

    async fn read_raw(events: &mut EventStream, state: &SharedPrompt) -> Result<String, SessionError> {
        let mut stdout = io::stdout();
        {
            let mut st = lock(state);
            st.active = true;
            draw_prompt(&mut stdout, &st).map_err(SessionError::Output)?;
        }
        stdout.flush().map_err(SessionError::Output)?;

        loop {
            let event = match events.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Err(SessionError::read(e)),
                None => return Err(SessionError::ConsoleEof),
            };

            let mut st = lock(state);
            let outcome = match event {
                Event::Key(key) if key.kind != KeyEventKind::Release => apply_key(&mut st.input, &key),
                Event::Resize(..) => KeyOutcome::Redraw,
                _ => KeyOutcome::Ignore,
            };

            let (result, trailer) = match outcome {
                KeyOutcome::Submit(line) => (Ok(line), "\r\n"),
                KeyOutcome::Interrupt => (Err(SessionError::Interrupted), "^C\r\n"),
                KeyOutcome::Eof => (Err(SessionError::ConsoleEof), "\r\n"),
                KeyOutcome::Redraw => {
                    draw_prompt(&mut stdout, &st).map_err(SessionError::Output)?;
                    stdout.flush().map_err(SessionError::Output)?;
                    continue;
                }
                KeyOutcome::Ignore => continue,
            };

            st.active = false;
            stdout
                .write_all(trailer.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(SessionError::Output)?;
            return result;
        }
    }

    async fn read_plain(lines: &mut Lines<BufReader<Stdin>>) -> Result<String, SessionError> {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => Ok(line),
                Ok(None) => Err(SessionError::ConsoleEof),
                Err(e) => Err(SessionError::read(e)),
            },
            _ = tokio::signal::ctrl_c() => Err(SessionError::Interrupted),
        }
    }
}

#[async_trait]
impl LineReader for Console {
    async fn read_line(&mut self) -> Result<String, SessionError> {
        if self.released {
            return Err(SessionError::ConsoleEof);
        }
        match &mut self.mode {
            Mode::Raw(events) => Self::read_raw(events, &self.state).await,
            Mode::Plain(lines) => Self::read_plain(lines).await,
        }
    }

    fn output(&self) -> Box<dyn Write + Send> {
        Box::new(ConsoleOutput::new(Arc::clone(&self.state), io::stdout()))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut st = lock(&self.state);
        if st.raw {
            // Leave the cursor on a clean line for whatever prints next.
            let mut stdout = io::stdout();
            if st.active {
                if let Err(e) = clear_line(&mut stdout).and_then(|()| stdout.flush()) {
                    log::debug!("Failed to clear prompt: {e}");
                }
            }
            if let Err(e) = terminal::disable_raw_mode() {
                log::warn!("Failed to restore terminal: {e}");
            }
            st.raw = false;
        }
        st.active = false;
        log::debug!("Console released");
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.release();
    }
}

/// Output sink that keeps the prompt line intact.
struct ConsoleOutput<O> {
    state: SharedPrompt,
    out: O,
}

impl<O: Write> ConsoleOutput<O> {
    fn new(state: SharedPrompt, out: O) -> Self {
        Self { state, out }
    }
}

impl<O: Write> Write for ConsoleOutput<O> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut st = lock(&self.state);
        if !st.raw {
            return self.out.write(buf);
        }
        if st.active && !st.erased {
            clear_line(&mut self.out)?;
            st.erased = true;
        }
        // Raw mode does not translate newlines.
        for chunk in buf.split_inclusive(|b| *b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(body) => {
                    self.out.write_all(body)?;
                    self.out.write_all(b"\r\n")?;
                }
                None => self.out.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut st = lock(&self.state);
        if st.erased {
            st.erased = false;
            if st.active {
                draw_prompt(&mut self.out, &st)?;
            }
        }
        self.out.flush()
    }
}
