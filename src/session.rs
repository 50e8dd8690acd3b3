//! Session coordinator and the two bridge loops.
//!
//! # Architecture
//!
//! ```text
//! LineReader ──read_line──▶ console loop ──send_text──▶ FrameSink
//!                                                          │
//!                                                       (remote)
//!                                                          │
//! Renderer ◀──render── heartbeat filter ◀──decode── stream loop ◀──recv── FrameSource
//! ```
//!
//! Each loop runs in its own tokio task and owns the handles it uses. The
//! first loop to fail publishes its error on a one-slot channel with
//! `try_send`; a second failure finds the slot full and is dropped, so no
//! loop ever blocks on reporting. The coordinator then cancels the other
//! loop, takes the handles back, releases the console, and closes the
//! connection.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::console::{Console, LineReader};
use crate::constants::COMPLETION_SLOTS;
use crate::error::SessionError;
use crate::frame::is_heartbeat;
use crate::render::Renderer;
use crate::transport::{FrameSink, FrameSource};
use crate::ws;

/// One bridge between the operator's console and a connection.
#[derive(Debug)]
pub struct Session<W, R, L> {
    writer: W,
    reader: R,
    console: L,
    renderer: Renderer,
}

impl Session<ws::WsWriter, ws::WsReader, Console> {
    /// Dials the configured URL and opens the console.
    pub async fn connect(config: &Config) -> Result<Self, SessionError> {
        let (writer, reader) = ws::dial(&config.url, &config.origin).await?;
        Self::establish(writer, reader, || Console::open(&config.prompt), config.color).await
    }
}

impl<W, R, L> Session<W, R, L>
where
    W: FrameSink,
    R: FrameSource,
    L: LineReader,
{
    /// Opens the console for an already dialed connection.
    ///
    /// If the console cannot be opened the connection is closed before the
    /// error is returned.
    pub async fn establish<F>(
        mut writer: W,
        reader: R,
        open_console: F,
        color: bool,
    ) -> Result<Self, SessionError>
    where
        F: FnOnce() -> Result<L, SessionError>,
    {
        let console = match open_console() {
            Ok(console) => console,
            Err(e) => {
                if let Err(close_err) = writer.close().await {
                    log::debug!("Close after console failure: {close_err}");
                }
                return Err(e);
            }
        };

        let renderer = Renderer::new(console.output(), color);
        Ok(Self::new(writer, reader, console, renderer))
    }

    /// Assembles a session from already opened handles.
    pub fn new(writer: W, reader: R, console: L, renderer: Renderer) -> Self {
        Self {
            writer,
            reader,
            console,
            renderer,
        }
    }

    /// Runs both loops until the first one fails and returns that failure.
    ///
    /// The console is released and the connection closed on every path.
    pub async fn run(self) -> SessionError {
        let Self {
            mut writer,
            mut reader,
            mut console,
            mut renderer,
        } = self;

        let (done_tx, mut done_rx) = mpsc::channel::<SessionError>(COMPLETION_SLOTS);
        let cancel = CancellationToken::new();

        let console_task = {
            let done_tx = done_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Some(err) = console_loop(&mut console, &mut writer, &cancel).await {
                    report(&done_tx, err);
                }
                (console, writer)
            })
        };

        let stream_task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Some(err) = stream_loop(&mut reader, &mut renderer, &cancel).await {
                    report(&done_tx, err);
                }
            })
        };

        let outcome = done_rx.recv().await;
        cancel.cancel();
        log::debug!("Session ending: {outcome:?}");

        let (console_join, stream_join) = tokio::join!(console_task, stream_task);

        let mut task_error = None;
        match console_join {
            Ok((mut console, mut writer)) => {
                console.release();
                if let Err(e) = writer.close().await {
                    log::debug!("Close on session end: {e}");
                }
            }
            Err(e) => {
                log::error!("Console task failed: {e}");
                task_error = Some(SessionError::from(e));
            }
        }
        if let Err(e) = stream_join {
            log::error!("Stream task failed: {e}");
            task_error.get_or_insert(SessionError::from(e));
        }

        match (outcome, task_error) {
            (Some(err), _) | (None, Some(err)) => err,
            (None, None) => SessionError::NoOutcome,
        }
    }
}

/// Dials, opens the console, and runs a session with `config`.
pub async fn run(config: &Config) -> SessionError {
    match Session::connect(config).await {
        Ok(session) => session.run().await,
        Err(e) => e,
    }
}

/// Publishes a loop outcome without waiting for room in the slot.
fn report(done: &mpsc::Sender<SessionError>, err: SessionError) {
    if let Err(mpsc::error::TrySendError::Full(dropped)) = done.try_send(err) {
        log::debug!("Outcome already recorded, dropping: {dropped}");
    }
}

/// Forwards console lines as text frames.
///
/// Returns `None` when cancelled, otherwise the failure that stopped it.
pub async fn console_loop<L, W>(
    console: &mut L,
    writer: &mut W,
    cancel: &CancellationToken,
) -> Option<SessionError>
where
    L: LineReader,
    W: FrameSink,
{
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => return None,
            line = console.read_line() => match line {
                Ok(line) => line,
                Err(e) => return Some(e),
            },
        };

        log::trace!("Sending {} bytes", line.len());
        tokio::select! {
            () = cancel.cancelled() => return None,
            sent = writer.send_text(&line) => {
                if let Err(e) = sent {
                    return Some(e);
                }
            }
        }
    }
}

/// Decodes, filters, and renders inbound frames.
///
/// Returns `None` when cancelled, otherwise the failure that stopped it.
pub async fn stream_loop<R>(
    reader: &mut R,
    renderer: &mut Renderer,
    cancel: &CancellationToken,
) -> Option<SessionError>
where
    R: FrameSource,
{
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => return None,
            frame = reader.recv() => match frame {
                Ok(frame) => frame,
                Err(e) => return Some(e),
            },
        };

        let text = match frame.decode() {
            Ok(text) => text,
            Err(e) => return Some(e),
        };

        if is_heartbeat(&text) {
            log::trace!("Heartbeat suppressed");
            continue;
        }

        if let Err(e) = renderer.render(&text) {
            return Some(SessionError::Output(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HEARTBEAT_PAYLOAD;
    use crate::frame::{Frame, FrameKind};
    use crate::render::tests::SharedBuf;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Scripted console: yields `lines`, then `end` (or blocks forever).
    struct MockConsole {
        lines: VecDeque<String>,
        end: Option<SessionError>,
        out: SharedBuf,
        released: Arc<AtomicUsize>,
    }

    impl MockConsole {
        fn new(lines: &[&str], end: Option<SessionError>) -> Self {
            Self {
                lines: lines.iter().map(|l| (*l).to_string()).collect(),
                end,
                out: SharedBuf::default(),
                released: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl LineReader for MockConsole {
        async fn read_line(&mut self) -> Result<String, SessionError> {
            if let Some(line) = self.lines.pop_front() {
                return Ok(line);
            }
            match self.end.take() {
                Some(err) => Err(err),
                None => std::future::pending().await,
            }
        }

        fn output(&self) -> Box<dyn Write + Send> {
            Box::new(self.out.clone())
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Scripted reader: yields `frames` in order, then blocks forever.
    struct MockReader {
        frames: VecDeque<Result<Frame, SessionError>>,
    }

    #[async_trait]
    impl FrameSource for MockReader {
        async fn recv(&mut self) -> Result<Frame, SessionError> {
            match self.frames.pop_front() {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }
    }

    /// Writer that records sent lines.
    #[derive(Default)]
    struct RecordingWriter {
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl FrameSink for RecordingWriter {
        async fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
            if let Some(msg) = &self.fail_with {
                return Err(SessionError::write(io::Error::other(msg.clone())));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    type Inbound = mpsc::UnboundedSender<Result<Frame, SessionError>>;

    /// Writer wired to a `ChannelReader`: replies to each line via `reply`.
    struct EchoWriter {
        inbound: Inbound,
        reply: fn(&str, &Inbound),
    }

    #[async_trait]
    impl FrameSink for EchoWriter {
        async fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
            (self.reply)(text, &self.inbound);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    struct ChannelReader {
        rx: mpsc::UnboundedReceiver<Result<Frame, SessionError>>,
    }

    #[async_trait]
    impl FrameSource for ChannelReader {
        async fn recv(&mut self) -> Result<Frame, SessionError> {
            match self.rx.recv().await {
                Some(next) => next,
                None => Err(SessionError::Closed {
                    code: 1006,
                    reason: String::new(),
                }),
            }
        }
    }

    fn render_count(out: &SharedBuf) -> usize {
        out.contents().matches("JSON payload size").count()
    }

    async fn run_session<W: FrameSink, R: FrameSource>(
        writer: W,
        reader: R,
        console: MockConsole,
    ) -> SessionError {
        let renderer = Renderer::new(console.output(), false);
        tokio::time::timeout(TEST_TIMEOUT, Session::new(writer, reader, console, renderer).run())
            .await
            .expect("session deadlocked")
    }

    #[tokio::test]
    async fn test_heartbeat_reply_is_not_rendered() {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = EchoWriter {
            inbound: tx,
            reply: |text, inbound| {
                assert_eq!(text, "ping");
                inbound.send(Ok(Frame::text(HEARTBEAT_PAYLOAD))).unwrap();
                inbound
                    .send(Err(SessionError::Closed {
                        code: 1000,
                        reason: "bye".into(),
                    }))
                    .unwrap();
            },
        };
        let console = MockConsole::new(&["ping"], None);
        let out = console.out.clone();

        let outcome = run_session(writer, ChannelReader { rx }, console).await;

        assert!(matches!(outcome, SessionError::Closed { code: 1000, .. }));
        assert_eq!(render_count(&out), 0);
        assert_eq!(out.contents(), "");
    }

    #[tokio::test]
    async fn test_read_error_after_text_frame() {
        let reader = MockReader {
            frames: VecDeque::from([
                Ok(Frame::text("hello")),
                Err(SessionError::read(io::Error::other("boom"))),
            ]),
        };
        let writer = RecordingWriter::default();
        let closed = Arc::clone(&writer.closed);
        let console = MockConsole::new(&[], None);
        let out = console.out.clone();
        let released = Arc::clone(&console.released);

        let outcome = run_session(writer, reader, console).await;

        assert!(matches!(outcome, SessionError::Read(_)));
        assert!(outcome.to_string().contains("boom"));
        assert_eq!(out.contents().matches("< hello\n").count(), 1);
        assert_eq!(render_count(&out), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_simultaneous_failures_yield_one_outcome() {
        for _ in 0..50 {
            let reader = MockReader {
                frames: VecDeque::from([Err(SessionError::read(io::Error::other("stream")))]),
            };
            let console = MockConsole::new(&[], Some(SessionError::read(io::Error::other("console"))));
            let released = Arc::clone(&console.released);

            let outcome = run_session(RecordingWriter::default(), reader, console).await;

            let msg = outcome.to_string();
            assert!(msg.contains("stream") || msg.contains("console"), "{msg}");
            assert_eq!(released.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_unsupported_frame_never_rendered() {
        let reader = MockReader {
            frames: VecDeque::from([
                Ok(Frame {
                    kind: FrameKind::Other(0xA),
                    payload: b"pong".to_vec(),
                }),
                Ok(Frame::text("after")),
            ]),
        };
        let console = MockConsole::new(&[], None);
        let out = console.out.clone();

        let outcome = run_session(RecordingWriter::default(), reader, console).await;

        assert!(matches!(outcome, SessionError::UnsupportedFrameKind(0xA)));
        assert_eq!(render_count(&out), 0);
    }

    #[tokio::test]
    async fn test_console_eof_is_outcome_and_lines_sent_in_order() {
        let writer = RecordingWriter::default();
        let sent = Arc::clone(&writer.sent);
        let console = MockConsole::new(&["one", "two", "three"], Some(SessionError::ConsoleEof));
        let reader = MockReader {
            frames: VecDeque::new(),
        };

        let outcome = run_session(writer, reader, console).await;

        assert!(outcome.is_clean_exit());
        assert_eq!(*sent.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_send_failure_ends_session() {
        let writer = RecordingWriter {
            fail_with: Some("broken pipe".into()),
            ..RecordingWriter::default()
        };
        let console = MockConsole::new(&["hi"], None);
        let released = Arc::clone(&console.released);
        let reader = MockReader {
            frames: VecDeque::new(),
        };

        let outcome = run_session(writer, reader, console).await;

        assert!(matches!(outcome, SessionError::Write(_)));
        assert!(outcome.to_string().contains("broken pipe"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_binary_and_heartbeat_mix() {
        let reader = MockReader {
            frames: VecDeque::from([
                Ok(Frame::text(HEARTBEAT_PAYLOAD)),
                Ok(Frame::binary(vec![0x4a, 0xff])),
                Ok(Frame::text(r#"{"type": "heartbeat"}"#)),
                Ok(Frame::text("")),
                Err(SessionError::Closed {
                    code: 1000,
                    reason: String::new(),
                }),
            ]),
        };
        let console = MockConsole::new(&[], None);
        let out = console.out.clone();

        let outcome = run_session(RecordingWriter::default(), reader, console).await;

        assert!(matches!(outcome, SessionError::Closed { code: 1000, .. }));
        let rendered = out.contents();
        assert_eq!(render_count(&out), 3);
        assert!(rendered.contains("< 4a ff \n< JSON payload size: 6 bytes\n<\n"));
        assert!(rendered.contains("< {\"type\": \"heartbeat\"}\n"));
        assert!(rendered.contains("< \n< JSON payload size: 0 bytes\n"));
        assert!(!rendered.contains(HEARTBEAT_PAYLOAD));
    }

    /// Sink whose every write fails, like a closed terminal.
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_render_failure_ends_session() {
        let reader = MockReader {
            frames: VecDeque::from([Ok(Frame::text("hello"))]),
        };
        let console = MockConsole::new(&[], None);
        let released = Arc::clone(&console.released);
        let renderer = Renderer::new(Box::new(BrokenSink), false);

        let outcome = tokio::time::timeout(
            TEST_TIMEOUT,
            Session::new(RecordingWriter::default(), reader, console, renderer).run(),
        )
        .await
        .expect("session deadlocked");

        assert!(matches!(outcome, SessionError::Output(_)));
        assert!(outcome.to_string().contains("terminal gone"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_console_init_failure_closes_connection() {
        let writer = RecordingWriter::default();
        let closed = Arc::clone(&writer.closed);
        let reader = MockReader {
            frames: VecDeque::new(),
        };

        let result = Session::establish(
            writer,
            reader,
            || -> Result<MockConsole, SessionError> {
                Err(SessionError::LineReaderInit(io::Error::other("no tty")))
            },
            false,
        )
        .await;

        let err = match result {
            Ok(_) => panic!("console opener failure must abort the session"),
            Err(e) => e,
        };
        assert!(matches!(err, SessionError::LineReaderInit(_)));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_establish_wires_renderer_to_console_output() {
        let reader = MockReader {
            frames: VecDeque::from([
                Ok(Frame::text("hi")),
                Err(SessionError::Closed {
                    code: 1000,
                    reason: String::new(),
                }),
            ]),
        };
        let console = MockConsole::new(&[], None);
        let out = console.out.clone();

        let session = match Session::establish(RecordingWriter::default(), reader, || Ok(console), false).await {
            Ok(session) => session,
            Err(e) => panic!("establish failed: {e}"),
        };
        let outcome = tokio::time::timeout(TEST_TIMEOUT, session.run())
            .await
            .expect("session deadlocked");

        assert!(matches!(outcome, SessionError::Closed { code: 1000, .. }));
        assert_eq!(render_count(&out), 1);
    }

    #[tokio::test]
    async fn test_loops_stop_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut console = MockConsole::new(&[], None);
        let mut writer = RecordingWriter::default();
        assert!(console_loop(&mut console, &mut writer, &cancel).await.is_none());

        let mut reader = MockReader {
            frames: VecDeque::new(),
        };
        let mut renderer = Renderer::new(Box::new(SharedBuf::default()), false);
        assert!(stream_loop(&mut reader, &mut renderer, &cancel).await.is_none());
    }
}
