//! WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves that implement the [`crate::transport`] traits.
//!
//! # Architecture
//!
//! A single [`connect`] function handles URL→request building, header
//! insertion, and TLS negotiation. It returns a ([`WsWriter`], [`WsReader`])
//! pair so the session can drive each direction from its own task.
//!
//! Ping and pong frames never reach the session: tungstenite queues the pong
//! reply itself and flushes it on the next read or write.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, http::Uri, Message};

use crate::constants::{CLOSE_ABNORMAL, CLOSE_NO_STATUS};
use crate::error::SessionError;
use crate::frame::{Frame, FrameKind};
use crate::transport::{FrameSink, FrameSource};

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsWriter {
    async fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(SessionError::write)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.sink.close().await.map_err(SessionError::write)
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsReader {
    async fn recv(&mut self) -> Result<Frame, SessionError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::text(text.to_string())),
                Some(Ok(Message::Binary(data))) => return Ok(Frame::binary(data.to_vec())),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    log::trace!("Control frame absorbed by transport");
                }
                Some(Ok(Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    log::info!("WebSocket closed by server (code {code})");
                    return Err(SessionError::Closed { code, reason });
                }
                Some(Ok(Message::Frame(frame))) => {
                    return Ok(Frame {
                        kind: FrameKind::Other(u8::from(frame.header().opcode)),
                        payload: frame.payload().to_vec(),
                    });
                }
                Some(Err(e)) => {
                    log::error!("WebSocket error: {e}");
                    return Err(SessionError::read(e));
                }
                None => {
                    return Err(SessionError::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "connection ended without close frame".to_string(),
                    });
                }
            }
        }
    }
}

/// Connect to a WebSocket URL with optional headers.
///
/// Builds an HTTP request from `url`, inserts each `(name, value)` header,
/// then performs the WebSocket handshake.
///
/// # Errors
///
/// Returns [`SessionError::Connect`] if the URL is invalid, a header is
/// malformed, or the handshake fails.
pub async fn connect(
    url: &str,
    headers: &[(&str, &str)],
) -> Result<(WsWriter, WsReader), SessionError> {
    use tungstenite::client::IntoClientRequest;

    let connect_err = |source: crate::error::BoxError| SessionError::Connect {
        url: url.to_string(),
        source,
    };

    let mut request = url
        .into_client_request()
        .map_err(|e| connect_err(e.into()))?;

    for &(name, value) in headers {
        let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| connect_err(format!("invalid header name {name}: {e}").into()))?;
        let header_value = tungstenite::http::HeaderValue::from_str(value)
            .map_err(|e| connect_err(format!("invalid header value for {name}: {e}").into()))?;
        request.headers_mut().insert(header_name, header_value);
    }

    log::debug!("Connecting to {url}");
    let (ws_stream, response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| connect_err(e.into()))?;
    log::info!("Connected to {url} (HTTP {})", response.status());

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Connect to `url`, sending `origin` as the `Origin` header.
pub async fn dial(url: &str, origin: &str) -> Result<(WsWriter, WsReader), SessionError> {
    connect(url, &[("Origin", origin)]).await
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replace("https://", "wss://")
            .replace("http://", "ws://")
    }
}

/// Derive a default `Origin` from a WebSocket URL.
///
/// `ws://host:port/path` becomes `http://host:port`, `wss://` becomes
/// `https://`. Returns `None` when the URL has no scheme or host.
pub fn origin_for(url: &str) -> Option<String> {
    let uri: Uri = url.parse().ok()?;
    let scheme = match uri.scheme_str()? {
        "wss" | "https" => "https",
        "ws" | "http" => "http",
        _ => return None,
    };
    let authority = uri.authority()?;
    // Drop any userinfo; origins never carry credentials.
    let host = authority
        .as_str()
        .rsplit_once('@')
        .map_or(authority.as_str(), |(_, host)| host);
    Some(format!("{scheme}://{host}"))
}
