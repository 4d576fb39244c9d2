use async_trait::async_trait;
use futures_util::StreamExt;
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::MonitorError;

/// Opens session-scoped duplex streams.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, session_id: &str) -> Result<Box<dyn FrameStream>, MonitorError>;
}

/// An open stream of text frames.
#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame; `None` once the peer has closed the stream.
    async fn next_frame(&mut self) -> Option<Result<String, MonitorError>>;

    /// Clean close initiated by this side.
    async fn close(&mut self);
}

/// WebSocket transport against the backend's `/ws/{session_id}` endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    base_url: String,
}

impl WebSocketTransport {
    /// `api_base_url` is the HTTP base of the backend; the scheme is swapped
    /// for `ws`/`wss`.
    pub fn new(api_base_url: &str) -> Self {
        Self {
            base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn stream_url(&self, session_id: &str) -> String {
        let base = match self.base_url.strip_prefix("http") {
            Some(rest) => format!("ws{rest}"),
            None => self.base_url.clone(),
        };
        format!("{base}/ws/{session_id}")
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, session_id: &str) -> Result<Box<dyn FrameStream>, MonitorError> {
        let url = self.stream_url(session_id);
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|err| MonitorError::Transport(format!("connect {url}: {err}")))?;
        Ok(Box::new(WebSocketFrames { socket }))
    }
}

struct WebSocketFrames {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameStream for WebSocketFrames {
    async fn next_frame(&mut self) -> Option<Result<String, MonitorError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(err) => return Some(Err(MonitorError::Transport(err.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed("Manual disconnect"),
        };
        // The peer may already be gone; nothing to recover either way.
        let _ = self.socket.close(Some(frame)).await;
    }
}
