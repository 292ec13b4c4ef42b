//! Transport-neutral websocket frames.
//!
//! The client socket (axum) and the backend socket (tungstenite) speak
//! different message types. Both are adapted to [`SocketEvent`] on the way
//! in and from [`Frame`] on the way out, so the pairing logic is written
//! once against plain streams and sinks.

use std::future;

use axum::body::Bytes;
use axum::extract::ws::{self, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, protocol::frame::coding::CloseCode};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Socket to the backend.
pub type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A frame to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Close(Option<CloseInfo>),
}

/// Something observed on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Message(Frame),
    Closed(Option<CloseInfo>),
    Error(String),
}

fn from_client(message: Result<ws::Message, axum::Error>) -> Option<SocketEvent> {
    match message {
        Ok(ws::Message::Text(text)) => Some(SocketEvent::Message(Frame::Text(text.as_str().to_owned()))),
        Ok(ws::Message::Binary(data)) => Some(SocketEvent::Message(Frame::Binary(data))),
        Ok(ws::Message::Close(frame)) => Some(SocketEvent::Closed(
            frame.map(|f| CloseInfo::new(f.code, f.reason.as_str())),
        )),
        // Control frames are answered by the socket itself.
        Ok(ws::Message::Ping(_)) | Ok(ws::Message::Pong(_)) => None,
        Err(err) => Some(SocketEvent::Error(err.to_string())),
    }
}

fn from_backend(
    message: Result<tungstenite::Message, tungstenite::Error>,
) -> Option<SocketEvent> {
    match message {
        Ok(tungstenite::Message::Text(text)) => {
            Some(SocketEvent::Message(Frame::Text(text.as_str().to_owned())))
        }
        Ok(tungstenite::Message::Binary(data)) => Some(SocketEvent::Message(Frame::Binary(data))),
        Ok(tungstenite::Message::Close(frame)) => Some(SocketEvent::Closed(
            frame.map(|f| CloseInfo::new(u16::from(f.code), f.reason.as_str())),
        )),
        Ok(tungstenite::Message::Ping(_))
        | Ok(tungstenite::Message::Pong(_))
        | Ok(tungstenite::Message::Frame(_)) => None,
        Err(tungstenite::Error::ConnectionClosed) => Some(SocketEvent::Closed(None)),
        Err(err) => Some(SocketEvent::Error(err.to_string())),
    }
}

impl From<Frame> for ws::Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ws::Message::Text(text.into()),
            Frame::Binary(data) => ws::Message::Binary(data),
            Frame::Close(info) => ws::Message::Close(info.map(|i| ws::CloseFrame {
                code: i.code,
                reason: i.reason.into(),
            })),
        }
    }
}

impl From<Frame> for tungstenite::Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => tungstenite::Message::Text(text.into()),
            Frame::Binary(data) => tungstenite::Message::Binary(data),
            Frame::Close(info) => {
                tungstenite::Message::Close(info.map(|i| tungstenite::protocol::CloseFrame {
                    code: CloseCode::from(i.code),
                    reason: i.reason.into(),
                }))
            }
        }
    }
}

/// Split the client socket into an event stream and a frame sink.
pub fn client_halves(
    socket: WebSocket,
) -> (
    impl Stream<Item = SocketEvent> + Send + Unpin,
    impl Sink<Frame, Error = axum::Error> + Send + Unpin,
) {
    let (sink, stream) = socket.split();
    let events = stream.filter_map(|message| future::ready(from_client(message)));
    let frames = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(ws::Message::from(frame))));
    (events, frames)
}

/// Split the backend socket into an event stream and a frame sink.
pub fn backend_halves(
    socket: BackendSocket,
) -> (
    impl Stream<Item = SocketEvent> + Send + Unpin,
    impl Sink<Frame, Error = tungstenite::Error> + Send + Unpin,
) {
    let (sink, stream) = socket.split();
    let events = stream.filter_map(|message| future::ready(from_backend(message)));
    let frames = sink.with(|frame: Frame| {
        future::ready(Ok::<_, tungstenite::Error>(tungstenite::Message::from(frame)))
    });
    (events, frames)
}
