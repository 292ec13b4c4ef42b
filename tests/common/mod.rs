//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use admin_ui_server::config::{ConfigHandle, ModulesConfig};
use admin_ui_server::{HttpServer, ServerConfig, Shutdown};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message;

/// A running server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub config: ConfigHandle,
    pub shutdown: Arc<Shutdown>,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Configuration with exactly the given modules switched on.
pub fn config_with(modules: &[&str]) -> ServerConfig {
    ServerConfig {
        hostname: "127.0.0.1".into(),
        port: 0,
        modules: ModulesConfig::from_pairs(modules.iter().map(|name| (*name, true))),
        ..ServerConfig::default()
    }
}

/// Point the proxy at a backend listening on `backend`.
pub fn with_backend(mut config: ServerConfig, backend: SocketAddr) -> ServerConfig {
    config.proxy.hostname = backend.ip().to_string();
    config.proxy.port = backend.port();
    config
}

/// Start the server and wait until it accepts connections.
pub async fn start_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config).unwrap();
    let handle = server.config().clone();
    let shutdown = Arc::new(Shutdown::new());

    let (_tx, updates) = mpsc::unbounded_channel();
    let stop = Arc::clone(&shutdown);
    tokio::spawn(async move {
        server.run(listener, updates, &stop).await.unwrap();
    });

    TestServer {
        addr,
        config: handle,
        shutdown,
    }
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start an HTTP backend that answers every request with
/// `"<method> <path-and-query>"` and echoes `x-ui-request` back.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&head).into_owned();
                let mut lines = head.lines();
                let request_line = lines.next().unwrap_or_default();
                let mut parts = request_line.split_whitespace();
                let body = format!(
                    "{} {}",
                    parts.next().unwrap_or_default(),
                    parts.next().unwrap_or_default()
                );
                let request_id = lines
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("x-ui-request"))
                    .map(|(_, value)| value.trim().to_string())
                    .unwrap_or_default();

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nx-seen-request: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    request_id,
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Start a websocket backend that echoes every data message.
///
/// A text message `close:<code>` makes it close with that code instead.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) => {
                            if let Some(code) = text.as_str().strip_prefix("close:") {
                                let code: u16 = code.parse().unwrap_or(1000);
                                let _ = ws
                                    .close(Some(CloseFrame {
                                        code: CloseCode::from(code),
                                        reason: "bye".into(),
                                    }))
                                    .await;
                                break;
                            }
                            if ws.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Message::Binary(data) => {
                            if ws.send(Message::Binary(data)).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    addr
}

/// Start a websocket backend that reports the subprotocols each upgrade
/// offered and selects `preferred` when it is among them.
///
/// Every accepted socket is held open until the peer leaves.
pub async fn start_ws_protocol_backend(
    preferred: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<Option<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen = seen_tx.clone();
            tokio::spawn(async move {
                let negotiate = move |request: &Request, mut response: Response| {
                    let offered = request
                        .headers()
                        .get(SEC_WEBSOCKET_PROTOCOL)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    let accepts = offered
                        .as_deref()
                        .is_some_and(|o| o.split(',').any(|p| p.trim() == preferred));
                    if accepts {
                        response
                            .headers_mut()
                            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(preferred));
                    }
                    let _ = seen.send(offered);
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, negotiate).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_close() {
                        break;
                    }
                }
            });
        }
    });

    (addr, seen_rx)
}
