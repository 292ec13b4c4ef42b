//! Bidirectional pairing of a client socket with a backend socket.
//!
//! # Policy
//! - Every message, in either direction, is re-checked by the gate against
//!   the head of the original upgrade request
//! - Client close: the backend is closed without a code
//! - Backend close: the client is closed with the backend's code, no reason
//! - Client error: logged, never forwarded to the backend
//! - Backend error: the client is closed with 500 and the error text
//!
//! Close forwarding is asymmetric on purpose. The backend never observes
//! client-side failures.

use std::fmt::Display;

use axum::http::request::Parts;
use futures_util::{Sink, SinkExt, Stream, StreamExt};

use crate::relay::frame::{CloseInfo, Frame, SocketEvent};
use crate::security::AuthGate;

/// Close code sent to the client when the gate rejects a relayed message.
pub const CLOSE_AUTH_REQUIRED: u16 = 511;

/// Close code sent to the client when the backend socket fails.
pub const CLOSE_BACKEND_ERROR: u16 = 500;

/// How a pairing ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The client closed or went away.
    ClientClosed,
    /// The backend closed, with its close code if it sent one.
    BackendClosed(Option<u16>),
    /// The backend socket failed.
    BackendFailed(String),
    /// The gate rejected a relayed message.
    Rejected,
}

impl PairingOutcome {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PairingOutcome::ClientClosed => "client_closed",
            PairingOutcome::BackendClosed(_) => "backend_closed",
            PairingOutcome::BackendFailed(_) => "backend_error",
            PairingOutcome::Rejected => "rejected",
        }
    }
}

async fn send_or_log<K>(sink: &mut K, frame: Frame, side: &'static str)
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    if let Err(err) = sink.send(frame).await {
        tracing::debug!(side, error = %err, "Failed to write to socket");
    }
}

async fn close<K>(sink: &mut K, info: Option<CloseInfo>, side: &'static str)
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    send_or_log(sink, Frame::Close(info), side).await;
    let _ = sink.close().await;
}

/// Relay frames between the two sockets until either side terminates.
///
/// Returns at the first terminating event. The caller removes the session
/// entry once this returns.
pub async fn relay<CS, CK, BS, BK>(
    gate: &dyn AuthGate,
    upgrade_request: &Parts,
    (mut client_rx, mut client_tx): (CS, CK),
    (mut backend_rx, mut backend_tx): (BS, BK),
) -> PairingOutcome
where
    CS: Stream<Item = SocketEvent> + Unpin,
    CK: Sink<Frame> + Unpin,
    CK::Error: Display,
    BS: Stream<Item = SocketEvent> + Unpin,
    BK: Sink<Frame> + Unpin,
    BK::Error: Display,
{
    loop {
        tokio::select! {
            event = client_rx.next() => match event {
                Some(SocketEvent::Message(frame)) => {
                    if let Err(rejection) = gate.authorize(upgrade_request) {
                        tracing::debug!(reason = %rejection.reason, "Client message rejected by gate");
                        close(&mut client_tx, Some(CloseInfo::new(CLOSE_AUTH_REQUIRED, "Network Authentication Required")), "client").await;
                        close(&mut backend_tx, None, "backend").await;
                        return PairingOutcome::Rejected;
                    }
                    tracing::trace!("Client -> backend");
                    send_or_log(&mut backend_tx, frame, "backend").await;
                }
                Some(SocketEvent::Closed(info)) => {
                    tracing::debug!(code = ?info.as_ref().map(|i| i.code), "Client socket closed, closing backend socket");
                    close(&mut backend_tx, None, "backend").await;
                    return PairingOutcome::ClientClosed;
                }
                None => {
                    tracing::debug!("Client socket ended, closing backend socket");
                    close(&mut backend_tx, None, "backend").await;
                    return PairingOutcome::ClientClosed;
                }
                Some(SocketEvent::Error(err)) => {
                    tracing::error!(error = %err, "Client socket error");
                }
            },
            event = backend_rx.next() => match event {
                Some(SocketEvent::Message(frame)) => {
                    if let Err(rejection) = gate.authorize(upgrade_request) {
                        tracing::debug!(reason = %rejection.reason, "Backend message rejected by gate");
                        close(&mut client_tx, Some(CloseInfo::new(CLOSE_AUTH_REQUIRED, "Network Authentication Required")), "client").await;
                        close(&mut backend_tx, None, "backend").await;
                        return PairingOutcome::Rejected;
                    }
                    tracing::trace!("Backend -> client");
                    send_or_log(&mut client_tx, frame, "client").await;
                }
                Some(SocketEvent::Closed(info)) => {
                    let code = info.map(|i| i.code);
                    tracing::debug!(code = ?code, "Backend socket closed, closing client socket");
                    close(&mut client_tx, code.map(|c| CloseInfo::new(c, "")), "client").await;
                    return PairingOutcome::BackendClosed(code);
                }
                None => {
                    tracing::debug!("Backend socket ended, closing client socket");
                    close(&mut client_tx, None, "client").await;
                    return PairingOutcome::BackendClosed(None);
                }
                Some(SocketEvent::Error(err)) => {
                    tracing::error!(error = %err, "Backend socket error, closing client socket");
                    close(&mut client_tx, Some(CloseInfo::new(CLOSE_BACKEND_ERROR, err.clone())), "client").await;
                    return PairingOutcome::BackendFailed(err);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use futures_util::{sink, stream};
    use tokio::sync::mpsc;

    use crate::security::AuthRejection;

    #[derive(Debug, Default)]
    struct Toggle {
        deny: AtomicBool,
    }

    impl AuthGate for Toggle {
        fn authorize(&self, _request: &Parts) -> Result<(), AuthRejection> {
            if self.deny.load(Ordering::SeqCst) {
                Err(AuthRejection::new("denied"))
            } else {
                Ok(())
            }
        }
    }

    struct Side {
        events: mpsc::UnboundedSender<SocketEvent>,
        sent: mpsc::UnboundedReceiver<Frame>,
    }

    fn socket() -> (
        Side,
        (
            impl Stream<Item = SocketEvent> + Unpin,
            impl Sink<Frame, Error = Infallible> + Unpin,
        ),
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        let events = Box::pin(stream::unfold(events_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }));
        let frames = Box::pin(sink::unfold(sent_tx, |tx, frame: Frame| async move {
            let _ = tx.send(frame);
            Ok::<_, Infallible>(tx)
        }));

        (
            Side {
                events: events_tx,
                sent: sent_rx,
            },
            (events, frames),
        )
    }

    fn head() -> Parts {
        axum::http::Request::builder()
            .uri("/api")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn spawn_relay(
        gate: Arc<Toggle>,
    ) -> (Side, Side, tokio::task::JoinHandle<PairingOutcome>) {
        let (client, client_io) = socket();
        let (backend, backend_io) = socket();
        let task = tokio::spawn(async move {
            let head = head();
            relay(gate.as_ref(), &head, client_io, backend_io).await
        });
        (client, backend, task)
    }

    #[tokio::test]
    async fn messages_are_forwarded_exactly_once_in_both_directions() {
        let (mut client, mut backend, task) = spawn_relay(Arc::new(Toggle::default()));

        client.events.send(SocketEvent::Message(Frame::Text("hello".into()))).unwrap();
        assert_eq!(backend.sent.recv().await, Some(Frame::Text("hello".into())));

        backend.events.send(SocketEvent::Message(Frame::Binary(vec![1u8, 2].into()))).unwrap();
        assert_eq!(client.sent.recv().await, Some(Frame::Binary(vec![1u8, 2].into())));

        client.events.send(SocketEvent::Closed(None)).unwrap();
        assert_eq!(task.await.unwrap(), PairingOutcome::ClientClosed);

        assert_eq!(drain(&mut backend.sent), vec![Frame::Close(None)]);
        assert!(drain(&mut client.sent).is_empty());
    }

    #[tokio::test]
    async fn client_close_closes_backend_once_without_code() {
        let (client, mut backend, task) = spawn_relay(Arc::new(Toggle::default()));

        client.events.send(SocketEvent::Closed(Some(CloseInfo::new(1000, "done")))).unwrap();
        assert_eq!(task.await.unwrap(), PairingOutcome::ClientClosed);

        let closes: Vec<_> = drain(&mut backend.sent)
            .into_iter()
            .filter(|f| matches!(f, Frame::Close(_)))
            .collect();
        assert_eq!(closes, vec![Frame::Close(None)]);
    }

    #[tokio::test]
    async fn backend_close_code_is_forwarded_to_client() {
        let (mut client, backend, task) = spawn_relay(Arc::new(Toggle::default()));

        backend.events.send(SocketEvent::Closed(Some(CloseInfo::new(123, "ignored")))).unwrap();
        assert_eq!(task.await.unwrap(), PairingOutcome::BackendClosed(Some(123)));
        assert_eq!(drain(&mut client.sent), vec![Frame::Close(Some(CloseInfo::new(123, "")))]);
    }

    #[tokio::test]
    async fn client_errors_never_reach_the_backend() {
        let (client, mut backend, task) = spawn_relay(Arc::new(Toggle::default()));

        client.events.send(SocketEvent::Error("example".into())).unwrap();
        client.events.send(SocketEvent::Error("again".into())).unwrap();
        client.events.send(SocketEvent::Message(Frame::Text("still here".into()))).unwrap();
        client.events.send(SocketEvent::Closed(None)).unwrap();
        assert_eq!(task.await.unwrap(), PairingOutcome::ClientClosed);

        assert_eq!(
            drain(&mut backend.sent),
            vec![Frame::Text("still here".into()), Frame::Close(None)]
        );
    }

    #[tokio::test]
    async fn backend_error_closes_client_with_server_error() {
        let (mut client, backend, task) = spawn_relay(Arc::new(Toggle::default()));

        backend.events.send(SocketEvent::Error("example".into())).unwrap();
        assert_eq!(task.await.unwrap(), PairingOutcome::BackendFailed("example".into()));
        assert_eq!(
            drain(&mut client.sent),
            vec![Frame::Close(Some(CloseInfo::new(500, "example")))]
        );
    }

    #[tokio::test]
    async fn rejected_message_is_not_forwarded() {
        let gate = Arc::new(Toggle::default());
        let (mut client, mut backend, task) = spawn_relay(Arc::clone(&gate));

        gate.deny.store(true, Ordering::SeqCst);
        client.events.send(SocketEvent::Message(Frame::Text("secret".into()))).unwrap();
        assert_eq!(task.await.unwrap(), PairingOutcome::Rejected);

        assert_eq!(drain(&mut backend.sent), vec![Frame::Close(None)]);
        assert_eq!(
            drain(&mut client.sent),
            vec![Frame::Close(Some(CloseInfo::new(511, "Network Authentication Required")))]
        );
    }

    #[tokio::test]
    async fn client_stream_end_counts_as_close() {
        let (client, mut backend, task) = spawn_relay(Arc::new(Toggle::default()));
        drop(client.events);

        assert_eq!(task.await.unwrap(), PairingOutcome::ClientClosed);
        assert_eq!(drain(&mut backend.sent), vec![Frame::Close(None)]);
    }
}
