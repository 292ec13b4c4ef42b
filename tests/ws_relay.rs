//! Websocket upgrades and the backend relay, end to end.

use std::time::Duration;

use admin_ui_server::config::AuthStrategy;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, http::HeaderValue, Error, Message};

mod common;

/// Status of a refused upgrade.
async fn refused(url: String) -> u16 {
    match tokio_tungstenite::connect_async(url).await {
        Err(Error::Http(response)) => response.status().as_u16(),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade unexpectedly succeeded"),
    }
}

async fn next_message<S>(socket: &mut S) -> Message
where
    S: StreamExt<Item = Result<Message, Error>> + Unpin,
{
    tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("timed out waiting for a message")
        .expect("socket ended")
        .expect("socket error")
}

#[tokio::test]
async fn messages_are_relayed_both_ways() {
    let backend = common::start_ws_echo_backend().await;
    let config = common::with_backend(common::config_with(&["api"]), backend);
    let server = common::start_server(config).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws("/api")).await.unwrap();

    socket.send(Message::Text("hello".into())).await.unwrap();
    assert_eq!(next_message(&mut socket).await, Message::Text("hello".into()));

    socket.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
    assert_eq!(next_message(&mut socket).await, Message::Binary(vec![1, 2, 3].into()));
}

#[tokio::test]
async fn backend_close_code_reaches_the_client() {
    let backend = common::start_ws_echo_backend().await;
    let config = common::with_backend(common::config_with(&["api"]), backend);
    let server = common::start_server(config).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws("/api")).await.unwrap();
    socket.send(Message::Text("close:4000".into())).await.unwrap();

    match next_message(&mut socket).await {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 4000);
            assert!(frame.reason.is_empty());
        }
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn backend_selects_the_subprotocol() {
    let (backend, mut seen) = common::start_ws_protocol_backend("graphql-ws").await;
    let config = common::with_backend(common::config_with(&["api"]), backend);
    let server = common::start_server(config).await;

    let mut request = server.ws("/api").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", HeaderValue::from_static("chat, graphql-ws"));
    let (_socket, response) = tokio_tungstenite::connect_async(request).await.unwrap();

    let offered = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(offered.as_deref(), Some("chat, graphql-ws"));
    assert_eq!(response.headers()["sec-websocket-protocol"], "graphql-ws");
}

#[tokio::test]
async fn session_is_released_after_the_client_leaves() {
    let backend = common::start_ws_echo_backend().await;
    let config = common::with_backend(common::config_with(&["api"]), backend);
    let server = common::start_server(config).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws("/api")).await.unwrap();
    socket.send(Message::Text("ping".into())).await.unwrap();
    next_message(&mut socket).await;
    socket.close(None).await.unwrap();

    // A second session on a fresh id works after the first one ended.
    let (mut again, _) = tokio_tungstenite::connect_async(server.ws("/api")).await.unwrap();
    again.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(next_message(&mut again).await, Message::Text("still here".into()));
}

#[tokio::test]
async fn unreachable_backend_refuses_the_upgrade() {
    let backend = common::closed_port().await;
    let config = common::with_backend(common::config_with(&["api"]), backend);
    let server = common::start_server(config).await;

    assert_eq!(refused(server.ws("/api")).await, 500);
}

#[tokio::test]
async fn upgrades_need_an_exact_mount_point() {
    let backend = common::start_ws_echo_backend().await;
    let config = common::with_backend(common::config_with(&["api"]), backend);
    let server = common::start_server(config).await;

    assert_eq!(refused(server.ws("/api/nested")).await, 404);
    assert_eq!(refused(server.ws("/nowhere")).await, 404);
}

#[tokio::test]
async fn disabled_module_refuses_the_upgrade() {
    let server = common::start_server(common::config_with(&["log"])).await;

    let (socket, _) = tokio_tungstenite::connect_async(server.ws("/log")).await.unwrap();
    drop(socket);

    server.config.update(|c| c.modules.set("log", false));
    assert_eq!(refused(server.ws("/log")).await, 404);
}

#[tokio::test]
async fn rejecting_gate_refuses_the_upgrade() {
    let mut config = common::config_with(&["log"]);
    config.authentication.strategy = AuthStrategy::Oauth;
    let server = common::start_server(config).await;

    assert_eq!(refused(server.ws("/log")).await, 511);
}

#[tokio::test]
async fn log_events_are_accepted() {
    let server = common::start_server(common::config_with(&["log"])).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws("/log")).await.unwrap();
    socket
        .send(Message::Text(
            r#"[{"clientLevel":"info","componentName":"Topics","msg":"loaded"}]"#.into(),
        ))
        .await
        .unwrap();
    socket.send(Message::Text("not json".into())).await.unwrap();
    socket.send(Message::Binary(vec![0].into())).await.unwrap();
    socket.close(None).await.unwrap();

    // The listener survives bad input; a new socket is still accepted.
    let (again, _) = tokio_tungstenite::connect_async(server.ws("/log")).await.unwrap();
    drop(again);
}

#[tokio::test]
async fn mock_subscriptions_are_acknowledged() {
    let server = common::start_server(common::config_with(&["mockapi"])).await;

    let mut request = server.ws("/api").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", HeaderValue::from_static("graphql-ws"));
    let (mut socket, response) = tokio_tungstenite::connect_async(request).await.unwrap();
    assert_eq!(response.headers().get("sec-websocket-protocol").unwrap(), "graphql-ws");

    socket
        .send(Message::Text(r#"{"type":"connection_init"}"#.into()))
        .await
        .unwrap();
    let ack = next_message(&mut socket).await;
    let ack: serde_json::Value = serde_json::from_str(ack.to_text().unwrap()).unwrap();
    assert_eq!(ack["type"], "connection_ack");

    assert_eq!(refused(server.ws("/elsewhere")).await, 404);
}
