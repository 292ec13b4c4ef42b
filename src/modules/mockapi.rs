//! `mockapi` module: a stand-in for the backend during development.
//!
//! Serves a marker endpoint proving which module answered `/api`, and owns
//! every websocket upgrade so it can run a minimal subscription socket.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequestParts, Request,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::json;
use tracing::Instrument;

use crate::config::ConfigHandle;
use crate::error::GatewayError;
use crate::http::request::{RequestId, RequestIdExt};
use crate::modules::{
    BoundUpgrade, ModuleDescriptor, ModuleError, MountContext, ServerModule, UpgradeOwner,
    UpgradeRole,
};
use crate::observability::metrics;
use crate::security::SharedGate;

pub const NAME: &str = "mockapi";

const MOUNT_POINT: &str = "/api";

/// Header naming the module that answered.
pub const MODULE_HEADER: &str = "x-ui-module";

const SUBSCRIPTION_PROTOCOL: &str = "graphql-ws";
const KEEP_ALIVE: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct MockApiModule;

impl ServerModule for MockApiModule {
    fn name(&self) -> &str {
        NAME
    }

    fn mount(&self, _cx: &MountContext<'_>) -> Result<ModuleDescriptor, ModuleError> {
        let router = Router::new().route("/test", get(test_marker));
        Ok(ModuleDescriptor::new(NAME, MOUNT_POINT)
            .with_http(router)
            .with_upgrade(UpgradeRole::OwnsAll(Arc::new(MockSubscriptions {
                keep_alive: KEEP_ALIVE,
            }))))
    }
}

async fn test_marker() -> impl IntoResponse {
    (StatusCode::IM_A_TEAPOT, [(MODULE_HEADER, NAME)])
}

/// Owns every upgrade while the mock is mounted.
struct MockSubscriptions {
    keep_alive: Duration,
}

impl UpgradeOwner for MockSubscriptions {
    fn bind(&self, gate: SharedGate, config: ConfigHandle) -> BoundUpgrade {
        let keep_alive = self.keep_alive;
        Arc::new(move |request: Request| {
            let gate = gate.clone();
            let config = config.clone();
            async move { accept(request, gate, config, keep_alive).await }.boxed()
        })
    }
}

async fn accept(
    request: Request,
    gate: SharedGate,
    config: ConfigHandle,
    keep_alive: Duration,
) -> Response {
    let (mut parts, _body) = request.into_parts();
    let request_id = parts
        .request_id()
        .cloned()
        .unwrap_or_else(RequestId::generate);
    let span = tracing::debug_span!("module", module = NAME, request_id = %request_id);

    if parts.uri.path() != MOUNT_POINT {
        metrics::record_upgrade(NAME, "unroutable");
        return GatewayError::Unroutable(parts.uri.path().to_owned()).into_response();
    }
    if !config.snapshot().modules.is_enabled(NAME) {
        metrics::record_upgrade(NAME, "disabled");
        return GatewayError::ModuleDisabled(NAME.to_owned()).into_response();
    }
    if let Err(rejection) = gate.authorize(&parts) {
        tracing::debug!(parent: &span, reason = %rejection.reason, "Subscription upgrade rejected");
        metrics::record_upgrade(NAME, "rejected");
        return GatewayError::AuthRequired.into_response();
    }

    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    metrics::record_upgrade(NAME, "upgraded");
    upgrade
        .protocols([SUBSCRIPTION_PROTOCOL])
        .on_upgrade(move |socket| serve_subscriptions(socket, keep_alive).instrument(span))
}

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
}

/// Reply to one client message. `None` means close the socket.
fn reply(message: &ClientMessage) -> Option<Vec<serde_json::Value>> {
    match message.kind.as_str() {
        "connection_init" => Some(vec![json!({ "type": "connection_ack" }), json!({ "type": "ka" })]),
        "connection_terminate" => None,
        // No schema is mocked, so every operation completes immediately.
        "start" => Some(vec![json!({ "type": "complete", "id": message.id })]),
        _ => Some(Vec::new()),
    }
}

async fn serve_subscriptions(mut socket: WebSocket, keep_alive: Duration) {
    let mut ticker = tokio::time::interval(keep_alive);
    ticker.tick().await;
    let mut acknowledged = false;

    loop {
        tokio::select! {
            _ = ticker.tick(), if acknowledged => {
                if socket.send(Message::Text(json!({ "type": "ka" }).to_string().into())).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "Subscription socket error");
                        break;
                    }
                };
                let Ok(parsed) = serde_json::from_str::<ClientMessage>(text.as_str()) else {
                    tracing::trace!("Ignoring unparseable subscription message");
                    continue;
                };
                match reply(&parsed) {
                    Some(replies) => {
                        acknowledged |= parsed.kind == "connection_init";
                        for value in replies {
                            if socket.send(Message::Text(value.to_string().into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    None => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}
