//! `log` module: collects browser log events over a websocket.
//!
//! Each text frame carries a JSON array of events. Every event is re-emitted
//! through `tracing` under the `client` target at the level the browser
//! asked for. Frames that are not text, or do not parse, are ignored.
//!
//! Individual messages are not re-checked by the gate. The gate runs once
//! at upgrade time and nothing sensitive is sent back to the browser.

use axum::{
    extract::ws::{Message, WebSocket},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::any,
    Router,
};
use futures_util::{future::BoxFuture, FutureExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::Instrument;

use crate::http::context::RequestContext;
use crate::modules::{
    ModuleDescriptor, ModuleError, MountContext, ServerModule, UpgradeRole, WsHandler,
};
use crate::security::{require_auth, SharedGate};

pub const NAME: &str = "log";

/// One event as sent by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientLogEvent {
    #[serde(default)]
    pub client_time: Option<u64>,
    #[serde(default, rename = "clientID")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_level: Option<String>,
    #[serde(default)]
    pub component_name: Option<String>,
    #[serde(default)]
    pub msg: String,
}

impl ClientLogEvent {
    fn emit(&self) {
        let client_id = self.client_id.as_deref().unwrap_or("");
        let component = self.component_name.as_deref().unwrap_or("");
        let client_time = self.client_time.unwrap_or_default();
        let msg = self.msg.as_str();

        macro_rules! emit_at {
            ($level:expr) => {
                tracing::event!(
                    target: "client",
                    $level,
                    client_id,
                    component,
                    client_time,
                    "{}",
                    msg
                )
            };
        }

        match self.client_level.as_deref() {
            Some("trace") => emit_at!(tracing::Level::TRACE),
            Some("info") => emit_at!(tracing::Level::INFO),
            Some("warn") => emit_at!(tracing::Level::WARN),
            Some("error") | Some("fatal") => emit_at!(tracing::Level::ERROR),
            _ => emit_at!(tracing::Level::DEBUG),
        }
    }
}

/// Parse a text frame into log events.
pub fn parse_batch(text: &str) -> Result<Vec<ClientLogEvent>, serde_json::Error> {
    serde_json::from_str(text)
}

#[derive(Debug, Default)]
pub struct LogModule;

impl ServerModule for LogModule {
    fn name(&self) -> &str {
        NAME
    }

    fn mount(&self, cx: &MountContext<'_>) -> Result<ModuleDescriptor, ModuleError> {
        let router = Router::new()
            .route("/", any(upgrade_required))
            .route("/{*path}", any(upgrade_required))
            .layer(middleware::from_fn_with_state(cx.gate.clone(), require_auth));

        Ok(ModuleDescriptor::new(NAME, "/log")
            .with_http(router)
            .with_upgrade(UpgradeRole::Standard {
                pre_upgrade: None,
                handler: Arc::new(LogListener),
            }))
    }
}

async fn upgrade_required() -> impl IntoResponse {
    (StatusCode::UPGRADE_REQUIRED, "Upgrade Required")
}

struct LogListener;

impl WsHandler for LogListener {
    fn handle(
        &self,
        ctx: RequestContext,
        socket: WebSocket,
        _gate: SharedGate,
    ) -> BoxFuture<'static, ()> {
        listen(socket).instrument(ctx.span).boxed()
    }
}

async fn listen(mut socket: WebSocket) {
    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => match parse_batch(text.as_str()) {
                Ok(events) => events.iter().for_each(ClientLogEvent::emit),
                Err(err) => tracing::trace!(error = %err, "Ignoring unparseable log message"),
            },
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (f.code, f.reason.as_str().to_owned()))
                    .unwrap_or_default();
                tracing::debug!(code, reason = %reason, "Log listener closed");
                break;
            }
            Ok(Message::Binary(data)) => {
                tracing::trace!(bytes = data.len(), "Ignoring non-text log message");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                tracing::debug!(error = %err, "Log listener socket error");
                break;
            }
        }
    }
}
