//! WebSocket upgrade multiplexing.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Resolve the owning module by exact path
//! - Run the module's pre-upgrade step before completing the handshake
//! - Hand the client socket to the module's handler
//!
//! # Data Flow
//! ```text
//! Received
//!     → upgrade owner bound?  yes: owner handles everything
//!     → AuthGate              rejected: 511
//!     → Resolved (exact path) unroutable: 404
//!     → Enabled?              disabled: 404
//!     → PreUpgrade            failed or timed out: 500
//!     → HandshakeComplete     101 Switching Protocols
//!     → Paired                module handler owns the socket
//! ```
//!
//! # Design Decisions
//! - Every terminal rejection is an HTTP response sent instead of the 101,
//!   with `Connection: close`
//! - The pre-upgrade step is bounded by the relay connect timeout
//! - With a pre-upgrade step, the client is told the subprotocol that step
//!   settled on (for a relay, the one the backend selected). Without one,
//!   the first subprotocol the client offered is accepted

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ws::WebSocketUpgrade, FromRequestParts, Request},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};

use crate::config::ConfigHandle;
use crate::error::GatewayError;
use crate::http::context::RequestContext;
use crate::http::request::{RequestId, RequestIdExt};
use crate::modules::{BoundUpgrade, UpgradeRole};
use crate::observability::metrics;
use crate::routing::MountTable;
use crate::security::SharedGate;

/// True if the request asks for a websocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
}

/// Subprotocols offered by the client, in order.
fn requested_protocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn reject(module: &str, err: GatewayError) -> Response {
    metrics::record_upgrade(module, err.label());
    err.into_response()
}

/// Single entry point for every upgrade the server receives.
#[derive(Clone)]
pub struct UpgradeMultiplexer {
    table: Arc<MountTable>,
    config: ConfigHandle,
    gate: SharedGate,
    owner: Option<(String, BoundUpgrade)>,
}

impl UpgradeMultiplexer {
    /// Bind the multiplexer. If a mounted module owns all upgrades it is
    /// bound here, once, and standard resolution is never used.
    pub fn new(table: Arc<MountTable>, config: ConfigHandle, gate: SharedGate) -> Self {
        let owner = table.upgrade_owner().map(|(name, owner)| {
            tracing::info!(module = name, "Module owns all websocket upgrades");
            (name.to_string(), owner.bind(gate.clone(), config.clone()))
        });
        Self {
            table,
            config,
            gate,
            owner,
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        if let Some((name, owner)) = &self.owner {
            tracing::debug!(module = %name, path = %request.uri().path(), "Delegating upgrade to owner");
            return owner(request).await;
        }

        let (mut parts, _body) = request.into_parts();
        let request_id = parts
            .request_id()
            .cloned()
            .unwrap_or_else(RequestId::generate);
        let core = RequestContext::new(&self.config, "core", request_id);
        let path = parts.uri.path().to_owned();

        tracing::debug!(parent: &core.span, path = %path, "Upgrade received");

        if let Err(rejection) = self.gate.authorize(&parts) {
            tracing::debug!(parent: &core.span, reason = %rejection.reason, "Upgrade rejected by gate");
            return reject("none", GatewayError::AuthRequired);
        }

        let Some(entry) = self.table.upgrade_target(&path) else {
            tracing::debug!(parent: &core.span, path = %path, "No module handles upgrades here");
            return reject("none", GatewayError::Unroutable(path));
        };
        let UpgradeRole::Standard {
            pre_upgrade,
            handler,
        } = &entry.upgrade
        else {
            return reject(&entry.module_name, GatewayError::Unroutable(path));
        };

        let ctx = core.for_module(&entry.module_name);
        if !ctx.is_enabled(&entry.module_name) {
            tracing::debug!(parent: &ctx.span, "Module is not enabled, refusing upgrade");
            return reject(&entry.module_name, GatewayError::ModuleDisabled(entry.module_name.clone()));
        }

        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                tracing::debug!(parent: &ctx.span, error = %rejection, "Invalid upgrade request");
                metrics::record_upgrade(&entry.module_name, "invalid");
                return rejection.into_response();
            }
        };

        let mut protocols = requested_protocols(&parts.headers);
        if let Some(hook) = pre_upgrade {
            let limit = Duration::from_millis(ctx.config.relay.connect_timeout_ms);
            tracing::debug!(parent: &ctx.span, "Running pre-upgrade step");
            match tokio::time::timeout(limit, hook.prepare(&ctx, &parts)).await {
                Ok(Ok(selected)) => protocols = selected.into_iter().collect(),
                Ok(Err(err)) => {
                    tracing::warn!(parent: &ctx.span, error = %err, "Pre-upgrade step failed");
                    return reject(&entry.module_name, err);
                }
                Err(_) => {
                    tracing::warn!(parent: &ctx.span, timeout_ms = limit.as_millis() as u64, "Pre-upgrade step timed out");
                    handler.abandon(&ctx);
                    return reject(
                        &entry.module_name,
                        GatewayError::BackendUnavailable("timed out waiting for backend".into()),
                    );
                }
            }
        }

        metrics::record_upgrade(&entry.module_name, "upgraded");
        tracing::debug!(parent: &ctx.span, "Completing handshake");

        let on_failure = (Arc::clone(handler), ctx.clone());
        let handler = Arc::clone(handler);
        let gate = self.gate.clone();

        upgrade
            .protocols(protocols)
            .on_failed_upgrade(move |err| {
                let (handler, ctx) = on_failure;
                tracing::warn!(parent: &ctx.span, error = %err, "Handshake failed");
                handler.abandon(&ctx);
            })
            .on_upgrade(move |socket| async move {
                handler.handle(ctx, socket, gate).await;
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn detects_upgrade_header_case_insensitively() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[test]
    fn requested_protocols_are_split_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static("graphql-ws, graphql-transport-ws"),
        );
        assert_eq!(
            requested_protocols(&headers),
            vec!["graphql-ws".to_string(), "graphql-transport-ws".to_string()]
        );
    }
}
