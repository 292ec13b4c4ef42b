//! `api` module: proxies HTTP and websocket traffic to the backend.

use std::sync::Arc;

use axum::{
    extract::{ws::{self, WebSocket}, Request, State},
    http::{header::SEC_WEBSOCKET_PROTOCOL, request::Parts},
    middleware,
    response::Response,
    routing::any,
    Extension, Router,
};
use futures_util::{future::BoxFuture, FutureExt};
use tracing::Instrument;

use crate::error::GatewayError;
use crate::http::context::RequestContext;
use crate::modules::{
    ModuleDescriptor, ModuleError, MountContext, PreUpgrade, ServerModule, UpgradeRole, WsHandler,
};
use crate::observability::metrics;
use crate::proxy::{backend_timeout, ProxyTarget, ReverseProxy};
use crate::relay::{
    self, capture_head, connect_backend, frame, pair::CLOSE_BACKEND_ERROR, BackendSocket,
    PendingBackendConnection, Reservation, SessionTable,
};
use crate::security::{require_auth, SharedGate};

pub const NAME: &str = "api";

/// The live backend module.
#[derive(Debug, Default)]
pub struct ApiModule;

impl ServerModule for ApiModule {
    fn name(&self) -> &str {
        NAME
    }

    fn mount(&self, cx: &MountContext<'_>) -> Result<ModuleDescriptor, ModuleError> {
        let mount_failed = |reason: String| ModuleError::MountFailed {
            module: NAME.to_string(),
            reason,
        };

        let target = ProxyTarget::from_config(&cx.config.proxy).map_err(|e| mount_failed(e.to_string()))?;
        tracing::debug!(
            web = %target.web_url(),
            socket = %target.socket_url(),
            tls = target.tls().is_some(),
            "api proxy configuration"
        );

        let timeout = backend_timeout(cx.config.timeouts.request_secs);
        let proxy = Arc::new(
            ReverseProxy::new(target.clone(), timeout).map_err(|e| mount_failed(e.to_string()))?,
        );
        let router = Router::new()
            .route("/", any(forward))
            .route("/{*path}", any(forward))
            .layer(middleware::from_fn_with_state(cx.gate.clone(), require_auth))
            .with_state(proxy);

        let bridge = Arc::new(SocketBridge {
            target,
            sessions: Arc::clone(&cx.sessions),
        });

        Ok(ModuleDescriptor::new(NAME, "/api")
            .with_http(router)
            .with_upgrade(UpgradeRole::Standard {
                pre_upgrade: Some(bridge.clone()),
                handler: bridge,
            }))
    }
}

async fn forward(
    State(proxy): State<Arc<ReverseProxy>>,
    Extension(ctx): Extension<RequestContext>,
    request: Request,
) -> Response {
    proxy.forward(&ctx, request).await
}

/// Opens the backend socket before the handshake and pairs it afterwards.
struct SocketBridge {
    target: ProxyTarget,
    sessions: Arc<SessionTable<BackendSocket>>,
}

impl PreUpgrade for SocketBridge {
    fn prepare(
        &self,
        ctx: &RequestContext,
        request: &Parts,
    ) -> BoxFuture<'static, Result<Option<String>, GatewayError>> {
        let sessions = Arc::clone(&self.sessions);
        let target = self.target.clone();
        let id = ctx.request_id.clone();
        let protocol = request.headers.get(SEC_WEBSOCKET_PROTOCOL).cloned();
        let head = Arc::new(capture_head(request));

        async move {
            let reservation = Reservation::new(&sessions, &id)?;
            tracing::debug!(
                protocol = ?protocol,
                "Opening backend socket, waiting for it to become ready"
            );

            let (backend, selected) = connect_backend(&target, protocol.as_ref())
                .await
                .map_err(|err| {
                    tracing::warn!(error = %err, "Backend socket failed to open");
                    GatewayError::BackendUnavailable(err.to_string())
                })?;

            sessions.mark_open(&id, PendingBackendConnection::new(backend, head))?;
            reservation.disarm();
            tracing::debug!(protocol = ?selected, "Backend socket ready");
            Ok(selected)
        }
        .instrument(ctx.span.clone())
        .boxed()
    }
}

impl WsHandler for SocketBridge {
    fn handle(
        &self,
        ctx: RequestContext,
        socket: WebSocket,
        gate: SharedGate,
    ) -> BoxFuture<'static, ()> {
        let sessions = Arc::clone(&self.sessions);
        let span = ctx.span.clone();

        async move {
            let Some(pending) = sessions.take_for_pairing(&ctx.request_id) else {
                tracing::error!("No backend socket found for request, closing client socket");
                let mut socket = socket;
                let _ = socket
                    .send(ws::Message::Close(Some(ws::CloseFrame {
                        code: CLOSE_BACKEND_ERROR,
                        reason: String::new().into(),
                    })))
                    .await;
                sessions.release(&ctx.request_id);
                return;
            };

            tracing::debug!("Binding client and backend sockets");
            metrics::relay_session_opened();

            let outcome = relay::relay(
                gate.as_ref(),
                &pending.upgrade_request,
                frame::client_halves(socket),
                frame::backend_halves(pending.backend),
            )
            .await;

            sessions.release(&ctx.request_id);
            metrics::relay_session_closed(outcome.label());
            tracing::debug!(outcome = ?outcome, "Relay finished");
        }
        .instrument(span)
        .boxed()
    }

    fn abandon(&self, ctx: &RequestContext) {
        if self.sessions.release(&ctx.request_id) {
            tracing::debug!(parent: &ctx.span, "Released backend socket of abandoned upgrade");
        }
    }
}
