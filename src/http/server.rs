//! HTTP server setup.
//!
//! # Responsibilities
//! - Mount the enabled modules once at start
//! - Create the Axum router with a single entry handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Apply configuration updates to the live config
//! - Run the pending-session reaper
//! - Serve plain HTTP or HTTPS with graceful shutdown
//!
//! # Data Flow
//! ```text
//! Request
//!     → TraceLayer → assign_request_id → TimeoutLayer
//!     → entry
//!         Upgrade: websocket → UpgradeMultiplexer
//!         otherwise          → HttpDispatcher
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware,
    response::Response,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{validation::validate_config, ConfigHandle, ServerConfig};
use crate::http::dispatch::HttpDispatcher;
use crate::http::request::assign_request_id;
use crate::http::websocket::{is_websocket_upgrade, UpgradeMultiplexer};
use crate::lifecycle::Shutdown;
use crate::modules::{ModuleError, MountContext};
use crate::relay::{run_reaper, BackendSocket, SessionTable};
use crate::routing::ModuleRegistry;
use crate::security::{gate_for, SharedGate};

/// How long in-flight HTTPS connections get to finish after shutdown.
const TLS_DRAIN: Duration = Duration::from_secs(10);

/// Errors raised while building or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("module setup failed: {0}")]
    Module(#[from] ModuleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into the entry handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: HttpDispatcher,
    pub multiplexer: UpgradeMultiplexer,
}

/// The UI server.
pub struct HttpServer {
    router: Router,
    config: ConfigHandle,
    sessions: Arc<SessionTable<BackendSocket>>,
}

impl HttpServer {
    /// Create a server with the built-in modules and the gate derived from
    /// the configured authentication strategy.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let gate = gate_for(&config.authentication);
        Self::with_gate(config, gate)
    }

    /// Create a server with the built-in modules and a caller-supplied gate.
    pub fn with_gate(config: ServerConfig, gate: SharedGate) -> Result<Self, ServerError> {
        Self::with_registry(config, gate, ModuleRegistry::builtin())
    }

    /// Create a server from an explicit module registry.
    pub fn with_registry(
        config: ServerConfig,
        gate: SharedGate,
        registry: ModuleRegistry,
    ) -> Result<Self, ServerError> {
        let handle = ConfigHandle::new(config);
        let snapshot = handle.snapshot();
        let sessions = Arc::new(SessionTable::new());

        let cx = MountContext {
            config: &snapshot,
            gate: gate.clone(),
            sessions: Arc::clone(&sessions),
        };
        let table = Arc::new(registry.resolve(&cx)?);
        if table.is_empty() {
            tracing::warn!("No modules mounted, every request will be answered with 404");
        }

        let state = AppState {
            dispatcher: HttpDispatcher::new(Arc::clone(&table), handle.clone()),
            multiplexer: UpgradeMultiplexer::new(table, handle.clone(), gate),
        };
        let router = Self::build_router(&snapshot, state);

        Ok(Self {
            router,
            config: handle,
            sessions,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// A request that outlives the timeout is a server-side failure, so the
    /// layer answers 500.
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .fallback(entry)
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::INTERNAL_SERVER_ERROR,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(middleware::from_fn(assign_request_id))
            .layer(TraceLayer::new_for_http())
    }

    /// The live configuration shared with every module.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Backend sockets waiting for, or taking part in, a relay.
    pub fn sessions(&self) -> &Arc<SessionTable<BackendSocket>> {
        &self.sessions
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        updates: mpsc::UnboundedReceiver<ServerConfig>,
        shutdown: &Shutdown,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.spawn_background(updates, shutdown);

        let mut stop = shutdown.subscribe();
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        updates: mpsc::UnboundedReceiver<ServerConfig>,
        shutdown: &Shutdown,
    ) -> Result<(), ServerError> {
        tracing::info!(address = %addr, "HTTPS server starting");

        self.spawn_background(updates, shutdown);

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = stop.recv().await;
            drain.graceful_shutdown(Some(TLS_DRAIN));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    fn spawn_background(&self, updates: mpsc::UnboundedReceiver<ServerConfig>, shutdown: &Shutdown) {
        tokio::spawn(apply_config_updates(
            self.config.clone(),
            updates,
            shutdown.subscribe(),
        ));
        tokio::spawn(run_reaper(
            Arc::clone(&self.sessions),
            self.config.clone(),
            shutdown.subscribe(),
        ));
    }
}

/// Every request enters here.
async fn entry(State(state): State<AppState>, request: Request) -> Response {
    if is_websocket_upgrade(request.headers()) {
        state.multiplexer.handle(request).await
    } else {
        state.dispatcher.dispatch(request).await
    }
}

/// Swap validated configuration updates into the live config.
///
/// Module enablement takes effect on the next request. Mount points are
/// fixed at start, so enabling a module that was not mounted needs a restart.
async fn apply_config_updates(
    config: ConfigHandle,
    mut updates: mpsc::UnboundedReceiver<ServerConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(next) = update else { break };
                if let Err(errors) = validate_config(&next) {
                    for error in errors {
                        tracing::error!(%error, "Ignoring invalid configuration update");
                    }
                    continue;
                }
                let previous = config.snapshot();
                if previous.modules != next.modules {
                    tracing::info!(
                        enabled = ?next.modules.enabled().collect::<Vec<_>>(),
                        "Module enablement changed"
                    );
                }
                config.store(next);
                tracing::info!("Configuration updated");
            }
            _ = shutdown.recv() => break,
        }
    }
}
