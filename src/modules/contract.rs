//! The contract every optional server module implements.
//!
//! A module is mounted once at process start. Mounting produces a
//! [`ModuleDescriptor`]: the module's mount point, an optional HTTP router
//! and its role in websocket upgrades.
//!
//! # Upgrade roles
//!
//! - [`UpgradeRole::Standard`]: the upgrade multiplexer resolves the module
//!   by exact path, runs the optional [`PreUpgrade`] hook to completion and
//!   only then finishes the handshake and calls the [`WsHandler`].
//! - [`UpgradeRole::OwnsAll`]: the module takes over every upgrade the
//!   server receives, for the life of the process. Standard resolution is
//!   skipped entirely. Almost no module should need this.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, Request},
    http::request::Parts,
    response::Response,
    Router,
};
use futures_util::future::BoxFuture;

use crate::config::{ConfigHandle, ServerConfig};
use crate::error::GatewayError;
use crate::http::context::RequestContext;
use crate::relay::{BackendSocket, SessionTable};
use crate::security::SharedGate;

/// Errors raised while mounting modules.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("module '{module}' has invalid mount point '{mount_point}'")]
    InvalidMountPoint { module: String, mount_point: String },

    #[error("mount point '{mount_point}' claimed by both '{first}' and '{second}'")]
    DuplicateMountPoint {
        mount_point: String,
        first: String,
        second: String,
    },

    #[error("module '{module}' failed to mount: {reason}")]
    MountFailed { module: String, reason: String },
}

/// Runs before a websocket handshake completes.
///
/// The returned future must resolve before the client-facing handshake is
/// finished, so anything the [`WsHandler`] depends on (such as an open
/// backend socket) exists before the first client message can arrive.
///
/// The future resolves to the subprotocol the handshake should accept, or
/// `None` to accept no subprotocol at all.
pub trait PreUpgrade: Send + Sync {
    fn prepare(
        &self,
        ctx: &RequestContext,
        request: &Parts,
    ) -> BoxFuture<'static, Result<Option<String>, GatewayError>>;
}

/// Receives the client socket once the handshake has completed.
pub trait WsHandler: Send + Sync {
    fn handle(
        &self,
        ctx: RequestContext,
        socket: WebSocket,
        gate: SharedGate,
    ) -> BoxFuture<'static, ()>;

    /// Called when the handshake fails after [`PreUpgrade::prepare`]
    /// succeeded, so the handler can release what it prepared.
    fn abandon(&self, _ctx: &RequestContext) {}
}

/// Handles every upgrade request once bound.
pub type BoundUpgrade = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// A module that owns the whole upgrade lifecycle.
pub trait UpgradeOwner: Send + Sync {
    /// Called once when the server is assembled.
    fn bind(&self, gate: SharedGate, config: ConfigHandle) -> BoundUpgrade;
}

/// How a module takes part in websocket upgrades.
#[derive(Clone, Default)]
pub enum UpgradeRole {
    /// HTTP only.
    #[default]
    None,
    Standard {
        pre_upgrade: Option<Arc<dyn PreUpgrade>>,
        handler: Arc<dyn WsHandler>,
    },
    OwnsAll(Arc<dyn UpgradeOwner>),
}

impl fmt::Debug for UpgradeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeRole::None => f.write_str("None"),
            UpgradeRole::Standard { pre_upgrade, .. } => f
                .debug_struct("Standard")
                .field("pre_upgrade", &pre_upgrade.is_some())
                .finish(),
            UpgradeRole::OwnsAll(_) => f.write_str("OwnsAll"),
        }
    }
}

/// What a module registers when mounted.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub name: String,
    pub mount_point: String,
    /// Handles requests under the mount point. Paths arrive with the mount
    /// point stripped.
    pub http: Option<Router>,
    pub upgrade: UpgradeRole,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, mount_point: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_point: mount_point.into(),
            http: None,
            upgrade: UpgradeRole::None,
        }
    }

    pub fn with_http(mut self, router: Router) -> Self {
        self.http = Some(router);
        self
    }

    pub fn with_upgrade(mut self, role: UpgradeRole) -> Self {
        self.upgrade = role;
        self
    }
}

/// Everything a module may use while mounting.
pub struct MountContext<'a> {
    /// Configuration at server start. Handlers must read the live config
    /// from their [`RequestContext`] instead.
    pub config: &'a ServerConfig,
    pub gate: SharedGate,
    pub sessions: Arc<SessionTable<BackendSocket>>,
}

/// A mountable server module.
pub trait ServerModule: Send + Sync {
    /// Compared against the `modules` config keys.
    fn name(&self) -> &str;

    fn mount(&self, cx: &MountContext<'_>) -> Result<ModuleDescriptor, ModuleError>;
}
