//! Authorization gate.
//!
//! The gate decides whether a request, an upgrade or an individual relayed
//! message may proceed. Rejection on HTTP is answered with
//! `511 Network Authentication Required`.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{schema::AuthenticationConfig, AuthStrategy};
use crate::error::GatewayError;

/// The gate declined the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("authentication required: {reason}")]
pub struct AuthRejection {
    pub reason: String,
}

impl AuthRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Decides whether a request may proceed.
///
/// For relayed websocket messages the gate is re-run against the head of the
/// original upgrade request.
pub trait AuthGate: Send + Sync + fmt::Debug {
    fn authorize(&self, request: &Parts) -> Result<(), AuthRejection>;
}

pub type SharedGate = Arc<dyn AuthGate>;

/// Gate derived from the configured authentication strategy.
///
/// Only `none` admits traffic. `scram` and `oauth` reject everything until a
/// real strategy gate is supplied with `HttpServer::with_gate`.
#[derive(Debug, Clone, Copy)]
pub struct StrategyGate {
    strategy: AuthStrategy,
}

impl StrategyGate {
    pub fn new(strategy: AuthStrategy) -> Self {
        Self { strategy }
    }
}

impl AuthGate for StrategyGate {
    fn authorize(&self, _request: &Parts) -> Result<(), AuthRejection> {
        match self.strategy {
            AuthStrategy::None => Ok(()),
            AuthStrategy::Scram | AuthStrategy::Oauth => Err(AuthRejection::new(format!(
                "no authenticated session for strategy {:?}",
                self.strategy
            ))),
        }
    }
}

/// Build the gate for a configuration.
pub fn gate_for(config: &AuthenticationConfig) -> SharedGate {
    Arc::new(StrategyGate::new(config.strategy))
}

/// Middleware applying the gate to a module's HTTP routes.
pub async fn require_auth(State(gate): State<SharedGate>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    if let Err(rejection) = gate.authorize(&parts) {
        tracing::debug!(path = %parts.uri.path(), reason = %rejection.reason, "Request rejected by gate");
        return GatewayError::AuthRequired.into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}
