//! Request-scoped failure taxonomy.
//!
//! Every variant is contained to a single request or connection. None of
//! them stop the server.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::relay::SessionError;

/// Failures surfaced to a client by the router, the upgrade pipeline or the
/// reverse proxy.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No enabled module claims the path.
    #[error("no module handles '{0}'")]
    Unroutable(String),

    /// The module that owns the path is switched off in the live config.
    #[error("module '{0}' is not enabled")]
    ModuleDisabled(String),

    /// The authorization gate declined the request.
    #[error("network authentication required")]
    AuthRequired,

    /// The backend could not be reached or failed mid-request.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Internal bookkeeping is inconsistent. Reported to the client like a
    /// backend failure.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unroutable(_) | GatewayError::ModuleDisabled(_) => StatusCode::NOT_FOUND,
            GatewayError::AuthRequired => StatusCode::NETWORK_AUTHENTICATION_REQUIRED,
            GatewayError::BackendUnavailable(_) | GatewayError::InvariantViolation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            GatewayError::Unroutable(_) => "unroutable",
            GatewayError::ModuleDisabled(_) => "disabled",
            GatewayError::AuthRequired => "rejected",
            GatewayError::BackendUnavailable(_) => "backend_unavailable",
            GatewayError::InvariantViolation(_) => "invariant_violation",
        }
    }
}

impl From<SessionError> for GatewayError {
    fn from(err: SessionError) -> Self {
        GatewayError::InvariantViolation(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match status {
            StatusCode::NETWORK_AUTHENTICATION_REQUIRED => "Network Authentication Required",
            StatusCode::NOT_FOUND => "Not Found",
            _ => "Internal Server Error",
        };
        // Upgrade attempts that end here never complete their handshake.
        (status, [(header::CONNECTION, "close")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_observed_status_codes() {
        assert_eq!(GatewayError::Unroutable("/x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(GatewayError::ModuleDisabled("log".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(GatewayError::AuthRequired.status().as_u16(), 511);
        assert_eq!(GatewayError::BackendUnavailable("refused".into()).status().as_u16(), 500);
        assert_eq!(GatewayError::InvariantViolation("no entry".into()).status().as_u16(), 500);
    }

    #[test]
    fn response_closes_the_connection() {
        let response = GatewayError::AuthRequired.into_response();
        assert_eq!(response.status(), StatusCode::NETWORK_AUTHENTICATION_REQUIRED);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }
}
