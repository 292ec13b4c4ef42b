//! HTTP dispatch across mounted modules.
//!
//! # Responsibilities
//! - Build a [`RequestContext`] from the live config for every request
//! - Walk the mount table, most specific mount point first
//! - Re-check module enablement at dispatch time
//! - Strip the mount point and hand the request to the module's router
//!
//! # Design Decisions
//! - A module that matches the path but is switched off does not consume
//!   the request; dispatch falls through to the next candidate
//! - A module mounted without an HTTP router also falls through
//! - Nothing left to try: 404

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{uri::PathAndQuery, Uri},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;

use crate::config::ConfigHandle;
use crate::error::GatewayError;
use crate::http::context::RequestContext;
use crate::http::request::{RequestId, RequestIdExt};
use crate::observability::metrics;
use crate::routing::{MountPoint, MountTable};

/// Routes plain HTTP requests to modules.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    table: Arc<MountTable>,
    config: ConfigHandle,
}

impl HttpDispatcher {
    pub fn new(table: Arc<MountTable>, config: ConfigHandle) -> Self {
        Self { table, config }
    }

    pub async fn dispatch(&self, mut request: Request) -> Response {
        let start = Instant::now();
        let request_id = request
            .request_id()
            .cloned()
            .unwrap_or_else(RequestId::generate);
        let core = RequestContext::new(&self.config, "core", request_id);
        let path = request.uri().path().to_owned();

        tracing::debug!(parent: &core.span, method = %request.method(), path = %path, "Request received");

        for entry in self.table.http_candidates(&path) {
            let enabled = core.is_enabled(&entry.module_name);
            tracing::debug!(
                parent: &core.span,
                module = %entry.module_name,
                enabled,
                "{} module is {}enabled",
                entry.module_name,
                if enabled { "" } else { "not " }
            );

            let Some(router) = entry.http.as_ref().filter(|_| enabled) else {
                continue;
            };

            let ctx = core.for_module(&entry.module_name);
            if let Err(err) = strip_mount_point(&mut request, &entry.mount_point) {
                tracing::error!(parent: &ctx.span, error = %err, "Failed to rewrite request path");
                return GatewayError::InvariantViolation(err.to_string()).into_response();
            }
            request.extensions_mut().insert(ctx);

            let response = match router.clone().oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            metrics::record_request(&entry.module_name, response.status().as_u16(), start);
            return response;
        }

        tracing::debug!(parent: &core.span, path = %path, "No enabled module handles request");
        metrics::record_request("none", 404, start);
        GatewayError::Unroutable(path).into_response()
    }
}

/// Rewrite the request URI to be relative to the mount point.
fn strip_mount_point(
    request: &mut Request,
    mount_point: &MountPoint,
) -> Result<(), axum::http::Error> {
    if mount_point.is_root() {
        return Ok(());
    }

    let uri = request.uri();
    let relative = mount_point.strip(uri.path());
    let path_and_query = match uri.query() {
        Some(query) => format!("{relative}?{query}"),
        None => relative.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
    *request.uri_mut() = Uri::from_parts(parts)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::StatusCode,
        routing::get,
        Extension, Router,
    };

    use crate::config::{ModulesConfig, ServerConfig};
    use crate::modules::ModuleDescriptor;

    fn echo_router(name: &'static str) -> Router {
        Router::new().fallback(move |Extension(ctx): Extension<RequestContext>, request: Request| async move {
            format!("{name}:{}:{}", request.uri(), ctx.request_id.as_str().len())
        })
    }

    fn dispatcher(modules: &[(&'static str, &'static str)]) -> (HttpDispatcher, ConfigHandle) {
        let descriptors = modules
            .iter()
            .map(|(name, mount)| ModuleDescriptor::new(*name, *mount).with_http(echo_router(name)))
            .collect();
        let table = Arc::new(MountTable::from_descriptors(descriptors).unwrap());
        let config = ConfigHandle::new(ServerConfig {
            modules: ModulesConfig::from_pairs(modules.iter().map(|(name, _)| (*name, true))),
            ..ServerConfig::default()
        });
        (HttpDispatcher::new(table, config.clone()), config)
    }

    async fn call(dispatcher: &HttpDispatcher, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = dispatcher.dispatch(request).await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_most_specific_module_wins() {
        let (dispatcher, _) = dispatcher(&[("client", "/"), ("log", "/log")]);
        assert_eq!(call(&dispatcher, "/log/x").await, (StatusCode::OK, "log:/x:16".into()));
        assert_eq!(call(&dispatcher, "/index.html").await, (StatusCode::OK, "client:/index.html:16".into()));
    }

    #[tokio::test]
    async fn test_mount_point_stripped_and_query_kept() {
        let (dispatcher, _) = dispatcher(&[("api", "/api")]);
        assert_eq!(call(&dispatcher, "/api?x=1").await.1, "api:/?x=1:16");
        assert_eq!(call(&dispatcher, "/api/test?x=1").await.1, "api:/test?x=1:16");
    }

    #[tokio::test]
    async fn test_disabled_module_falls_through() {
        let (dispatcher, config) = dispatcher(&[("client", "/"), ("log", "/log")]);
        config.update(|c| c.modules.set("log", false));
        assert_eq!(call(&dispatcher, "/log").await.1, "client:/log:16");

        config.update(|c| c.modules.set("client", false));
        assert_eq!(call(&dispatcher, "/log").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unmatched_path_is_404() {
        let (dispatcher, _) = dispatcher(&[("api", "/api")]);
        assert_eq!(call(&dispatcher, "/apix").await.0, StatusCode::NOT_FOUND);
        assert_eq!(call(&dispatcher, "/").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_module_without_router_falls_through() {
        let table = Arc::new(
            MountTable::from_descriptors(vec![
                ModuleDescriptor::new("log", "/log"),
                ModuleDescriptor::new("client", "/")
                    .with_http(Router::new().route("/log", get(|| async { "client" }))),
            ])
            .unwrap(),
        );
        let config = ConfigHandle::new(ServerConfig::default());
        let dispatcher = HttpDispatcher::new(table, config);
        assert_eq!(call(&dispatcher, "/log").await, (StatusCode::OK, "client".into()));
    }
}
