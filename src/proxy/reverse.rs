//! HTTP reverse proxy to the backend admin API.
//!
//! # Responsibilities
//! - Rewrite the module-relative path onto the backend's context root
//! - Forward method, headers and body
//! - Stream the backend's response back unchanged
//!
//! # Design Decisions
//! - Stateless per request
//! - Hop-by-hop headers are stripped in both directions
//! - The `Host` header is set from the target
//! - No retries: a proxy-level failure is logged once and answered with 500
//! - The backend timeout is shorter than the server's request timeout, so a
//!   silent backend is reported by the proxy as a 500

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::redirect::Policy;

use crate::error::GatewayError;
use crate::http::context::RequestContext;
use crate::proxy::target::ProxyTarget;

/// Largest request body forwarded to the backend.
const MAX_REQUEST_BODY: usize = 4 * 1024 * 1024;

/// Headroom left between the backend timeout and the request timeout.
const TIMEOUT_HEADROOM: Duration = Duration::from_millis(250);

/// Backend timeout for a given server request timeout.
pub fn backend_timeout(request_secs: u64) -> Duration {
    let request = Duration::from_secs(request_secs);
    request
        .checked_sub(TIMEOUT_HEADROOM)
        .filter(|t| !t.is_zero())
        .unwrap_or(request / 2)
}

/// Headers that apply to a single connection and are never forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are connection-scoped too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Forwards requests to the backend.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    target: ProxyTarget,
    client: reqwest::Client,
}

impl ReverseProxy {
    pub fn new(target: ProxyTarget, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout);
        if let Some(tls) = target.tls() {
            builder = builder.use_preconfigured_tls(rustls::ClientConfig::clone(tls));
        }
        Ok(Self {
            target,
            client: builder.build()?,
        })
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    /// Forward one request. The request path must already be relative to the
    /// mount point.
    pub async fn forward(&self, ctx: &RequestContext, request: Request) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let url = self.target.web_url_for(parts.uri.path(), parts.uri.query());

        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(parent: &ctx.span, error = %err, "Failed to read request body");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
        };

        let mut outbound = self
            .client
            .request(parts.method.clone(), url.clone())
            .headers(headers);
        if !body.is_empty() {
            outbound = outbound.body(body);
        }

        tracing::debug!(parent: &ctx.span, method = %parts.method, url = %url, "Proxying request");

        match outbound.send().await {
            Ok(upstream) => {
                let status = upstream.status();
                tracing::debug!(
                    parent: &ctx.span,
                    status = %status,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Backend responded"
                );

                let mut headers = upstream.headers().clone();
                strip_hop_by_hop(&mut headers);

                let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(err) => {
                tracing::error!(
                    parent: &ctx.span,
                    url = %url,
                    timed_out = err.is_timeout(),
                    error = %err,
                    "Proxy request failed"
                );
                GatewayError::BackendUnavailable(err.to_string()).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-custom"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-custom", HeaderValue::from_static("1"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::ACCEPT], "application/json");
    }

    #[test]
    fn backend_gives_up_before_the_request_timeout() {
        assert_eq!(backend_timeout(30), Duration::from_millis(29_750));
        assert_eq!(backend_timeout(1), Duration::from_millis(750));
        assert!(backend_timeout(1) < Duration::from_secs(1));
    }
}
