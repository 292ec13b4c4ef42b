//! Request correlation.
//!
//! # Responsibilities
//! - Keep a well-formed inbound correlation id, or generate one
//! - Make the id available to handlers via request extensions
//! - Echo the id on every response
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Generated ids have a fixed length of 16 alphanumeric characters
//! - The same id keys the websocket relay's pending-connection table

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::{distributions::Alphanumeric, Rng};

/// Header carrying the correlation id in both directions.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-ui-request");

/// Length of generated correlation ids.
pub const REQUEST_ID_LEN: usize = 16;

/// Longest inbound id that is accepted as-is.
const MAX_INBOUND_LEN: usize = 64;

/// Correlation id for one request or websocket connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// Generate a fresh fixed-length id.
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(REQUEST_ID_LEN)
            .map(char::from)
            .collect();
        Self(id.into())
    }

    /// Accept an inbound id if it is usable, otherwise `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let ok = !value.is_empty()
            && value.len() <= MAX_INBOUND_LEN
            && value.bytes().all(|b| b.is_ascii_graphic());
        ok.then(|| Self(value.into()))
    }

    /// Keep the header value if valid, otherwise generate.
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn header_value(&self) -> HeaderValue {
        // Only visible ASCII ever reaches this type.
        HeaderValue::from_str(&self.0).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convenience accessor for handlers holding a raw request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for axum::http::Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

impl RequestIdExt for axum::http::request::Parts {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions.get::<RequestId>()
    }
}

/// Middleware assigning the correlation id and echoing it on the response.
pub async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId::from_header(request.headers().get(&X_REQUEST_ID));
    let value = id.header_value();

    request.headers_mut().insert(X_REQUEST_ID.clone(), value.clone());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    response
}
