//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, entry handler)
//!     → request.rs (correlation id, echoed on the response)
//!     → websocket.rs (upgrade requests)  or  dispatch.rs (plain requests)
//!     → context.rs (per-module view of the live config and logger)
//!     → module router or websocket handler
//! ```

pub mod context;
pub mod dispatch;
pub mod request;
pub mod server;
pub mod websocket;

pub use context::RequestContext;
pub use dispatch::HttpDispatcher;
pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
pub use websocket::UpgradeMultiplexer;
