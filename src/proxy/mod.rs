//! Backend proxy subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyConfig (hostname, port, context root, CA, min TLS)
//!     → target.rs ProxyTarget (http(s) and ws(s) URLs, shared TLS config)
//!     → reverse.rs forwards HTTP requests
//!     → relay::backend opens websocket connections
//! ```

pub mod reverse;
pub mod target;

pub use reverse::{backend_timeout, ReverseProxy};
pub use target::{ProxyTarget, TargetError};
