//! Admin UI server library.
//!
//! A backend-for-frontend for the admin console: it serves the browser
//! bundle, proxies HTTP calls to the backend admin API and relays websocket
//! sessions between the browser and the backend.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod modules;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod relay;
pub mod routing;
pub mod security;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
