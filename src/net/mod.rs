//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Browser ──TLS (optional, listener certificate)──▶ server
//! server  ──TLS (optional, trusted CA)───────────▶ backend (HTTP and websocket)
//! ```
//!
//! # Design Decisions
//! - Both directions use rustls with the ring provider
//! - The backend client config is built once and shared by the reverse
//!   proxy and the socket relay

pub mod tls;
