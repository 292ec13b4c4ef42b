//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request / upgrade / relayed message:
//!     → auth.rs (AuthGate decides)
//!     → rejected: 511 response or socket closed with 511
//!     → admitted: continue to the module handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any gate failure
//! - The gate is injected, not hard-wired to one strategy

pub mod auth;

pub use auth::{gate_for, require_auth, AuthGate, AuthRejection, SharedGate, StrategyGate};
