//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config (or defaults) → Validate → hand to the server
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → listener stops accepting → background tasks exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: an unreadable or invalid config file at startup is fatal
//! - One broadcast channel fans shutdown out to every long-running task

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::load_initial_config;
