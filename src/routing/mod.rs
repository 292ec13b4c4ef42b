//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Mount Table Compilation (at startup):
//!     ModulesConfig + available modules
//!     → registry.rs (conflict resolution, mount each module)
//!     → Sort by mount point length, longest first
//!     → Freeze as immutable MountTable
//!
//! Incoming Request / Upgrade (path):
//!     → matcher.rs (prefix match for HTTP, exact match for upgrades)
//!     → Return: candidate entries in order, or none
//! ```
//!
//! # Design Decisions
//! - Mount table compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same entry
//! - First enabled match wins

pub mod matcher;
pub mod registry;

pub use matcher::MountPoint;
pub use registry::{ModuleRegistry, MountEntry, MountTable, LIVE_BACKEND, MOCK_BACKEND};
