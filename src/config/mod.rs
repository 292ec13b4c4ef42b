//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → live.rs ConfigHandle (shared by every subsystem)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config (dropped if nothing changed)
//!     → validation.rs validates
//!     → atomic swap inside ConfigHandle
//!     → next request/upgrade observes new config
//! ```
//!
//! # Design Decisions
//! - A single config value is immutable; changes swap the whole value
//! - All fields have defaults to allow minimal configs
//! - Readers snapshot per request, never per connection lifetime

pub mod live;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use live::ConfigHandle;
pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthStrategy, BackendTlsConfig, ListenerTlsConfig, MinTlsVersion, ModulesConfig, ProxyConfig,
    RelayConfig, ServerConfig,
};
