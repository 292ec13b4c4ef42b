//! The live configuration reference.
//!
//! Every request and every websocket upgrade reads the configuration through
//! [`ConfigHandle::snapshot`] at the moment it needs it. Long-lived
//! connections must not hold on to a snapshot to make routing decisions.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::ServerConfig;

/// Shared, atomically swappable configuration.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<ServerConfig>>,
}

impl ConfigHandle {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// The configuration as of right now.
    pub fn snapshot(&self) -> Arc<ServerConfig> {
        self.inner.load_full()
    }

    /// Replace the configuration for all future readers.
    pub fn store(&self, config: ServerConfig) {
        self.inner.store(Arc::new(config));
    }

    /// Apply an in-place edit to a copy of the current configuration and
    /// publish the result.
    pub fn update(&self, edit: impl FnOnce(&mut ServerConfig)) {
        let mut next = ServerConfig::clone(&self.snapshot());
        edit(&mut next);
        self.store(next);
    }
}
