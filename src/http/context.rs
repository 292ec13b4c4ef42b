//! Per-request context handed to module handlers.

use std::sync::Arc;

use tracing::Span;

use crate::config::{ConfigHandle, ServerConfig};
use crate::http::request::RequestId;

/// Context for one request or websocket connection.
///
/// The configuration is read from the live handle when the context is built,
/// so a reconfiguration is visible to the very next request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub config: Arc<ServerConfig>,
    /// Span scoped to the module resolving this request.
    pub span: Span,
}

impl RequestContext {
    pub fn new(config: &ConfigHandle, module: &str, request_id: RequestId) -> Self {
        let span = tracing::info_span!("module", module = %module, request_id = %request_id);
        Self {
            request_id,
            config: config.snapshot(),
            span,
        }
    }

    /// Re-scope the context to another module, keeping the config snapshot.
    pub fn for_module(&self, module: &str) -> Self {
        Self {
            request_id: self.request_id.clone(),
            config: Arc::clone(&self.config),
            span: tracing::info_span!("module", module = %module, request_id = %self.request_id),
        }
    }

    pub fn is_enabled(&self, module: &str) -> bool {
        self.config.modules.is_enabled(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_reads_config_at_creation() {
        let handle = ConfigHandle::new(ServerConfig::default());
        let first = RequestContext::new(&handle, "core", RequestId::generate());

        handle.update(|c| c.modules.set("log", false));
        let second = RequestContext::new(&handle, "core", RequestId::generate());

        assert!(first.is_enabled("log"));
        assert!(!second.is_enabled("log"));
    }

    #[test]
    fn rescoping_keeps_id_and_snapshot() {
        let handle = ConfigHandle::new(ServerConfig::default());
        let core = RequestContext::new(&handle, "core", RequestId::generate());
        let module = core.for_module("api");

        assert_eq!(core.request_id, module.request_id);
        assert!(Arc::ptr_eq(&core.config, &module.config));
    }
}
