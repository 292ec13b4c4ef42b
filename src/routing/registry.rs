//! Module registry and mount table.
//!
//! # Responsibilities
//! - Turn the module enablement map into the effective module set
//! - Mount each effective module exactly once
//! - Freeze the result as an ordered, immutable [`MountTable`]
//!
//! # Design Decisions
//! - The live backend module wins over the mock backend module when both are
//!   switched on; the mock is dropped, this is not an error
//! - Entries are ordered by mount point length, longest first, ties broken
//!   by declaration order
//! - Duplicate mount points are rejected at startup
//! - The table only records what was mounted; enablement is re-checked
//!   against the live config on every request

use std::sync::Arc;

use axum::Router;

use crate::config::ModulesConfig;
use crate::modules::{
    MountContext, ModuleDescriptor, ModuleError, ServerModule, UpgradeOwner, UpgradeRole,
};
use crate::routing::matcher::MountPoint;

/// Name of the module proxying to the real backend.
pub const LIVE_BACKEND: &str = "api";

/// Name of the module mocking the backend.
pub const MOCK_BACKEND: &str = "mockapi";

/// One mounted module.
#[derive(Debug, Clone)]
pub struct MountEntry {
    pub mount_point: MountPoint,
    pub module_name: String,
    pub http: Option<Router>,
    pub upgrade: UpgradeRole,
}

/// Mounted modules in resolution order.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    /// Build the table from mounted descriptors, given in declaration order.
    pub fn from_descriptors(descriptors: Vec<ModuleDescriptor>) -> Result<Self, ModuleError> {
        let mut entries: Vec<MountEntry> = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let mount_point = MountPoint::parse(&descriptor.mount_point).ok_or_else(|| {
                ModuleError::InvalidMountPoint {
                    module: descriptor.name.clone(),
                    mount_point: descriptor.mount_point.clone(),
                }
            })?;

            if let Some(existing) = entries.iter().find(|e| e.mount_point == mount_point) {
                return Err(ModuleError::DuplicateMountPoint {
                    mount_point: mount_point.to_string(),
                    first: existing.module_name.clone(),
                    second: descriptor.name,
                });
            }

            entries.push(MountEntry {
                mount_point,
                module_name: descriptor.name,
                http: descriptor.http,
                upgrade: descriptor.upgrade,
            });
        }

        // Stable sort keeps declaration order for equal lengths.
        entries.sort_by(|a, b| b.mount_point.len().cmp(&a.mount_point.len()));

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose mount point prefixes `path`, most specific first.
    pub fn http_candidates<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a MountEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.mount_point.matches_prefix(path))
    }

    /// The entry owning websocket upgrades at exactly `path`.
    pub fn upgrade_target(&self, path: &str) -> Option<&MountEntry> {
        self.entries.iter().find(|entry| {
            entry.mount_point.matches_exact(path)
                && matches!(entry.upgrade, UpgradeRole::Standard { .. })
        })
    }

    /// The first module that claims every upgrade, if any.
    pub fn upgrade_owner(&self) -> Option<(&str, &Arc<dyn UpgradeOwner>)> {
        self.entries.iter().find_map(|entry| match &entry.upgrade {
            UpgradeRole::OwnsAll(owner) => Some((entry.module_name.as_str(), owner)),
            _ => None,
        })
    }
}

/// The set of modules the server knows about.
#[derive(Clone)]
pub struct ModuleRegistry {
    available: Vec<Arc<dyn ServerModule>>,
}

impl ModuleRegistry {
    /// Create a registry over modules in declaration order.
    pub fn new(available: Vec<Arc<dyn ServerModule>>) -> Self {
        Self { available }
    }

    /// Registry of the built-in modules.
    pub fn builtin() -> Self {
        Self::new(crate::modules::builtin())
    }

    /// Modules switched on in `modules`, after conflict resolution.
    pub fn effective(&self, modules: &ModulesConfig) -> Vec<Arc<dyn ServerModule>> {
        let drop_mock = modules.is_enabled(LIVE_BACKEND) && modules.is_enabled(MOCK_BACKEND);
        if drop_mock {
            tracing::debug!(
                "Both '{}' and '{}' modules were enabled; enabling '{}' only",
                LIVE_BACKEND,
                MOCK_BACKEND,
                LIVE_BACKEND
            );
        }

        self.available
            .iter()
            .filter(|module| modules.is_enabled(module.name()))
            .filter(|module| !(drop_mock && module.name() == MOCK_BACKEND))
            .cloned()
            .collect()
    }

    /// Mount the effective modules and build the mount table.
    pub fn resolve(&self, cx: &MountContext<'_>) -> Result<MountTable, ModuleError> {
        let mut descriptors = Vec::new();
        for module in self.effective(&cx.config.modules) {
            tracing::info!(module = module.name(), "Mounting module");
            let descriptor = module.mount(cx)?;
            tracing::info!(
                module = module.name(),
                mount_point = %descriptor.mount_point,
                "Mounted module"
            );
            descriptors.push(descriptor);
        }
        MountTable::from_descriptors(descriptors)
    }
}
