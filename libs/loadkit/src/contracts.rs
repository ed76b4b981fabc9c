use std::collections::BTreeMap;

use crate::record::{DesiredStatus, ModuleMetadata, TypeRef};

/// Discovery collaborator: collects raw module declarations from wherever
/// the host keeps them (a static list, a manifest directory, a plugin
/// scan). The loader only sees the resulting metadata.
pub trait DiscoveryStrategy: Send + 'static {
    fn discover(&self, scan_root: &str) -> anyhow::Result<Vec<ModuleMetadata>>;
}

/// Constructor collaborator: turns an opaque `TypeRef` into a live module
/// instance.
pub trait ModuleConstructor: Send + 'static {
    fn construct(&self, type_ref: &TypeRef) -> anyhow::Result<Box<dyn ModuleInstance>>;
}

/// Capability contract exposed by every constructed module.
pub trait ModuleInstance: Send + 'static {
    /// Verify external runtime prerequisites (binaries, services, files).
    /// A failure removes the module from the load but never aborts it.
    fn check_external_dependencies(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Configuration section this module wants registered, if any.
    fn config_section(&self) -> Option<serde_json::Value> {
        None
    }

    fn as_any(&self) -> &dyn std::any::Any;
}

/// Configuration collaborator. Failures are collaborator-local: the
/// engine logs and continues except where fail-fast escalates a section
/// attachment failure.
pub trait ConfigStore: Send + 'static {
    /// Record a module in the defaults layer if it is not configured yet.
    fn register_defaults(
        &mut self,
        id: &str,
        description: &str,
        default_status: DesiredStatus,
    ) -> anyhow::Result<()>;

    /// Effective per-module statuses, keyed by module id.
    fn load_statuses(&mut self) -> anyhow::Result<BTreeMap<String, DesiredStatus>>;

    fn attach_section(&mut self, id: &str, section: &serde_json::Value) -> anyhow::Result<()>;

    fn remove_section(&mut self, id: &str) -> anyhow::Result<()>;

    fn persist(&mut self) -> anyhow::Result<()>;
}
