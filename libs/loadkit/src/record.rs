use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Desired enable state of a module, as declared by the host and merged
/// from configuration. `ForceLoad` is stronger than `Enabled`:
/// configuration can never downgrade it to `Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredStatus {
    Enabled,
    Disabled,
    ForceLoad,
}

/// Lifecycle phase of a single module. Monotonic within one load run;
/// only the runtime disable/enable path moves a module backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulePhase {
    Discovered,
    Constructed,
    Enabled,
    Disabled,
    Errored,
}

/// Opaque handle identifying a module implementation for the external
/// constructor. The loader never interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef(pub String);

impl TypeRef {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeRef {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for TypeRef {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Module ids are case-insensitive; every id and dependency reference is
/// folded to ASCII lowercase on intake.
pub(crate) fn norm_id(id: &str) -> String {
    id.to_ascii_lowercase()
}

/// Raw per-module declaration supplied by the host's discovery strategy.
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub id: String,
    pub display_name: String,
    pub type_ref: TypeRef,
    pub hard_deps: Vec<String>,
    pub soft_deps: Vec<String>,
    pub default_status: DesiredStatus,
    pub mandatory: bool,
    pub runtime_alterable: bool,
}

impl ModuleMetadata {
    pub fn new(id: impl Into<String>, type_ref: impl Into<TypeRef>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            type_ref: type_ref.into(),
            hard_deps: Vec::new(),
            soft_deps: Vec::new(),
            default_status: DesiredStatus::Enabled,
            mandatory: false,
            runtime_alterable: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_hard_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hard_deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_soft_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.soft_deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_status(mut self, status: DesiredStatus) -> Self {
        self.default_status = status;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn runtime_alterable(mut self) -> Self {
        self.runtime_alterable = true;
        self
    }
}

/// One module's metadata plus its mutable lifecycle state, as held by the
/// engine. Created once at discovery and never deleted; disabled modules
/// stay in the registry for a later re-enable.
#[derive(Debug)]
pub struct ModuleRecord {
    id: String,
    display_name: String,
    type_ref: TypeRef,
    hard_deps: BTreeSet<String>,
    soft_deps: BTreeSet<String>,
    desired_status: DesiredStatus,
    mandatory: bool,
    runtime_alterable: bool,
    phase: ModulePhase,
}

impl ModuleRecord {
    pub(crate) fn from_metadata(meta: ModuleMetadata) -> Self {
        // A mandatory module declared Disabled is a host contradiction;
        // mandatory modules always resolve to Enabled or ForceLoad.
        let desired_status = if meta.mandatory && meta.default_status == DesiredStatus::Disabled {
            tracing::warn!(
                module = %norm_id(&meta.id),
                "mandatory module declared disabled; forcing forceload"
            );
            DesiredStatus::ForceLoad
        } else {
            meta.default_status
        };

        Self {
            id: norm_id(&meta.id),
            display_name: meta.display_name,
            type_ref: meta.type_ref,
            hard_deps: meta.hard_deps.iter().map(|d| norm_id(d)).collect(),
            soft_deps: meta.soft_deps.iter().map(|d| norm_id(d)).collect(),
            desired_status,
            mandatory: meta.mandatory,
            runtime_alterable: meta.runtime_alterable,
            phase: ModulePhase::Discovered,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn hard_deps(&self) -> &BTreeSet<String> {
        &self.hard_deps
    }

    pub fn soft_deps(&self) -> &BTreeSet<String> {
        &self.soft_deps
    }

    pub fn desired_status(&self) -> DesiredStatus {
        self.desired_status
    }

    pub fn mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn runtime_alterable(&self) -> bool {
        self.runtime_alterable
    }

    pub fn phase(&self) -> ModulePhase {
        self.phase
    }

    pub(crate) fn set_desired_status(&mut self, status: DesiredStatus) {
        self.desired_status = status;
    }

    pub(crate) fn set_phase(&mut self, phase: ModulePhase) {
        self.phase = phase;
    }
}
