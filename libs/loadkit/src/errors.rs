use thiserror::Error;

use crate::engine::EnginePhase;

/// Structured errors for the module loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    // Discovery errors (always fatal, nothing is published)
    #[error("duplicate module id '{0}'")]
    DuplicateModuleId(String),
    #[error("no modules discovered")]
    NoModulesDiscovered,
    #[error("module '{module}' depends on unknown '{depends_on}'")]
    UnknownDependency { module: String, depends_on: String },
    #[error("cyclic dependency among modules: {}", ids.join(", "))]
    DependencyCycle { ids: Vec<String> },
    #[error("module discovery failed")]
    Discovery(#[source] anyhow::Error),

    // Construction errors
    #[error("construction failed for module '{module}'")]
    Construction {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("mandatory module '{module}' requires disabled dependency '{dependency}'")]
    MandatoryDependencyDisabled { module: String, dependency: String },
    #[error("no modules survived construction")]
    NothingConstructed,

    // Enabling errors
    #[error("pre-phase action '{phase}' failed")]
    PrePhase {
        phase: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("phase '{phase}' failed for module '{module}'")]
    Enabling {
        phase: String,
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("no modules survived enabling")]
    NothingEnabled,
    #[error("configuration attachment failed for module '{module}'")]
    ConfigAttach {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    // Runtime enable/disable errors
    #[error("disable phase '{phase}' failed for module '{module}'")]
    Disabling {
        phase: String,
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("missing external dependency for module '{module}'")]
    MissingDependency {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{id}' cannot be disabled: {reason}")]
    Undisableable { id: String, reason: &'static str },
    #[error("module '{id}' cannot be enabled at runtime: {reason}")]
    Unenableable { id: String, reason: &'static str },

    // Lookup / state errors
    #[error("no such module '{0}'")]
    NoSuchModule(String),
    #[error("operation requires engine phase {expected:?}, but engine is {actual:?}")]
    IllegalState {
        expected: EnginePhase,
        actual: EnginePhase,
    },

    // Engine configuration errors
    #[error("duplicate phase name '{0}' in phase registry")]
    DuplicatePhaseName(String),
}
