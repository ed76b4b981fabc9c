use std::sync::Arc;

use crate::engine::EnginePhase;

/// Read-only context handed to every phase action. Cloneable and scoped
/// to the module the action is currently running against.
#[derive(Clone)]
pub struct ModuleCtx {
    engine_phase: EnginePhase,
    module_id: Option<Arc<str>>,
    display_name: Option<Arc<str>>,
}

impl ModuleCtx {
    pub(crate) fn new(engine_phase: EnginePhase) -> Self {
        Self {
            engine_phase,
            module_id: None,
            display_name: None,
        }
    }

    /// Scope the context to a specific module (used by the engine).
    pub(crate) fn for_module(mut self, id: &str, display_name: &str) -> Self {
        self.module_id = Some(Arc::<str>::from(id));
        self.display_name = Some(Arc::<str>::from(display_name));
        self
    }

    pub fn engine_phase(&self) -> EnginePhase {
        self.engine_phase
    }

    pub fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}
