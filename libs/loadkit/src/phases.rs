use crate::context::ModuleCtx;
use crate::contracts::ModuleInstance;

/// One-shot action run before a phase's per-module pass. Failure aborts
/// the whole load.
pub type PrePhaseFn = Box<dyn Fn() -> anyhow::Result<()> + Send + 'static>;

/// Per-module phase action.
pub type ModulePhaseFn =
    Box<dyn Fn(&dyn ModuleInstance, &ModuleCtx) -> anyhow::Result<()> + Send + 'static>;

/// A named lifecycle phase: an optional one-shot pre-enable action plus
/// optional per-module enable and disable actions.
pub struct PhaseSpec {
    name: String,
    pre_enable: Option<PrePhaseFn>,
    enable: Option<ModulePhaseFn>,
    disable: Option<ModulePhaseFn>,
}

impl PhaseSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pre_enable: None,
            enable: None,
            disable: None,
        }
    }

    pub fn with_pre_enable<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + 'static,
    {
        self.pre_enable = Some(Box::new(f));
        self
    }

    pub fn with_enable<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn ModuleInstance, &ModuleCtx) -> anyhow::Result<()> + Send + 'static,
    {
        self.enable = Some(Box::new(f));
        self
    }

    pub fn with_disable<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn ModuleInstance, &ModuleCtx) -> anyhow::Result<()> + Send + 'static,
    {
        self.disable = Some(Box::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn pre_enable(&self) -> Option<&PrePhaseFn> {
        self.pre_enable.as_ref()
    }

    pub(crate) fn enable(&self) -> Option<&ModulePhaseFn> {
        self.enable.as_ref()
    }

    pub(crate) fn disable(&self) -> Option<&ModulePhaseFn> {
        self.disable.as_ref()
    }
}

impl std::fmt::Debug for PhaseSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseSpec")
            .field("name", &self.name)
            .field("has_pre_enable", &self.pre_enable.is_some())
            .field("has_enable", &self.enable.is_some())
            .field("has_disable", &self.disable.is_some())
            .finish()
    }
}

/// Ordered, host-declared list of lifecycle phases. Enable passes run the
/// list front to back; the runtime disable path walks the same order
/// invoking the disable actions.
#[derive(Debug, Default)]
pub struct PhaseRegistry {
    phases: Vec<PhaseSpec>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(mut self, spec: PhaseSpec) -> Self {
        self.phases.push(spec);
        self
    }

    pub fn push(&mut self, spec: PhaseSpec) {
        self.phases.push(spec);
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, PhaseSpec> {
        self.phases.iter()
    }
}
