use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::context::ModuleCtx;
use crate::contracts::{ConfigStore, DiscoveryStrategy, ModuleConstructor, ModuleInstance};
use crate::errors::LoaderError;
use crate::phases::PhaseRegistry;
use crate::record::{norm_id, DesiredStatus, ModulePhase, ModuleRecord};
use crate::resolver;

/// Global engine lifecycle. Strictly forward; `Errored` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Initialized,
    Discovering,
    Discovered,
    Enabling,
    Enabled,
    Errored,
}

/// Filter for [`LifecycleEngine::modules_with_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Enabled,
    Disabled,
    All,
}

/// Up-front engine configuration: the external collaborators, the
/// host-declared phase list and the discovery scan root. Validated once
/// by [`LifecycleEngine::new`].
pub struct EngineConfig {
    pub discovery: Box<dyn DiscoveryStrategy>,
    pub constructor: Box<dyn ModuleConstructor>,
    pub config: Box<dyn ConfigStore>,
    pub phases: PhaseRegistry,
    pub scan_root: String,
}

/// The module loader's state machine. Owns the resolved registry, the
/// constructed instances and the enabled/runtime-alterable sets.
///
/// Single-threaded by design: every operation runs to completion on the
/// calling thread and all state lives behind `&mut self`. Hosts embedding
/// the engine in a concurrent application must serialize access
/// externally.
pub struct LifecycleEngine {
    phase: EnginePhase,
    records: Vec<ModuleRecord>,
    instances: HashMap<String, Box<dyn ModuleInstance>>,
    enabled: BTreeSet<String>,
    runtime_alterable: BTreeSet<String>,
    phases: PhaseRegistry,
    discovery: Box<dyn DiscoveryStrategy>,
    constructor: Box<dyn ModuleConstructor>,
    config: Box<dyn ConfigStore>,
    scan_root: String,
}

impl LifecycleEngine {
    pub fn new(cfg: EngineConfig) -> Result<Self, LoaderError> {
        let mut seen = BTreeSet::new();
        for spec in cfg.phases.iter() {
            if !seen.insert(spec.name().to_string()) {
                return Err(LoaderError::DuplicatePhaseName(spec.name().to_string()));
            }
        }

        Ok(Self {
            phase: EnginePhase::Initialized,
            records: Vec::new(),
            instances: HashMap::new(),
            enabled: BTreeSet::new(),
            runtime_alterable: BTreeSet::new(),
            phases: cfg.phases,
            discovery: cfg.discovery,
            constructor: cfg.constructor,
            config: cfg.config,
            scan_root: cfg.scan_root,
        })
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Resolved registry, in load order. Empty before discovery.
    pub fn modules(&self) -> &[ModuleRecord] {
        &self.records
    }

    /// Whether the module is currently in the enabled set.
    pub fn is_loaded(&self, id: &str) -> Result<bool, LoaderError> {
        let id = norm_id(id);
        if self.index_of(&id).is_none() {
            return Err(LoaderError::NoSuchModule(id));
        }
        Ok(self.enabled.contains(&id))
    }

    /// Ids of modules matching the given phase filter.
    pub fn modules_with_status(&self, filter: StatusFilter) -> BTreeSet<String> {
        self.records
            .iter()
            .filter(|r| match filter {
                StatusFilter::Enabled => r.phase() == ModulePhase::Enabled,
                StatusFilter::Disabled => r.phase() == ModulePhase::Disabled,
                StatusFilter::All => true,
            })
            .map(|r| r.id().to_string())
            .collect()
    }

    // ---- discovery --------------------------------------------------------

    /// Collect module metadata, resolve the load order and merge the
    /// configured statuses. Any failure here is fatal to the engine.
    pub fn start_discovery(&mut self) -> Result<(), LoaderError> {
        self.expect_phase(EnginePhase::Initialized)?;
        self.phase = EnginePhase::Discovering;

        match self.run_discovery() {
            Ok(()) => {
                self.phase = EnginePhase::Discovered;
                Ok(())
            }
            Err(err) => {
                self.phase = EnginePhase::Errored;
                Err(err)
            }
        }
    }

    fn run_discovery(&mut self) -> Result<(), LoaderError> {
        let metas = self
            .discovery
            .discover(&self.scan_root)
            .map_err(LoaderError::Discovery)?;
        if metas.is_empty() {
            return Err(LoaderError::NoModulesDiscovered);
        }

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut records = Vec::with_capacity(metas.len());
        for meta in metas {
            let rec = ModuleRecord::from_metadata(meta);
            if !seen.insert(rec.id().to_string()) {
                return Err(LoaderError::DuplicateModuleId(rec.id().to_string()));
            }
            records.push(rec);
        }

        self.records = resolver::resolve_order(records)?;

        // Registered in resolved order so the generated configuration
        // layout is reproducible.
        for rec in &self.records {
            if let Err(err) =
                self.config
                    .register_defaults(rec.id(), rec.display_name(), rec.desired_status())
            {
                tracing::warn!(module = %rec.id(), error = %err, "failed to register config defaults");
            }
        }

        let statuses = match self.config.load_statuses() {
            Ok(statuses) => statuses,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load configured statuses; keeping declared defaults");
                BTreeMap::new()
            }
        };
        self.merge_statuses(statuses);

        Ok(())
    }

    fn merge_statuses(&mut self, statuses: BTreeMap<String, DesiredStatus>) {
        for (raw_id, status) in statuses {
            let id = norm_id(&raw_id);
            let Some(idx) = self.index_of(&id) else {
                tracing::warn!(module = %id, "configured status for unknown module, ignoring");
                continue;
            };
            let rec = &mut self.records[idx];

            if rec.mandatory() {
                if status == DesiredStatus::Disabled {
                    tracing::warn!(module = %id, "configuration tried to disable mandatory module, ignoring");
                }
                rec.set_desired_status(DesiredStatus::ForceLoad);
            } else if rec.desired_status() == DesiredStatus::ForceLoad
                && status == DesiredStatus::Disabled
            {
                tracing::warn!(module = %id, "configuration cannot disable force-loaded module, ignoring");
            } else {
                rec.set_desired_status(status);
            }
        }
    }

    // ---- load pipeline ----------------------------------------------------

    /// Drive every module through construction, the external-dependency
    /// re-check, configuration attachment and the enable phases.
    ///
    /// With `fail_fast`, any single per-module failure aborts the whole
    /// load; otherwise failures are isolated to the failing module.
    pub fn load_modules(&mut self, fail_fast: bool) -> Result<(), LoaderError> {
        self.expect_phase(EnginePhase::Discovered)?;
        self.phase = EnginePhase::Enabling;

        match self.run_load(fail_fast) {
            Ok(()) => {
                self.phase = EnginePhase::Enabled;
                tracing::info!(
                    enabled = ?self.enabled.iter().collect::<Vec<_>>(),
                    "module load complete"
                );
                Ok(())
            }
            Err(err) => {
                self.phase = EnginePhase::Errored;
                Err(err)
            }
        }
    }

    fn run_load(&mut self, fail_fast: bool) -> Result<(), LoaderError> {
        self.cascade_disablement()?;
        self.construct_modules(fail_fast)?;
        self.recheck_external_dependencies();
        self.attach_config_sections(fail_fast)?;

        let phases = std::mem::take(&mut self.phases);
        let result = self.apply_enable_phases(&phases, fail_fast);
        self.phases = phases;
        result?;

        self.finalize_load();
        Ok(())
    }

    /// Propagate configured disablement along hard dependencies to a
    /// fixpoint. A mandatory module in the blast radius aborts the load.
    fn cascade_disablement(&mut self) -> Result<(), LoaderError> {
        let mut disabled: BTreeSet<String> = BTreeSet::new();
        for rec in &mut self.records {
            if rec.desired_status() == DesiredStatus::Disabled {
                rec.set_phase(ModulePhase::Disabled);
                disabled.insert(rec.id().to_string());
            }
        }

        loop {
            let mut grew = false;
            for idx in 0..self.records.len() {
                let rec = &self.records[idx];
                if disabled.contains(rec.id()) {
                    continue;
                }
                let Some(dep) = rec.hard_deps().iter().find(|d| disabled.contains(*d)) else {
                    continue;
                };
                if rec.mandatory() {
                    return Err(LoaderError::MandatoryDependencyDisabled {
                        module: rec.id().to_string(),
                        dependency: dep.clone(),
                    });
                }
                tracing::info!(
                    module = %rec.id(),
                    dependency = %dep,
                    "disabling module, hard dependency is disabled"
                );
                let id = rec.id().to_string();
                self.records[idx].set_phase(ModulePhase::Disabled);
                disabled.insert(id);
                grew = true;
            }
            if !grew {
                break;
            }
        }
        Ok(())
    }

    fn construct_modules(&mut self, fail_fast: bool) -> Result<(), LoaderError> {
        for idx in 0..self.records.len() {
            if self.records[idx].phase() == ModulePhase::Disabled {
                continue;
            }
            let id = self.records[idx].id().to_string();
            let type_ref = self.records[idx].type_ref().clone();

            match self.constructor.construct(&type_ref) {
                Ok(instance) => {
                    self.records[idx].set_phase(ModulePhase::Constructed);
                    self.instances.insert(id.clone(), instance);
                    self.enabled.insert(id);
                }
                Err(err) => {
                    tracing::error!(module = %id, error = %err, "module construction failed");
                    self.records[idx].set_phase(ModulePhase::Errored);
                    if fail_fast {
                        return Err(LoaderError::Construction {
                            module: id,
                            source: err,
                        });
                    }
                }
            }
        }

        if self.enabled.is_empty() {
            return Err(LoaderError::NothingConstructed);
        }
        Ok(())
    }

    /// Run every constructed module's external-dependency check, then
    /// shrink the enabled set to a fixpoint: a removed dependency takes
    /// its hard dependents with it. Never fatal.
    fn recheck_external_dependencies(&mut self) {
        let mut failed: Vec<String> = Vec::new();
        for rec in &self.records {
            if !self.enabled.contains(rec.id()) {
                continue;
            }
            let Some(instance) = self.instances.get(rec.id()) else {
                continue;
            };
            if let Err(err) = instance.check_external_dependencies() {
                tracing::warn!(
                    module = %rec.id(),
                    error = %err,
                    "external dependency check failed, disabling module"
                );
                failed.push(rec.id().to_string());
            }
        }
        for id in failed {
            self.mark_runtime_disabled(&id);
        }

        loop {
            let broken: Vec<String> = self
                .records
                .iter()
                .filter(|r| self.enabled.contains(r.id()))
                .filter(|r| r.hard_deps().iter().any(|d| !self.enabled.contains(d)))
                .map(|r| r.id().to_string())
                .collect();
            if broken.is_empty() {
                break;
            }
            for id in broken {
                tracing::warn!(module = %id, "hard dependency no longer enabled, disabling module");
                self.mark_runtime_disabled(&id);
            }
        }
    }

    fn mark_runtime_disabled(&mut self, id: &str) {
        self.enabled.remove(id);
        if let Some(idx) = self.index_of(id) {
            self.records[idx].set_desired_status(DesiredStatus::Disabled);
            self.records[idx].set_phase(ModulePhase::Disabled);
        }
    }

    fn attach_config_sections(&mut self, fail_fast: bool) -> Result<(), LoaderError> {
        for idx in 0..self.records.len() {
            let id = self.records[idx].id().to_string();
            if !self.enabled.contains(&id) {
                continue;
            }
            let Some(section) = self.instances.get(&id).and_then(|i| i.config_section()) else {
                continue;
            };
            if let Err(err) = self.config.attach_section(&id, &section) {
                if fail_fast {
                    return Err(LoaderError::ConfigAttach {
                        module: id,
                        source: err,
                    });
                }
                tracing::warn!(module = %id, error = %err, "failed to attach config section");
            }
        }
        Ok(())
    }

    fn apply_enable_phases(
        &mut self,
        phases: &PhaseRegistry,
        fail_fast: bool,
    ) -> Result<(), LoaderError> {
        for spec in phases.iter() {
            if let Some(pre) = spec.pre_enable() {
                if let Err(err) = pre() {
                    tracing::error!(phase = %spec.name(), error = %err, "pre-phase action failed");
                    return Err(LoaderError::PrePhase {
                        phase: spec.name().to_string(),
                        source: err,
                    });
                }
            }

            let Some(action) = spec.enable() else {
                continue;
            };
            for idx in 0..self.records.len() {
                let id = self.records[idx].id().to_string();
                if !self.enabled.contains(&id) || self.records[idx].phase() == ModulePhase::Errored
                {
                    continue;
                }
                let Some(instance) = self.instances.get(&id) else {
                    continue;
                };
                let ctx = ModuleCtx::new(self.phase)
                    .for_module(&id, self.records[idx].display_name());
                if let Err(err) = action(instance.as_ref(), &ctx) {
                    tracing::error!(
                        module = %id,
                        phase = %spec.name(),
                        error = %err,
                        "enable phase failed"
                    );
                    self.records[idx].set_phase(ModulePhase::Errored);
                    self.enabled.remove(&id);
                    if fail_fast {
                        return Err(LoaderError::Enabling {
                            phase: spec.name().to_string(),
                            module: id,
                            source: err,
                        });
                    }
                }
            }
        }

        if self.enabled.is_empty() {
            return Err(LoaderError::NothingEnabled);
        }
        Ok(())
    }

    fn finalize_load(&mut self) {
        for rec in &mut self.records {
            if self.enabled.contains(rec.id()) {
                rec.set_phase(ModulePhase::Enabled);
            }
        }
        self.recompute_runtime_alterable();
        if let Err(err) = self.config.persist() {
            tracing::warn!(error = %err, "failed to persist module configuration");
        }
    }

    // ---- runtime enable / disable -----------------------------------------

    /// Disable one enabled, runtime-alterable module after the main load.
    /// Walks the disable actions of the phase list in declared order; a
    /// failure is not rolled back.
    pub fn disable(&mut self, id: &str) -> Result<(), LoaderError> {
        self.expect_phase(EnginePhase::Enabled)?;
        let id = norm_id(id);
        let idx = self
            .index_of(&id)
            .ok_or_else(|| LoaderError::NoSuchModule(id.clone()))?;

        let rec = &self.records[idx];
        if rec.mandatory() {
            return Err(LoaderError::Undisableable {
                id,
                reason: "module is mandatory",
            });
        }
        if rec.desired_status() == DesiredStatus::ForceLoad {
            return Err(LoaderError::Undisableable {
                id,
                reason: "module is force-loaded",
            });
        }
        if !rec.runtime_alterable() {
            return Err(LoaderError::Undisableable {
                id,
                reason: "module does not support runtime disable",
            });
        }
        if rec.phase() != ModulePhase::Enabled || !self.enabled.contains(&id) {
            return Err(LoaderError::Undisableable {
                id,
                reason: "module is not currently enabled",
            });
        }

        let phases = std::mem::take(&mut self.phases);
        let result = self.run_disable_phases(&phases, &id);
        self.phases = phases;

        if let Err(err) = self.config.remove_section(&id) {
            tracing::warn!(module = %id, error = %err, "failed to remove config section");
        }
        self.enabled.remove(&id);
        self.runtime_alterable.remove(&id);

        match result {
            Ok(()) => {
                self.records[idx].set_desired_status(DesiredStatus::Disabled);
                self.records[idx].set_phase(ModulePhase::Disabled);
                tracing::info!(module = %id, "module disabled");
                Ok(())
            }
            Err(err) => {
                self.records[idx].set_phase(ModulePhase::Errored);
                Err(err)
            }
        }
    }

    fn run_disable_phases(&self, phases: &PhaseRegistry, id: &str) -> Result<(), LoaderError> {
        let Some(idx) = self.index_of(id) else {
            return Err(LoaderError::NoSuchModule(id.to_string()));
        };
        for spec in phases.iter() {
            let Some(action) = spec.disable() else {
                continue;
            };
            let Some(instance) = self.instances.get(id) else {
                continue;
            };
            let ctx = ModuleCtx::new(self.phase).for_module(id, self.records[idx].display_name());
            if let Err(err) = action(instance.as_ref(), &ctx) {
                tracing::error!(
                    module = %id,
                    phase = %spec.name(),
                    error = %err,
                    "disable phase failed"
                );
                return Err(LoaderError::Disabling {
                    phase: spec.name().to_string(),
                    module: id.to_string(),
                    source: err,
                });
            }
        }
        Ok(())
    }

    /// Enable one or more not-loaded, runtime-alterable modules after the
    /// main load. All ids are validated before anything runs; modules
    /// already enabled by this call stay enabled if a later one fails.
    pub fn enable<I, S>(&mut self, ids: I) -> Result<(), LoaderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.expect_phase(EnginePhase::Enabled)?;

        let mut targets: Vec<String> = Vec::new();
        for raw in ids {
            let id = norm_id(raw.as_ref());
            let idx = self
                .index_of(&id)
                .ok_or_else(|| LoaderError::NoSuchModule(id.clone()))?;
            let rec = &self.records[idx];
            if self.enabled.contains(&id) || rec.phase() == ModulePhase::Enabled {
                return Err(LoaderError::Unenableable {
                    id,
                    reason: "module is already loaded",
                });
            }
            if !rec.runtime_alterable() {
                return Err(LoaderError::Unenableable {
                    id,
                    reason: "module does not support runtime enable",
                });
            }
            targets.push(id);
        }

        let phases = std::mem::take(&mut self.phases);
        let mut result = Ok(());
        for id in &targets {
            if let Err(err) = self.enable_one(&phases, id) {
                result = Err(err);
                break;
            }
        }
        self.phases = phases;
        self.recompute_runtime_alterable();
        result
    }

    fn enable_one(&mut self, phases: &PhaseRegistry, id: &str) -> Result<(), LoaderError> {
        let Some(idx) = self.index_of(id) else {
            return Err(LoaderError::NoSuchModule(id.to_string()));
        };

        // A module is never reconstructed in place; reuse a live instance
        // from a previous enable.
        if !self.instances.contains_key(id) {
            let type_ref = self.records[idx].type_ref().clone();
            match self.constructor.construct(&type_ref) {
                Ok(instance) => {
                    self.instances.insert(id.to_string(), instance);
                }
                Err(err) => {
                    tracing::error!(module = %id, error = %err, "module construction failed");
                    self.records[idx].set_phase(ModulePhase::Errored);
                    return Err(LoaderError::Construction {
                        module: id.to_string(),
                        source: err,
                    });
                }
            }
        }
        self.records[idx].set_phase(ModulePhase::Constructed);

        let Some(instance) = self.instances.get(id) else {
            return Err(LoaderError::NoSuchModule(id.to_string()));
        };

        if let Err(err) = instance.check_external_dependencies() {
            tracing::error!(module = %id, error = %err, "external dependency check failed");
            self.records[idx].set_phase(ModulePhase::Errored);
            return Err(LoaderError::MissingDependency {
                module: id.to_string(),
                source: err,
            });
        }

        if let Some(section) = instance.config_section() {
            if let Err(err) = self.config.attach_section(id, &section) {
                tracing::warn!(module = %id, error = %err, "failed to attach config section");
            }
        }

        for spec in phases.iter() {
            let Some(action) = spec.enable() else {
                continue;
            };
            let ctx = ModuleCtx::new(self.phase).for_module(id, self.records[idx].display_name());
            if let Err(err) = action(instance.as_ref(), &ctx) {
                tracing::error!(
                    module = %id,
                    phase = %spec.name(),
                    error = %err,
                    "enable phase failed"
                );
                self.records[idx].set_phase(ModulePhase::Errored);
                return Err(LoaderError::Enabling {
                    phase: spec.name().to_string(),
                    module: id.to_string(),
                    source: err,
                });
            }
        }

        self.records[idx].set_phase(ModulePhase::Enabled);
        if self.records[idx].desired_status() != DesiredStatus::ForceLoad {
            self.records[idx].set_desired_status(DesiredStatus::Enabled);
        }
        self.enabled.insert(id.to_string());
        tracing::info!(module = %id, "module enabled at runtime");
        Ok(())
    }

    // ---- helpers ----------------------------------------------------------

    fn recompute_runtime_alterable(&mut self) {
        self.runtime_alterable = self
            .records
            .iter()
            .filter(|r| r.runtime_alterable() && self.enabled.contains(r.id()))
            .map(|r| r.id().to_string())
            .collect();
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    fn expect_phase(&self, expected: EnginePhase) -> Result<(), LoaderError> {
        if self.phase != expected {
            return Err(LoaderError::IllegalState {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("phase", &self.phase)
            .field(
                "modules",
                &self.records.iter().map(|r| r.id()).collect::<Vec<_>>(),
            )
            .field("enabled", &self.enabled)
            .finish()
    }
}
