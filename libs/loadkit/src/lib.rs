//! # LoadKit - Host-Side Module Loader
//!
//! A dependency resolver and phased lifecycle state machine for named,
//! versionless modules.
//!
//! ## Features
//!
//! - **Deterministic ordering**: layered topological sort over hard and
//!   soft dependencies with reproducible tie-breaking
//! - **Phase-based lifecycle**: discovery → construction → enabling, with
//!   host-declared named phases
//! - **Failure isolation**: per-module failures are contained unless the
//!   caller asks for fail-fast
//! - **Runtime alterable modules**: a constrained enable/disable path
//!   after the main load completes
//!
//! ## Example
//!
//! ```rust,ignore
//! use loadkit::{EngineConfig, LifecycleEngine, PhaseRegistry, PhaseSpec};
//!
//! let engine = LifecycleEngine::new(EngineConfig {
//!     discovery: Box::new(my_discovery),
//!     constructor: Box::new(my_constructor),
//!     config: Box::new(loadkit::MemoryConfigStore::new()),
//!     phases: PhaseRegistry::new()
//!         .with_phase(PhaseSpec::new("enable").with_enable(|m, ctx| { /* ... */ Ok(()) })),
//!     scan_root: "modules".into(),
//! })?;
//! ```

pub use anyhow::Result;

pub mod config;
pub mod context;
pub mod contracts;
pub mod engine;
pub mod errors;
pub mod phases;
pub mod record;

mod resolver;

pub use config::{MemoryConfigStore, YamlConfigStore};
pub use context::ModuleCtx;
pub use contracts::{ConfigStore, DiscoveryStrategy, ModuleConstructor, ModuleInstance};
pub use engine::{EngineConfig, EnginePhase, LifecycleEngine, StatusFilter};
pub use errors::LoaderError;
pub use phases::{PhaseRegistry, PhaseSpec};
pub use record::{DesiredStatus, ModuleMetadata, ModulePhase, ModuleRecord, TypeRef};
