//! End-to-end loader scenarios through the public API only.

use std::collections::BTreeSet;
use std::fs;

use loadkit::{
    DesiredStatus, DiscoveryStrategy, EngineConfig, EnginePhase, LifecycleEngine,
    MemoryConfigStore, ModuleConstructor, ModuleInstance, ModuleMetadata, PhaseRegistry,
    PhaseSpec, StatusFilter, TypeRef, YamlConfigStore,
};

struct ListDiscovery(Vec<ModuleMetadata>);

impl DiscoveryStrategy for ListDiscovery {
    fn discover(&self, _scan_root: &str) -> anyhow::Result<Vec<ModuleMetadata>> {
        Ok(self.0.clone())
    }
}

struct Plain;

impl ModuleInstance for Plain {
    fn config_section(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "greeting": "hello" }))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct PlainConstructor;

impl ModuleConstructor for PlainConstructor {
    fn construct(&self, _type_ref: &TypeRef) -> anyhow::Result<Box<dyn ModuleInstance>> {
        Ok(Box::new(Plain))
    }
}

fn chain_metadata() -> Vec<ModuleMetadata> {
    vec![
        ModuleMetadata::new("three", "three").with_hard_deps(["two"]),
        ModuleMetadata::new("one", "one"),
        ModuleMetadata::new("two", "two").with_hard_deps(["one"]),
    ]
}

#[test]
fn chain_discovery_order_is_one_two_three() {
    let mut engine = LifecycleEngine::new(EngineConfig {
        discovery: Box::new(ListDiscovery(chain_metadata())),
        constructor: Box::new(PlainConstructor),
        config: Box::new(MemoryConfigStore::new()),
        phases: PhaseRegistry::new(),
        scan_root: "modules".into(),
    })
    .unwrap();

    engine.start_discovery().unwrap();
    let order: Vec<&str> = engine.modules().iter().map(|r| r.id()).collect();
    assert_eq!(order, vec!["one", "two", "three"]);
}

#[test]
fn disabling_middle_of_chain_leaves_only_the_root() {
    let mut engine = LifecycleEngine::new(EngineConfig {
        discovery: Box::new(ListDiscovery(chain_metadata())),
        constructor: Box::new(PlainConstructor),
        config: Box::new(MemoryConfigStore::new().with_status("two", DesiredStatus::Disabled)),
        phases: PhaseRegistry::new(),
        scan_root: "modules".into(),
    })
    .unwrap();

    engine.start_discovery().unwrap();
    // Cascading disablement is not a failure; fail-fast must not trip.
    engine.load_modules(true).unwrap();

    let enabled = engine.modules_with_status(StatusFilter::Enabled);
    assert_eq!(enabled, BTreeSet::from(["one".to_string()]));
    assert!(engine.is_loaded("one").unwrap());
    assert!(!engine.is_loaded("two").unwrap());
    assert!(!engine.is_loaded("three").unwrap());
}

#[test]
fn full_pipeline_against_a_yaml_config_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("modules.yaml");
    fs::write(
        &path,
        r#"
modules:
  reporting:
    status: disabled
    description: "Reporting"
"#,
    )
    .unwrap();

    let metas = vec![
        ModuleMetadata::new("storage", "storage"),
        ModuleMetadata::new("reporting", "reporting").with_hard_deps(["storage"]),
        ModuleMetadata::new("api", "api")
            .with_hard_deps(["storage"])
            .runtime_alterable(),
    ];

    let phases = PhaseRegistry::new().with_phase(
        PhaseSpec::new("serve")
            .with_enable(|_m, _ctx| Ok(()))
            .with_disable(|_m, _ctx| Ok(())),
    );

    let mut engine = LifecycleEngine::new(EngineConfig {
        discovery: Box::new(ListDiscovery(metas)),
        constructor: Box::new(PlainConstructor),
        config: Box::new(YamlConfigStore::load_or_default(&path).unwrap()),
        phases,
        scan_root: "modules".into(),
    })
    .unwrap();

    engine.start_discovery().unwrap();
    engine.load_modules(false).unwrap();
    assert_eq!(engine.phase(), EnginePhase::Enabled);

    let enabled = engine.modules_with_status(StatusFilter::Enabled);
    assert_eq!(
        enabled,
        BTreeSet::from(["api".to_string(), "storage".to_string()])
    );

    // Finalization persisted defaults for every discovered module plus the
    // attached sections of the surviving ones.
    let persisted = fs::read_to_string(&path).unwrap();
    assert!(persisted.contains("storage"));
    assert!(persisted.contains("api"));
    assert!(persisted.contains("greeting"));

    // Runtime disable detaches the module's section and persists nothing
    // further on its own; re-enable brings the module back.
    engine.disable("api").unwrap();
    assert!(!engine.is_loaded("api").unwrap());
    engine.enable(["api"]).unwrap();
    assert!(engine.is_loaded("api").unwrap());
}
