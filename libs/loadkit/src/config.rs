use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::contracts::ConfigStore;
use crate::record::DesiredStatus;

/// On-disk configuration model: per-module status entries plus a bag of
/// module-owned configuration sections.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    modules: BTreeMap<String, ModuleEntry>,
    #[serde(default)]
    sections: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModuleEntry {
    status: DesiredStatus,
    #[serde(default)]
    description: String,
}

/// YAML file-backed [`ConfigStore`]. Loads with layered extraction
/// (defaults, then the file if present) and persists the full model back
/// to the same path.
#[derive(Debug)]
pub struct YamlConfigStore {
    path: PathBuf,
    file: ConfigFile,
}

impl YamlConfigStore {
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use figment::{
            providers::{Format, Serialized, Yaml},
            Figment,
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(ConfigFile::default()))
            .merge(Yaml::file(path.as_ref()));

        let file: ConfigFile = figment
            .extract()
            .with_context(|| format!("failed to load module config from {:?}", path.as_ref()))?;

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            file,
        })
    }

    /// Serialize the current model to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(&self.file).context("failed to serialize module config to YAML")
    }

    pub fn has_section(&self, id: &str) -> bool {
        self.file.sections.contains_key(id)
    }
}

impl ConfigStore for YamlConfigStore {
    fn register_defaults(
        &mut self,
        id: &str,
        description: &str,
        default_status: DesiredStatus,
    ) -> anyhow::Result<()> {
        self.file
            .modules
            .entry(id.to_string())
            .or_insert_with(|| ModuleEntry {
                status: default_status,
                description: description.to_string(),
            });
        Ok(())
    }

    fn load_statuses(&mut self) -> anyhow::Result<BTreeMap<String, DesiredStatus>> {
        Ok(self
            .file
            .modules
            .iter()
            .map(|(id, entry)| (id.clone(), entry.status))
            .collect())
    }

    fn attach_section(&mut self, id: &str, section: &serde_json::Value) -> anyhow::Result<()> {
        self.file.sections.insert(id.to_string(), section.clone());
        Ok(())
    }

    fn remove_section(&mut self, id: &str) -> anyhow::Result<()> {
        self.file.sections.remove(id);
        Ok(())
    }

    fn persist(&mut self) -> anyhow::Result<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(&self.path, yaml)
            .with_context(|| format!("failed to write module config to {:?}", self.path))
    }
}

/// In-memory [`ConfigStore`] for hosts that manage persistence themselves
/// and for tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    statuses: BTreeMap<String, DesiredStatus>,
    defaults: BTreeMap<String, DesiredStatus>,
    sections: BTreeMap<String, serde_json::Value>,
    persist_count: usize,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a configured status, as if a user had edited the file.
    pub fn with_status(mut self, id: impl Into<String>, status: DesiredStatus) -> Self {
        self.statuses.insert(id.into(), status);
        self
    }

    pub fn has_section(&self, id: &str) -> bool {
        self.sections.contains_key(id)
    }

    pub fn section(&self, id: &str) -> Option<&serde_json::Value> {
        self.sections.get(id)
    }

    pub fn persist_count(&self) -> usize {
        self.persist_count
    }
}

impl ConfigStore for MemoryConfigStore {
    fn register_defaults(
        &mut self,
        id: &str,
        _description: &str,
        default_status: DesiredStatus,
    ) -> anyhow::Result<()> {
        self.defaults.entry(id.to_string()).or_insert(default_status);
        Ok(())
    }

    fn load_statuses(&mut self) -> anyhow::Result<BTreeMap<String, DesiredStatus>> {
        // User-set statuses win over generated defaults.
        let mut merged = self.defaults.clone();
        merged.extend(self.statuses.clone());
        Ok(merged)
    }

    fn attach_section(&mut self, id: &str, section: &serde_json::Value) -> anyhow::Result<()> {
        self.sections.insert(id.to_string(), section.clone());
        Ok(())
    }

    fn remove_section(&mut self, id: &str) -> anyhow::Result<()> {
        self.sections.remove(id);
        Ok(())
    }

    fn persist(&mut self) -> anyhow::Result<()> {
        self.persist_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_empty_model() {
        let tmp = tempdir().unwrap();
        let store = YamlConfigStore::load_or_default(tmp.path().join("modules.yaml")).unwrap();
        assert!(store.file.modules.is_empty());
        assert!(store.file.sections.is_empty());
    }

    #[test]
    fn register_defaults_does_not_override_configured_status() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("modules.yaml");
        fs::write(
            &path,
            r#"
modules:
  chat:
    status: disabled
    description: "Chat"
"#,
        )
        .unwrap();

        let mut store = YamlConfigStore::load_or_default(&path).unwrap();
        store
            .register_defaults("chat", "Chat", DesiredStatus::Enabled)
            .unwrap();
        store
            .register_defaults("metrics", "Metrics", DesiredStatus::Enabled)
            .unwrap();

        let statuses = store.load_statuses().unwrap();
        assert_eq!(statuses["chat"], DesiredStatus::Disabled);
        assert_eq!(statuses["metrics"], DesiredStatus::Enabled);
    }

    #[test]
    fn forceload_status_round_trips() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("modules.yaml");
        fs::write(
            &path,
            r#"
modules:
  core:
    status: forceload
"#,
        )
        .unwrap();

        let mut store = YamlConfigStore::load_or_default(&path).unwrap();
        let statuses = store.load_statuses().unwrap();
        assert_eq!(statuses["core"], DesiredStatus::ForceLoad);
    }

    #[test]
    fn attach_persist_reload_remove_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("modules.yaml");

        let mut store = YamlConfigStore::load_or_default(&path).unwrap();
        store
            .register_defaults("chat", "Chat", DesiredStatus::Enabled)
            .unwrap();
        store
            .attach_section("chat", &serde_json::json!({"buffer": 64}))
            .unwrap();
        store.persist().unwrap();

        let mut reloaded = YamlConfigStore::load_or_default(&path).unwrap();
        assert!(reloaded.has_section("chat"));
        assert_eq!(
            reloaded.file.sections["chat"]["buffer"],
            serde_json::json!(64)
        );

        reloaded.remove_section("chat").unwrap();
        reloaded.persist().unwrap();

        let mut rereloaded = YamlConfigStore::load_or_default(&path).unwrap();
        assert!(!rereloaded.has_section("chat"));
        assert_eq!(
            rereloaded.load_statuses().unwrap()["chat"],
            DesiredStatus::Enabled
        );
    }

    #[test]
    fn memory_store_user_status_wins_over_default() {
        let mut store =
            MemoryConfigStore::new().with_status("chat", DesiredStatus::Disabled);
        store
            .register_defaults("chat", "Chat", DesiredStatus::Enabled)
            .unwrap();
        let statuses = store.load_statuses().unwrap();
        assert_eq!(statuses["chat"], DesiredStatus::Disabled);
    }
}
