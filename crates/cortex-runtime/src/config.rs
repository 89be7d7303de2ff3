use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use cortex_adapters::AdapterSpec;

use crate::error::Result;
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// The store owner. Identities listed here are linked to the me-person
/// before any adapter runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeConfig {
    pub canonical_name: String,
    #[serde(default)]
    pub identities: Vec<IdentityEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LiveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub live: Option<LiveConfig>,
    #[serde(default)]
    pub options: serde_json::Value,
}

impl AdapterEntry {
    pub fn spec(&self, name: &str) -> AdapterSpec {
        let options = if self.options.is_null() {
            serde_json::json!({})
        } else {
            self.options.clone()
        };
        AdapterSpec {
            name: name.to_string(),
            kind: self.kind.clone(),
            options,
        }
    }

    pub fn live_enabled(&self) -> bool {
        self.live.as_ref().is_some_and(|l| l.enabled)
    }

    pub fn live_options(&self) -> serde_json::Value {
        self.live
            .as_ref()
            .map(|l| l.options.clone())
            .filter(|o| !o.is_null())
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub me: Option<MeConfig>,
    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterEntry>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn enabled_adapters(&self) -> Vec<(&String, &AdapterEntry)> {
        self.adapters.iter().filter(|(_, e)| e.enabled).collect()
    }

    pub fn get(&self, name: &str) -> Option<&AdapterEntry> {
        self.adapters.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
me:
  canonical_name: Ada Lovelace
  identities:
    - type: email
      value: ada@example.com
    - type: phone
      value: "+17072874936"

adapters:
  imessage:
    type: imessage
    enabled: true
    live:
      enabled: true
      options:
        debounce_secs: 2
  gmail:
    type: gogcli
    enabled: true
    options:
      workers: 4
      qps: 4.0
  old_bird:
    type: bird
    enabled: false
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.me.as_ref().unwrap().canonical_name, "Ada Lovelace");
        assert_eq!(config.me.as_ref().unwrap().identities.len(), 2);
        assert_eq!(config.adapters.len(), 3);

        let enabled = config.enabled_adapters();
        assert_eq!(enabled.len(), 2);

        let imessage = config.get("imessage").unwrap();
        assert!(imessage.live_enabled());
        assert_eq!(imessage.live_options()["debounce_secs"], 2);

        let gmail = config.get("gmail").unwrap();
        assert!(!gmail.live_enabled());
        let spec = gmail.spec("gmail");
        assert_eq!(spec.kind, "gogcli");
        assert_eq!(spec.options["workers"], 4);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("nope.yaml")).unwrap();
        assert!(config.adapters.is_empty());
        assert!(config.me.is_none());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.adapters.len(), 3);
        assert!(!loaded.get("old_bird").unwrap().enabled);
    }

    #[test]
    fn test_null_options_become_empty_map() {
        let yaml = "adapters:\n  im:\n    type: imessage\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let spec = config.get("im").unwrap().spec("im");
        assert!(spec.options.is_object());
    }
}
