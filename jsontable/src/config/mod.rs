use crate::entity::EntityDefinition;
use crate::error::{JsonTableError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_PER_PAGE: usize = 15;

/// Store configuration, usually parsed from a `jsontable.yaml` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one `<entity>.json` file per entity.
    pub storage_root: PathBuf,
    /// Take an advisory lock on the entity file for each load/rewrite cycle.
    #[serde(default = "default_true")]
    pub locking: bool,
    #[serde(default)]
    pub pretty: bool,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default)]
    pub entities: HashMap<String, EntityDefinition>,
}

fn default_true() -> bool {
    true
}

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

impl StoreConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        StoreConfig {
            storage_root: storage_root.into(),
            locking: true,
            pretty: false,
            per_page: DEFAULT_PER_PAGE,
            entities: HashMap::new(),
        }
    }

    /// Parse a config file. A relative `storage_root` is resolved against
    /// the directory containing the file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        if config.storage_root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.storage_root = base.join(&config.storage_root);
        }
        Ok(config)
    }

    /// Parse a config YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config: StoreConfig = serde_yaml::from_str(content)?;
        if config.storage_root.as_os_str().is_empty() {
            return Err(JsonTableError::Config("storage_root must not be empty".into()));
        }
        if config.per_page == 0 {
            return Err(JsonTableError::Config("per_page must be at least 1".into()));
        }
        for (name, definition) in config.entities.iter_mut() {
            if definition.name.is_empty() {
                definition.name = name.clone();
            }
        }
        Ok(config)
    }

    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_entity(mut self, definition: EntityDefinition) -> Self {
        self.entities.insert(definition.name.clone(), definition);
        self
    }

    /// Definition for `name`: the configured one, or defaults.
    pub fn entity(&self, name: &str) -> EntityDefinition {
        self.entities
            .get(name)
            .cloned()
            .unwrap_or_else(|| EntityDefinition::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
storage_root: data/json
pretty: true
per_page: 5
entities:
  users:
    hidden: [password, remember_token]
  audit_log:
    primary_key: null
    timestamps: false
"#;

    #[test]
    fn test_parse_config() {
        let config = StoreConfig::from_yaml_str(CONFIG).unwrap();
        assert!(config.locking);
        assert!(config.pretty);
        assert_eq!(config.per_page, 5);

        let users = config.entity("users");
        assert_eq!(users.name, "users");
        assert_eq!(users.primary_key_name(), Some("id"));
        assert_eq!(users.hidden, vec!["password", "remember_token"]);

        let audit = config.entity("audit_log");
        assert_eq!(audit.primary_key_name(), None);
        assert!(!audit.timestamps);
    }

    #[test]
    fn test_unknown_entity_gets_defaults() {
        let config = StoreConfig::from_yaml_str("storage_root: /tmp/x").unwrap();
        let posts = config.entity("posts");
        assert_eq!(posts, EntityDefinition::new("posts"));
        assert_eq!(config.per_page, DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_load_resolves_relative_root() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jsontable.yaml");
        std::fs::write(&path, CONFIG).unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.storage_root, tmp.path().join("data/json"));
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(matches!(
            StoreConfig::from_yaml_str("storage_root: ''"),
            Err(JsonTableError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_yaml_str("storage_root: x\nper_page: 0"),
            Err(JsonTableError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_yaml_str("pretty: true"),
            Err(JsonTableError::Yaml(_))
        ));
    }
}
