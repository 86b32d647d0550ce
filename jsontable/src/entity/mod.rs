// Entity metadata and the capability hosts implement for typed records

use crate::error::Result;
use crate::record::Record;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DEFAULT_PRIMARY_KEY: &str = "id";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Definition of a single entity (one storage file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: Option<String>,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Fields that are stored but left out of presented output.
    #[serde(default)]
    pub hidden: Vec<String>,
    #[serde(default)]
    pub per_page: Option<usize>,
}

fn default_primary_key() -> Option<String> {
    Some(DEFAULT_PRIMARY_KEY.to_string())
}

fn default_true() -> bool {
    true
}

impl EntityDefinition {
    pub fn new(name: &str) -> Self {
        EntityDefinition {
            name: name.to_string(),
            primary_key: default_primary_key(),
            timestamps: true,
            hidden: Vec::new(),
            per_page: None,
        }
    }

    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = Some(column.to_string());
        self
    }

    pub fn without_primary_key(mut self) -> Self {
        self.primary_key = None;
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    pub fn hidden(mut self, columns: &[&str]) -> Self {
        self.hidden = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn primary_key_name(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Slugified, lower-cased name used for the storage file. Only the last
    /// path segment of a qualified type name is used.
    pub fn storage_name(&self) -> String {
        let short = self
            .name
            .rsplit(|c: char| c == '\\' || c == ':' || c == '/')
            .find(|s| !s.is_empty())
            .unwrap_or(self.name.as_str());
        slug::slugify(short)
    }

    /// Copy of `record` without the hidden fields.
    pub fn visible(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(key, _)| !self.hidden.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

pub fn fresh_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Implemented by host record types so query results can be turned into
/// typed values. The defaults go through serde.
pub trait Hydratable: Serialize + DeserializeOwned {
    fn definition() -> EntityDefinition;

    /// Build a typed record from raw stored attributes, without validation.
    fn hydrate(attributes: Record) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(attributes))?)
    }

    /// The attributes written to the storage file.
    fn attributes(&self) -> Result<Record> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "record serialized to a non-object value: {other}"
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct UserJson {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        name: String,
    }

    impl Hydratable for UserJson {
        fn definition() -> EntityDefinition {
            EntityDefinition::new("UserJson")
        }
    }

    #[test]
    fn test_storage_name_is_slugified() {
        assert_eq!(EntityDefinition::new("UserJson").storage_name(), "userjson");
        assert_eq!(
            EntityDefinition::new("App\\Models\\Blog Post").storage_name(),
            "blog-post"
        );
        assert_eq!(EntityDefinition::new("app::Invoice").storage_name(), "invoice");
    }

    #[test]
    fn test_definition_defaults() {
        let def = EntityDefinition::new("users");
        assert_eq!(def.primary_key_name(), Some("id"));
        assert!(def.timestamps);

        let def = def.without_primary_key().without_timestamps();
        assert_eq!(def.primary_key_name(), None);
        assert!(!def.timestamps);
    }

    #[test]
    fn test_definition_from_yaml_defaults() {
        let def: EntityDefinition = serde_yaml::from_str("hidden: [password]").unwrap();
        assert_eq!(def.primary_key_name(), Some("id"));
        assert!(def.timestamps);

        let def: EntityDefinition = serde_yaml::from_str("primary_key: null").unwrap();
        assert_eq!(def.primary_key_name(), None);
    }

    #[test]
    fn test_visible_strips_hidden_fields() {
        let def = EntityDefinition::new("users").hidden(&["password"]);
        let record: Record =
            serde_json::from_value(json!({ "id": 1, "password": "x", "name": "a" })).unwrap();
        let visible = def.visible(&record);
        assert!(!visible.contains_key("password"));
        assert_eq!(visible.len(), 2);
    }

    #[test]
    fn test_hydrate_round_trip() {
        let record: Record = serde_json::from_value(json!({ "id": 7, "name": "a" })).unwrap();
        let user = UserJson::hydrate(record.clone()).unwrap();
        assert_eq!(user, UserJson { id: Some(7), name: "a".into() });
        assert_eq!(user.attributes().unwrap(), record);
    }

    #[test]
    fn test_fresh_timestamp_format() {
        let ts = fresh_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
    }
}
