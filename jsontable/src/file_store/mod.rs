// Storage I/O - one JSON array file per entity

use crate::collection::RecordCollection;
use crate::config::StoreConfig;
use crate::entity::EntityDefinition;
use crate::error::{JsonTableError, Result};
use crate::record::Record;
use fs2::FileExt;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const EXTENSION: &str = "json";
const LOCK_SUFFIX: &str = ".lock";

/// Reads and rewrites whole entity files under a storage root.
///
/// Every load parses the file from disk; nothing is cached between calls.
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers never observe a half-written file.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    locking: bool,
    pretty: bool,
}

/// Exclusive advisory lock on one entity file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("Failed to release lock {}: {e}", self.path.display());
        }
    }
}

impl FileStore {
    pub fn new(config: &StoreConfig) -> Self {
        FileStore {
            root: config.storage_root.clone(),
            locking: config.locking,
            pretty: config.pretty,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<storage name>.json`
    pub fn path_for(&self, entity: &EntityDefinition) -> PathBuf {
        self.root
            .join(format!("{}.{EXTENSION}", entity.storage_name()))
    }

    /// Load the full collection. A missing file is an empty collection.
    pub fn load(&self, entity: &EntityDefinition) -> Result<RecordCollection> {
        let path = self.path_for(entity);
        if !path.exists() {
            log::debug!("No storage file for '{}' yet", entity.name);
            return Ok(RecordCollection::new());
        }

        let content = std::fs::read_to_string(&path)?;
        let records = parse_records(&path, &content)?;
        log::debug!("Loaded {} records from {}", records.len(), path.display());
        Ok(RecordCollection::from_records(records))
    }

    /// Overwrite the entity file with the whole collection.
    pub fn save(&self, entity: &EntityDefinition, records: &RecordCollection) -> Result<()> {
        let path = self.path_for(entity);
        std::fs::create_dir_all(&self.root)?;

        let bytes = if self.pretty {
            serde_json::to_vec_pretty(records)?
        } else {
            serde_json::to_vec(records)?
        };

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        log::debug!("Wrote {} records to {}", records.len(), path.display());
        Ok(())
    }

    /// Block until the entity's lock is held. Returns `None` when locking is
    /// turned off in the config.
    pub fn lock(&self, entity: &EntityDefinition) -> Result<Option<FileLock>> {
        if !self.locking {
            return Ok(None);
        }
        let (file, path) = self.open_lock_file(entity)?;
        if file.try_lock_exclusive().is_err() {
            log::warn!("Waiting for lock on {}", path.display());
            file.lock_exclusive()?;
        }
        log::debug!("Acquired lock {}", path.display());
        Ok(Some(FileLock { file, path }))
    }

    /// Take the entity's lock without waiting.
    pub fn try_lock(&self, entity: &EntityDefinition) -> Result<FileLock> {
        let (file, path) = self.open_lock_file(entity)?;
        if file.try_lock_exclusive().is_err() {
            return Err(JsonTableError::Locked { path });
        }
        Ok(FileLock { file, path })
    }

    fn open_lock_file(&self, entity: &EntityDefinition) -> Result<(File, PathBuf)> {
        std::fs::create_dir_all(&self.root)?;
        let mut path = self.path_for(entity).into_os_string();
        path.push(LOCK_SUFFIX);
        let path = PathBuf::from(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok((file, path))
    }

    /// Storage names of every entity file present under the root.
    pub fn entity_files(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let pattern = format!("{}/*.{EXTENSION}", self.root.display());
        let mut names: Vec<String> = glob::glob(&pattern)
            .map_err(|e| JsonTableError::Config(format!("Invalid storage root: {e}")))?
            .filter_map(|r| r.ok())
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        names.sort();
        Ok(names)
    }
}

fn parse_records(path: &Path, content: &str) -> Result<Vec<Record>> {
    let corrupt = |reason: String| JsonTableError::CorruptStorage {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(content).map_err(|e| corrupt(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(corrupt(format!(
                "expected a JSON array, found {}",
                type_name(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(corrupt(format!(
                "element {index} is {}, expected an object",
                type_name(&other)
            ))),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStore, EntityDefinition) {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path().join("json"));
        (tmp, FileStore::new(&config), EntityDefinition::new("UserJson"))
    }

    #[test]
    fn test_path_for_uses_storage_name() {
        let (tmp, store, users) = setup();
        assert_eq!(store.path_for(&users), tmp.path().join("json/userjson.json"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_tmp, store, users) = setup();
        assert!(store.load(&users).unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let (_tmp, store, users) = setup();
        let records: RecordCollection = serde_json::from_value(json!([
            { "id": 1, "name": "a", "tags": ["x", "y"], "meta": { "n": 1.5 } },
            { "id": 2, "name": null, "active": true },
        ]))
        .unwrap();

        store.save(&users, &records).unwrap();
        assert!(store.path_for(&users).exists());
        assert_eq!(store.load(&users).unwrap(), records);
    }

    #[test]
    fn test_save_preserves_field_order() {
        let (_tmp, store, users) = setup();
        let records: RecordCollection =
            serde_json::from_value(json!([{ "id": 1, "name": "x", "email": "e" }])).unwrap();
        store.save(&users, &records).unwrap();

        let raw = std::fs::read_to_string(store.path_for(&users)).unwrap();
        assert_eq!(raw, r#"[{"id":1,"name":"x","email":"e"}]"#);
    }

    #[test]
    fn test_pretty_output() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(&StoreConfig::new(tmp.path()).with_pretty(true));
        let users = EntityDefinition::new("users");
        let records: RecordCollection = serde_json::from_value(json!([{ "id": 1 }])).unwrap();
        store.save(&users, &records).unwrap();

        let raw = std::fs::read_to_string(store.path_for(&users)).unwrap();
        assert!(raw.contains('\n'));
        assert_eq!(store.load(&users).unwrap(), records);
    }

    #[test]
    fn test_corrupt_files_are_reported() {
        let (_tmp, store, users) = setup();
        std::fs::create_dir_all(store.root()).unwrap();

        for content in ["{not json", "", r#"{"id": 1}"#, r#"[{"id": 1}, 2]"#] {
            std::fs::write(store.path_for(&users), content).unwrap();
            let result = store.load(&users);
            assert!(
                matches!(result, Err(JsonTableError::CorruptStorage { .. })),
                "content {content:?} should be corrupt"
            );
        }
    }

    #[test]
    fn test_try_lock_reports_contention() {
        let (_tmp, store, users) = setup();
        let held = store.lock(&users).unwrap();
        assert!(held.is_some());

        let result = store.try_lock(&users);
        assert!(matches!(result, Err(JsonTableError::Locked { .. })));

        drop(held);
        assert!(store.try_lock(&users).is_ok());
    }

    #[test]
    fn test_lock_disabled() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(&StoreConfig::new(tmp.path()).with_locking(false));
        assert!(store.lock(&EntityDefinition::new("users")).unwrap().is_none());
    }

    #[test]
    fn test_entity_files() {
        let (_tmp, store, users) = setup();
        assert!(store.entity_files().unwrap().is_empty());

        store.save(&users, &RecordCollection::new()).unwrap();
        store
            .save(&EntityDefinition::new("Posts"), &RecordCollection::new())
            .unwrap();
        let _lock = store.lock(&users).unwrap();

        assert_eq!(store.entity_files().unwrap(), vec!["posts", "userjson"]);
    }
}
