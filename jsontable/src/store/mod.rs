use crate::clause::{Direction, OrderClause};
use crate::collection::RecordCollection;
use crate::config::StoreConfig;
use crate::entity::{fresh_timestamp, EntityDefinition, Hydratable, CREATED_AT, UPDATED_AT};
use crate::error::{JsonTableError, Result};
use crate::file_store::FileStore;
use crate::query::Query;
use crate::record::{field, has_value, values_equal, Record};
use serde_json::Value;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "jsontable.yaml";

/// The main entry point for jsontable.
/// Holds the configuration and the file store, and hands out per-entity
/// handles for queries and mutations.
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    files: FileStore,
}

impl Store {
    /// Open a store with an explicit configuration. The storage root is
    /// created lazily on the first write.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let root = &config.storage_root;
        if root.exists() && !root.is_dir() {
            return Err(JsonTableError::Config(format!(
                "Storage root is not a directory: {}",
                root.display()
            )));
        }
        let files = FileStore::new(&config);
        log::debug!("Opened store at {}", root.display());
        Ok(Store { config, files })
    }

    /// Open from a path: a config file, or a directory that either contains
    /// `jsontable.yaml` or is itself the storage root.
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = if path.is_file() {
            StoreConfig::load(path)?
        } else if path.join(CONFIG_FILE).is_file() {
            StoreConfig::load(&path.join(CONFIG_FILE))?
        } else {
            StoreConfig::new(PathBuf::from(path))
        };
        Self::open(config)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        self.files.root()
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Handle for an entity by name, using its configured definition if any.
    pub fn table(&self, name: &str) -> Table<'_> {
        self.table_for(self.config.entity(name))
    }

    pub fn table_for(&self, definition: EntityDefinition) -> Table<'_> {
        Table {
            store: self,
            definition,
        }
    }

    /// Typed handle for a host record type.
    pub fn repository<H: Hydratable>(&self) -> Repository<'_, H> {
        Repository {
            table: self.table_for(H::definition()),
            _marker: PhantomData,
        }
    }

    /// Storage names of the entity files currently on disk.
    pub fn entities(&self) -> Result<Vec<String>> {
        self.files.entity_files()
    }
}

/// A handle to one entity file within a store.
/// Every call re-reads the file; mutations rewrite it whole.
#[derive(Debug, Clone)]
pub struct Table<'a> {
    store: &'a Store,
    definition: EntityDefinition,
}

impl<'a> Table<'a> {
    pub fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    pub fn path(&self) -> PathBuf {
        self.store.files.path_for(&self.definition)
    }

    /// Start a new query with no clauses.
    pub fn query(&self) -> Query<'a> {
        Query::new(
            &self.store.files,
            self.definition.clone(),
            self.store.config.per_page,
        )
    }

    pub fn all(&self) -> Result<RecordCollection> {
        self.query().get()
    }

    /// The record without its hidden fields, for presentation.
    pub fn visible(&self, record: &Record) -> Record {
        self.definition.visible(record)
    }

    /// Whether the record already has a primary key value.
    pub fn is_persisted(&self, record: &Record) -> bool {
        self.definition
            .primary_key_name()
            .map(|key| has_value(record, key))
            .unwrap_or(false)
    }

    /// Create when the record has no primary key value yet, update otherwise.
    pub fn save(&self, record: &mut Record) -> Result<()> {
        if self.is_persisted(record) {
            self.update(record)
        } else {
            self.create(record)
        }
    }

    /// Append a new record, assigning the next primary key when it has none.
    /// A caller-supplied key that is already stored is refused.
    pub fn create(&self, record: &mut Record) -> Result<()> {
        let files = &self.store.files;
        let _lock = files.lock(&self.definition)?;
        let mut records = files.load(&self.definition)?;

        if let Some(key) = self.definition.primary_key_name() {
            let id = field(record, key);
            if id.is_null() {
                let next = next_key(&records, key).ok_or_else(|| {
                    JsonTableError::KeyExhausted {
                        entity: self.definition.name.clone(),
                        max: records
                            .max_number(key)
                            .map(|n| n.to_string())
                            .unwrap_or_default(),
                    }
                })?;
                assign_key(record, key, next);
            } else if records.iter().any(|r| values_equal(field(r, key), id)) {
                return Err(JsonTableError::duplicate_key(&self.definition.name, id));
            }
        }

        if self.definition.timestamps {
            let now = fresh_timestamp();
            record.insert(CREATED_AT.to_string(), Value::String(now.clone()));
            record.insert(UPDATED_AT.to_string(), Value::String(now));
        }

        records.push(record.clone());
        files.save(&self.definition, &records)?;

        log::info!(
            "Created {} record {}",
            self.definition.name,
            self.describe_key(record)
        );
        Ok(())
    }

    /// Replace the stored version of a persisted record and reload it from
    /// disk. The stored creation time always wins over the in-memory one.
    pub fn update(&self, record: &mut Record) -> Result<()> {
        let key = self.require_key()?.to_string();
        let id = field(record, &key).clone();
        if id.is_null() {
            return Err(JsonTableError::not_found(&self.definition.name, &id));
        }

        let files = &self.store.files;
        let _lock = files.lock(&self.definition)?;
        let records = files.load(&self.definition)?;

        if self.definition.timestamps {
            let previous = records
                .iter()
                .find(|r| values_equal(field(r, &key), &id));
            if let Some(created) = previous.and_then(|r| r.get(CREATED_AT)) {
                record.insert(CREATED_AT.to_string(), created.clone());
            }
            record.insert(UPDATED_AT.to_string(), Value::String(fresh_timestamp()));
        }

        let mut records = records.remove_where(&key, &id);
        records.push(record.clone());
        let records = records.sort_by(&OrderClause {
            column: key.clone(),
            direction: Direction::Asc,
        });
        files.save(&self.definition, &records)?;

        *record = self.query().find_or_fail(id)?;
        log::info!(
            "Updated {} record {}",
            self.definition.name,
            self.describe_key(record)
        );
        Ok(())
    }

    /// Merge `changes` into the record, then save it.
    pub fn update_with(&self, record: &mut Record, changes: Record) -> Result<()> {
        for (column, value) in changes {
            record.insert(column, value);
        }
        self.save(record)
    }

    /// Remove the record from its file. Succeeds whether or not it was still
    /// stored; the flag tells which.
    pub fn delete(&self, record: &Record) -> Result<bool> {
        let key = self.require_key()?;
        let id = field(record, key).clone();
        self.delete_by_key(&id)
    }

    /// Remove the record whose primary key equals `id`.
    pub fn destroy(&self, id: impl Into<Value>) -> Result<bool> {
        self.delete_by_key(&id.into())
    }

    fn delete_by_key(&self, id: &Value) -> Result<bool> {
        let key = self.require_key()?;
        let files = &self.store.files;
        let _lock = files.lock(&self.definition)?;
        let records = files.load(&self.definition)?;

        let before = records.len();
        let remaining = records.remove_where(key, id);
        let removed = remaining.len() != before;
        if removed {
            files.save(&self.definition, &remaining)?;
            log::info!("Deleted {} record {}", self.definition.name, id);
        } else {
            log::debug!("{} record {} already absent", self.definition.name, id);
        }
        Ok(removed)
    }

    fn require_key(&self) -> Result<&str> {
        self.definition
            .primary_key_name()
            .ok_or_else(|| JsonTableError::MissingPrimaryKey {
                entity: self.definition.name.clone(),
            })
    }

    fn describe_key(&self, record: &Record) -> String {
        match self.definition.primary_key_name() {
            Some(key) => field(record, key).to_string(),
            None => "(no key)".to_string(),
        }
    }
}

/// `1 + max(existing keys)`, or 1 when no numeric key exists. Holes left by
/// deletions are never reused. `None` once no larger integer key fits.
fn next_key(records: &RecordCollection, key: &str) -> Option<Value> {
    let Some(max) = records.max_number(key) else {
        return Some(Value::from(1));
    };
    if let Some(i) = max.as_i64() {
        return match i.checked_add(1) {
            Some(next) => Some(Value::from(next)),
            None => Some(Value::from(i as u64 + 1)),
        };
    }
    if let Some(u) = max.as_u64() {
        return u.checked_add(1).map(Value::from);
    }
    let next = max.as_f64()?.floor() + 1.0;
    // past 2^63 a float no longer maps onto a distinct larger integer key
    (next < i64::MAX as f64).then(|| Value::from(next as i64))
}

/// Put the key first, the way freshly created records are laid out on disk.
fn assign_key(record: &mut Record, key: &str, value: Value) {
    let previous = std::mem::take(record);
    record.insert(key.to_string(), value);
    for (column, v) in previous {
        if column != key {
            record.insert(column, v);
        }
    }
}

/// Typed view of a table: results are hydrated into `H`.
#[derive(Debug, Clone)]
pub struct Repository<'a, H> {
    table: Table<'a>,
    _marker: PhantomData<H>,
}

impl<'a, H: Hydratable> Repository<'a, H> {
    pub fn table(&self) -> &Table<'a> {
        &self.table
    }

    pub fn query(&self) -> Query<'a> {
        self.table.query()
    }

    pub fn all(&self) -> Result<Vec<H>> {
        self.table.all()?.hydrate()
    }

    pub fn get(&self, query: Query<'_>) -> Result<Vec<H>> {
        query.get()?.hydrate()
    }

    pub fn first(&self, query: Query<'_>) -> Result<Option<H>> {
        query.first()?.map(H::hydrate).transpose()
    }

    pub fn find(&self, id: impl Into<Value>) -> Result<Option<H>> {
        self.query().find(id)?.map(H::hydrate).transpose()
    }

    pub fn find_or_fail(&self, id: impl Into<Value>) -> Result<H> {
        H::hydrate(self.query().find_or_fail(id)?)
    }

    /// Persist the model and replace it with what was written.
    pub fn save(&self, model: &mut H) -> Result<()> {
        let mut attributes = model.attributes()?;
        self.table.save(&mut attributes)?;
        *model = H::hydrate(attributes)?;
        Ok(())
    }

    pub fn update(&self, model: &mut H, changes: Record) -> Result<()> {
        let mut attributes = model.attributes()?;
        self.table.update_with(&mut attributes, changes)?;
        *model = H::hydrate(attributes)?;
        Ok(())
    }

    pub fn delete(&self, model: &H) -> Result<bool> {
        self.table.delete(&model.attributes()?)
    }
}
