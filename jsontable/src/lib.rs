//! Embedded table store that keeps each entity as one JSON array file and
//! answers relational-style queries by loading, filtering and rewriting the
//! whole file.
//!
//! Mutations of one entity file are serialised by an optional advisory lock
//! and files are replaced by atomic rename. Readers take no lock, and two
//! handles holding stale copies of a record still race: the last write wins.

pub mod clause;
pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod file_store;
pub mod query;
pub mod record;
pub mod store;

pub use clause::{ClauseSet, Direction, Operator};
pub use collection::RecordCollection;
pub use config::StoreConfig;
pub use entity::{EntityDefinition, Hydratable};
pub use error::{JsonTableError, Result};
pub use file_store::FileStore;
pub use query::{PageRequest, Paginator, Query};
pub use record::Record;
pub use store::{Repository, Store, Table};
