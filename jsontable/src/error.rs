use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JsonTableError {
    #[error("Corrupt storage file {path}: {reason}")]
    CorruptStorage { path: PathBuf, reason: String },

    #[error("Record not found: {entity}/{id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate primary key: {entity}/{id}")]
    DuplicateKey { entity: String, id: String },

    #[error("No primary key left above {max} on entity '{entity}'")]
    KeyExhausted { entity: String, max: String },

    #[error("No primary key defined on entity '{entity}'")]
    MissingPrimaryKey { entity: String },

    #[error("Cannot aggregate column '{column}': {reason}")]
    AggregationType { column: String, reason: String },

    #[error("Unknown operator: {0}")]
    InvalidOperator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage file is locked: {path}")]
    Locked { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl JsonTableError {
    pub(crate) fn not_found(entity: &str, id: &serde_json::Value) -> Self {
        JsonTableError::NotFound {
            entity: entity.to_string(),
            id: render_id(id),
        }
    }

    pub(crate) fn duplicate_key(entity: &str, id: &serde_json::Value) -> Self {
        JsonTableError::DuplicateKey {
            entity: entity.to_string(),
            id: render_id(id),
        }
    }
}

fn render_id(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, JsonTableError>;
