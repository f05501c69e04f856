//! Error types for the pillbox_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pillbox_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage operation against a collection that setup never created
    #[error("storage not initialized for collection '{0}'")]
    NotInitialized(String),

    /// Insert with a colliding id; use an upsert when overwrite is intended
    #[error("duplicate key '{key}' in collection '{collection}'")]
    DuplicateKey { collection: String, key: String },

    /// Import document missing a required top-level array
    #[error("malformed import document: {0}")]
    MalformedImport(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
