//! Error types for storage and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the partitioned store, the archiver and the cache.
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet encoding or decoding error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow batch construction error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A partition file decoded but does not match the paper schema
    #[error("Corrupt partition {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Fatal startup configuration problems.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("OPENAI_API_KEY must be set when AI translation is enabled")]
    TranslationKeyMissing,
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
