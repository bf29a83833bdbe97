//! Error types for `churn-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("key column {0:?} is missing")]
  MissingKeyColumn(String),

  #[error("row {row} has {found} cells, expected {expected}")]
  RaggedRow {
    row:      usize,
    expected: usize,
    found:    usize,
  },

  #[error("artifact already exists: {0}")]
  ArtifactExists(String),

  #[error("artifact not found: {0}")]
  ArtifactNotFound(String),

  /// A fault injected into the in-memory store.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
