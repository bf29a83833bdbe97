//! Error type for `churn-store-fs`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] churn_core::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("could not replace file: {0}")]
  Persist(#[from] tempfile::PersistError),

  #[error("blocking task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  /// A rename would have overwritten an existing artifact.
  #[error("artifact already exists: {}", .0.display())]
  ArtifactExists(PathBuf),

  #[error("artifact not found: {}", .0.display())]
  ArtifactNotFound(PathBuf),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
