//! Error type for `churn-pipeline`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("core error: {0}")]
  Core(#[from] churn_core::Error),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("authoritative dataset is missing")]
  MissingMainDataset,

  #[error("column {0:?} is missing from the authoritative dataset")]
  MissingColumn(&'static str),

  #[error("no room left in the identifier space for {rows} new rows")]
  IdsExhausted { rows: usize },
}

impl Error {
  /// Box a backend error. Used as `.map_err(Error::store)`.
  pub fn store<E>(error: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(error))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
