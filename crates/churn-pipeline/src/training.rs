//! Merging a batch into a training table, with the fallback-file policy.

use churn_core::{
  dataset::{Dataset, columns},
  merge::merge,
  store::StateStore,
  table::Table,
};

use crate::{Error, Result};

/// How a merge into a training table ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
  /// The table now holds `rows` rows.
  Merged { rows: usize },
  /// The merge failed; the batch was written to `fallback` instead and the
  /// table is unchanged.
  Degraded { fallback: String, reason: String },
}

impl MergeOutcome {
  pub fn is_degraded(&self) -> bool { matches!(self, Self::Degraded { .. }) }
}

/// Merge `batch` into `dataset` keyed on the user id.
///
/// Any failure to read, merge or write the table is absorbed: the batch goes
/// to a fallback file and the result is [`MergeOutcome::Degraded`]. Only a
/// failure to write the fallback itself is an error.
pub async fn merge_into<S: StateStore>(
  store: &S,
  dataset: Dataset,
  batch: &Table,
) -> Result<MergeOutcome> {
  let attempt = async {
    let existing = store.load_table(dataset).await.map_err(Error::store)?;
    let merged = merge(existing.as_ref(), batch, columns::USER_ID)?;
    store.save_table(dataset, &merged).await.map_err(Error::store)?;
    Ok::<_, Error>(merged.len())
  };

  match attempt.await {
    Ok(rows) => {
      tracing::info!(%dataset, rows, batch = batch.len(), "training table merged");
      Ok(MergeOutcome::Merged { rows })
    }
    Err(error) => {
      let fallback = store.save_fallback(dataset, batch).await.map_err(Error::store)?;
      tracing::warn!(%dataset, %error, %fallback, "merge failed; batch saved to fallback file");
      Ok(MergeOutcome::Degraded {
        fallback,
        reason: error.to_string(),
      })
    }
  }
}
