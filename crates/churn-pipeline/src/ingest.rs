//! The upload ingestor: assigns identifiers to inbox rows and folds them into
//! the authoritative dataset.

use std::sync::Arc;

use churn_core::{
  dataset::{Dataset, columns},
  preprocess::impute_means,
  steps::StepRunner,
  store::StateStore,
  table::Table,
};

use crate::{
  Error, Result,
  scheduler::{BatchOutcome, Scheduler},
};

/// How downstream batch processing went after an ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downstream {
  Completed(BatchOutcome),
  /// Logged and otherwise ignored; the ingested rows stay.
  Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
  pub rows:       usize,
  pub first_id:   i64,
  pub last_id:    i64,
  pub downstream: Downstream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
  /// The inbox was absent, empty, or held a header and no rows.
  NothingToDo,
  Ingested(IngestReport),
}

/// Move `userid` to the front, keeping the other columns in order.
fn id_first(table: &Table) -> Table {
  let order: Vec<String> = std::iter::once(columns::USER_ID.to_owned())
    .chain(
      table
        .columns()
        .iter()
        .filter(|c| *c != columns::USER_ID)
        .cloned(),
    )
    .collect();
  table.reordered(&order)
}

pub struct Ingestor<S> {
  store:        Arc<S>,
  base_user_id: i64,
}

impl<S: StateStore> Ingestor<S> {
  pub fn new(store: Arc<S>, base_user_id: i64) -> Self { Self { store, base_user_id } }

  /// Ingest whatever is in the inbox.
  ///
  /// Persists, in order: the authoritative dataset with the new rows, the
  /// inbox with its assigned ids, and the imputed preprocessed batch. Then it
  /// runs `downstream`'s batch processing, whose failure does not undo
  /// anything, and finally truncates the inbox.
  pub async fn ingest<R: StepRunner>(
    &self,
    downstream: &Scheduler<S, R>,
  ) -> Result<IngestOutcome> {
    if !self.store.inbox_pending().await.map_err(Error::store)? {
      tracing::debug!("inbox empty");
      return Ok(IngestOutcome::NothingToDo);
    }
    let inbox = self.store.load_table(Dataset::Inbox).await.map_err(Error::store)?;
    let Some(mut batch) = inbox.filter(|t| !t.is_empty()) else {
      tracing::debug!("inbox has a header but no rows");
      return Ok(IngestOutcome::NothingToDo);
    };

    let existing = self.store.load_table(Dataset::Main).await.map_err(Error::store)?;
    let rows = batch.len();
    let first_id = match existing.as_ref().and_then(|t| t.max_id(columns::USER_ID)) {
      Some(max) => max.checked_add(1),
      None => Some(self.base_user_id),
    };
    let (first_id, last_id) = first_id
      .and_then(|first| {
        let span = i64::try_from(rows).ok()?.checked_sub(1)?;
        Some((first, first.checked_add(span)?))
      })
      .ok_or(Error::IdsExhausted { rows })?;

    // Any ids in the upload are replaced.
    batch.drop_column(columns::STRAY_INDEX);
    batch.drop_column(columns::USER_ID);
    batch.insert_column(
      0,
      columns::USER_ID,
      (first_id..=last_id).map(|id| id.to_string()).collect(),
    )?;

    let main = match existing {
      Some(mut main) if !main.columns().is_empty() => {
        main.drop_column(columns::STRAY_INDEX);
        for column in batch.columns() {
          main.add_column(column, "");
        }
        main.extend_from(&batch);
        main
      }
      _ => batch.clone(),
    };
    self.store.save_table(Dataset::Main, &main).await.map_err(Error::store)?;
    tracing::info!(rows, first_id, last_id, total = main.len(), "rows appended to dataset");

    // Shape the batch like the dataset: its columns in its order, blanks
    // where the upload had nothing.
    let batch = id_first(&batch.reordered(main.columns()));
    self.store.save_table(Dataset::Inbox, &batch).await.map_err(Error::store)?;
    let preprocessed = impute_means(&batch);
    self
      .store
      .save_table(Dataset::PreprocessedBatch, &preprocessed)
      .await
      .map_err(Error::store)?;

    let downstream = match downstream.process_batch().await {
      Ok(outcome) => Downstream::Completed(outcome),
      Err(error) => {
        tracing::error!(%error, "batch processing failed; ingested rows are kept");
        Downstream::Failed {
          reason: error.to_string(),
        }
      }
    };

    self.store.clear_inbox().await.map_err(Error::store)?;
    tracing::info!(rows, first_id, last_id, "upload ingested");

    Ok(IngestOutcome::Ingested(IngestReport {
      rows,
      first_id,
      last_id,
      downstream,
    }))
  }
}

#[cfg(test)]
mod tests {
  use churn_core::{
    counters::Thresholds,
    memory::{Fault, MemoryStore},
    steps::Step,
  };

  use super::*;
  use crate::test_support::{ScriptedRunner, table};

  struct Fixture {
    store:     Arc<MemoryStore>,
    runner:    Arc<ScriptedRunner>,
    ingestor:  Ingestor<MemoryStore>,
    scheduler: Scheduler<MemoryStore, ScriptedRunner>,
  }

  fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(ScriptedRunner::new());
    Fixture {
      ingestor: Ingestor::new(Arc::clone(&store), 2000),
      scheduler: Scheduler::new(Arc::clone(&store), Arc::clone(&runner), Thresholds::default()),
      store,
      runner,
    }
  }

  fn upload() -> Table {
    table(&["Unnamed: 0", "review", "screen", "Day_1"], &[
      &["0", "great app", "4", "500"],
      &["1", "", "", "2"],
      &["2", "slow", "8", "3"],
    ])
  }

  impl Fixture {
    async fn ingest(&self) -> IngestOutcome { self.ingestor.ingest(&self.scheduler).await.unwrap() }
  }

  #[tokio::test]
  async fn empty_inbox_is_nothing_to_do() {
    let f = fixture();
    assert_eq!(f.ingest().await, IngestOutcome::NothingToDo);

    f.store.put_table(Dataset::Inbox, table(&["review"], &[]));
    assert_eq!(f.ingest().await, IngestOutcome::NothingToDo);
    assert!(f.store.table(Dataset::Main).is_none());
    assert!(f.runner.calls().is_empty());
  }

  #[tokio::test]
  async fn first_upload_starts_at_base() {
    let f = fixture();
    f.store.put_table(Dataset::Inbox, upload());

    let IngestOutcome::Ingested(report) = f.ingest().await else {
      panic!("upload should be ingested");
    };
    assert_eq!((report.first_id, report.last_id, report.rows), (2000, 2002, 3));

    let main = f.store.table(Dataset::Main).unwrap();
    assert_eq!(main.ids("userid").collect::<Vec<_>>(), [2000, 2001, 2002]);
    assert_eq!(main.columns()[0], "userid");

    // the preprocessed batch was imputed before it went downstream
    let batch = f.store.table(Dataset::PreprocessedBatch).unwrap();
    assert_eq!(batch.column("screen").unwrap().collect::<Vec<_>>(), ["4", "6", "8"]);

    assert_eq!(f.store.counters().model_a, 3);
    assert_eq!(f.store.counters().model_b, 2);
    assert!(f.store.table(Dataset::Inbox).is_none());
    assert_eq!(f.runner.calls(), vec![Step::Predict, Step::Explain, Step::Insights]);
  }

  #[tokio::test]
  async fn ids_continue_after_existing_maximum() {
    let f = fixture();
    f.store.put_table(
      Dataset::Main,
      table(&["Unnamed: 0", "userid", "screen"], &[&["0", "2000", "1"], &[
        "1", "2041.0", "2",
      ]]),
    );
    f.store.put_table(Dataset::Inbox, upload());

    let IngestOutcome::Ingested(report) = f.ingest().await else {
      panic!("upload should be ingested");
    };
    assert_eq!(report.first_id, 2042);

    let main = f.store.table(Dataset::Main).unwrap();
    assert!(!main.has_column("Unnamed: 0"));
    assert_eq!(main.len(), 5);
    // columns only the upload had are appended and back-filled
    assert_eq!(main.column("review").unwrap().collect::<Vec<_>>(), [
      "",
      "",
      "great app",
      "",
      "slow"
    ]);
  }

  #[tokio::test]
  async fn unlabeled_upload_stays_blank_in_training_table() {
    let f = fixture();
    let labeled = table(&["userid", "is_churned", "screen"], &[&["2000", "1", "3"]]);
    f.store.put_table(Dataset::Main, labeled.clone());
    f.store.put_table(Dataset::ModelATrain, labeled);
    f.store.put_table(Dataset::Inbox, table(&["screen"], &[&["5"]]));

    f.ingest().await;

    // the batch carries every dataset column, in dataset order
    let batch = f.store.table(Dataset::PreprocessedBatch).unwrap();
    assert_eq!(batch.columns(), ["userid", "is_churned", "screen"]);
    let training = f.store.table(Dataset::ModelATrain).unwrap();
    assert_eq!(training.rows(), [
      vec!["2000".to_owned(), "1".to_owned(), "3".to_owned()],
      vec!["2001".to_owned(), String::new(), "5".to_owned()],
    ]);
  }

  #[tokio::test]
  async fn batch_only_columns_follow_dataset_columns() {
    let f = fixture();
    f.store.put_table(
      Dataset::Main,
      table(&["screen", "userid", "city"], &[&["1", "2000", "Oslo"]]),
    );
    f.store.put_table(Dataset::Inbox, table(&["review", "screen"], &[&["ok", "2"]]));

    f.ingest().await;

    let batch = f.store.table(Dataset::PreprocessedBatch).unwrap();
    assert_eq!(batch.columns(), ["userid", "screen", "city", "review"]);
    assert_eq!(batch.rows()[0], ["2001", "2", "", "ok"]);
  }

  #[tokio::test]
  async fn exhausted_id_space_is_an_error() {
    let f = fixture();
    let near_max = (i64::MAX - 1).to_string();
    f.store.put_table(Dataset::Main, table(&["userid"], &[&[near_max.as_str()]]));
    f.store.put_table(Dataset::Inbox, upload());

    let err = f.ingestor.ingest(&f.scheduler).await.unwrap_err();
    assert!(matches!(err, Error::IdsExhausted { rows: 3 }));
    assert_eq!(f.store.table(Dataset::Inbox), Some(upload()));
    assert_eq!(f.store.table(Dataset::Main).unwrap().len(), 1);
  }

  #[tokio::test]
  async fn uploaded_ids_are_replaced() {
    let f = fixture();
    f.store.put_table(Dataset::Inbox, table(&["userid", "screen"], &[&["7", "1"], &["7", "2"]]));

    f.ingest().await;
    let main = f.store.table(Dataset::Main).unwrap();
    assert_eq!(main.ids("userid").collect::<Vec<_>>(), [2000, 2001]);
  }

  #[tokio::test]
  async fn ids_stay_monotonic_across_batches() {
    let f = fixture();
    let mut seen = Vec::new();
    for _ in 0..3 {
      f.store.put_table(Dataset::Inbox, upload());
      let IngestOutcome::Ingested(report) = f.ingest().await else {
        panic!("upload should be ingested");
      };
      seen.push((report.first_id, report.last_id));
    }
    assert_eq!(seen, [(2000, 2002), (2003, 2005), (2006, 2008)]);
    // re-ingesting an emptied inbox adds nothing
    assert_eq!(f.ingest().await, IngestOutcome::NothingToDo);
    assert_eq!(f.store.table(Dataset::Main).unwrap().len(), 9);
  }

  #[tokio::test]
  async fn downstream_failure_still_clears_inbox() {
    let f = fixture();
    f.store.inject(Fault::SaveCounters);
    f.store.put_table(Dataset::Inbox, upload());

    let IngestOutcome::Ingested(report) = f.ingest().await else {
      panic!("upload should be ingested");
    };
    assert!(matches!(report.downstream, Downstream::Failed { .. }));
    assert_eq!(f.store.table(Dataset::Main).unwrap().len(), 3);
    assert!(f.store.table(Dataset::Inbox).is_none());
  }

  #[tokio::test]
  async fn failed_dataset_write_keeps_inbox() {
    let f = fixture();
    f.store.inject(Fault::SaveTable(Dataset::Main));
    f.store.put_table(Dataset::Inbox, upload());

    assert!(f.ingestor.ingest(&f.scheduler).await.is_err());
    assert_eq!(f.store.table(Dataset::Inbox), Some(upload()));
    assert!(f.store.table(Dataset::PreprocessedBatch).is_none());
  }
}
