//! The retrain scheduler: batch processing, threshold checks, training and
//! downstream refresh.
//!
//! Each model moves through [`RetrainState`]s. A model's counter grows with
//! every merged batch; once it reaches the threshold the model is trained, and
//! only a successful training resets the counter.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use churn_core::{
  counters::{Counters, ModelKind, Thresholds},
  dataset::Dataset,
  preprocess::{DAY_USAGE_CAP, clip_day_columns, split_for_models},
  steps::{Step, StepOutcome, StepRunner},
  store::StateStore,
};
use crate::{
  Error, Result,
  training::{MergeOutcome, merge_into},
};

// ─── States and outcomes ──────────────────────────────────────────────────────

/// Where a model is in its retrain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetrainState {
  #[default]
  Idle,
  /// The counter reached the threshold; the training table is being checked.
  ThresholdReached,
  /// A training step is in flight.
  Training,
  /// Training succeeded; the counter is being reset.
  Cooldown,
}

/// Why a due retrain was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  MissingTable,
  EmptyTable,
}

/// The result of one [`Scheduler::retrain`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrainOutcome {
  NotDue { count: u64, threshold: u64 },
  Skipped(SkipReason),
  /// Another call is already retraining this model.
  AlreadyRunning,
  Trained,
  /// The training step failed; the counter was left alone.
  Failed(StepOutcome),
  /// A store error cut the retrain short. The error itself is returned
  /// once the rest of the cycle has run.
  Aborted { reason: String },
}

impl RetrainOutcome {
  /// Whether a training step was actually run.
  pub fn attempted(&self) -> bool { matches!(self, Self::Trained | Self::Failed(_)) }
}

/// Outcome of regenerating predictions, explanations and the business
/// summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
  pub predictions:  StepOutcome,
  pub explanations: StepOutcome,
  pub insights:     StepOutcome,
}

/// What one threshold check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
  pub retrains: Vec<(ModelKind, RetrainOutcome)>,
  /// Present when a retrain was attempted.
  pub refresh:  Option<RefreshReport>,
}

impl CheckReport {
  pub fn outcome(&self, model: ModelKind) -> Option<&RetrainOutcome> {
    self.retrains.iter().find(|(m, _)| *m == model).map(|(_, o)| o)
  }
}

/// What processing one preprocessed batch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
  pub rows:         usize,
  pub with_reviews: usize,
  pub model_a:      MergeOutcome,
  pub model_b:      MergeOutcome,
  /// Counters as persisted after this batch, before any reset.
  pub counters:     Counters,
  pub retrains:     Vec<(ModelKind, RetrainOutcome)>,
  pub refresh:      RefreshReport,
  pub archive:      Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
  /// The preprocessed batch was missing or had no rows.
  NoBatch,
  Processed(Box<BatchReport>),
}

// ─── Scheduler ────────────────────────────────────────────────────────────────

pub struct Scheduler<S, R> {
  store:      Arc<S>,
  runner:     Arc<R>,
  thresholds: Thresholds,
  states:     Mutex<HashMap<ModelKind, RetrainState>>,
}

/// Returns the model to [`RetrainState::Idle`] however the retrain ends,
/// including when its future is dropped.
struct Claim<'a> {
  states: &'a Mutex<HashMap<ModelKind, RetrainState>>,
  model:  ModelKind,
}

impl Claim<'_> {
  fn advance(&self, state: RetrainState) { lock(self.states).insert(self.model, state); }
}

impl Drop for Claim<'_> {
  fn drop(&mut self) { lock(self.states).insert(self.model, RetrainState::Idle); }
}

fn lock(
  states: &Mutex<HashMap<ModelKind, RetrainState>>,
) -> MutexGuard<'_, HashMap<ModelKind, RetrainState>> {
  states.lock().unwrap_or_else(|e| e.into_inner())
}

impl<S: StateStore, R: StepRunner> Scheduler<S, R> {
  pub fn new(store: Arc<S>, runner: Arc<R>, thresholds: Thresholds) -> Self {
    Self {
      store,
      runner,
      thresholds,
      states: Mutex::new(HashMap::new()),
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn thresholds(&self) -> Thresholds { self.thresholds }

  pub fn state(&self, model: ModelKind) -> RetrainState {
    lock(&self.states).get(&model).copied().unwrap_or_default()
  }

  /// Move `model` from idle to [`RetrainState::ThresholdReached`], or return
  /// `None` if another call holds it.
  fn claim(&self, model: ModelKind) -> Option<Claim<'_>> {
    let mut states = lock(&self.states);
    let state = states.entry(model).or_default();
    if *state != RetrainState::Idle {
      return None;
    }
    *state = RetrainState::ThresholdReached;
    Some(Claim {
      states: &self.states,
      model,
    })
  }

  // ── Retraining ─────────────────────────────────────────────────────────

  /// Train `model` if its counter has reached the threshold.
  ///
  /// Training failures and skips are outcomes, not errors; only store
  /// failures are errors.
  pub async fn retrain(&self, model: ModelKind) -> Result<RetrainOutcome> {
    let counters = self.store.load_counters().await.map_err(Error::store)?;
    let count = counters.get(model);
    let threshold = self.thresholds.get(model);
    if count < threshold {
      tracing::debug!(%model, count, threshold, "retrain not due");
      return Ok(RetrainOutcome::NotDue { count, threshold });
    }

    let Some(claim) = self.claim(model) else {
      tracing::info!(%model, "retrain already running");
      return Ok(RetrainOutcome::AlreadyRunning);
    };
    tracing::info!(%model, count, threshold, "retrain threshold reached");

    let dataset = Dataset::training_table(model);
    let reason = match self.store.load_table(dataset).await.map_err(Error::store)? {
      None => Some(SkipReason::MissingTable),
      Some(table) if table.is_empty() => Some(SkipReason::EmptyTable),
      Some(_) => None,
    };
    if let Some(reason) = reason {
      tracing::warn!(%model, %dataset, ?reason, "training table unusable; retrain skipped");
      return Ok(RetrainOutcome::Skipped(reason));
    }

    claim.advance(RetrainState::Training);
    let outcome = self.runner.run(Step::Train(model)).await;
    if !outcome.is_success() {
      tracing::error!(%model, %outcome, "training failed; counter kept");
      return Ok(RetrainOutcome::Failed(outcome));
    }

    claim.advance(RetrainState::Cooldown);
    let mut counters = self.store.load_counters().await.map_err(Error::store)?;
    counters.reset(model, Utc::now());
    self.store.save_counters(&counters).await.map_err(Error::store)?;
    tracing::info!(%model, "model retrained; counter reset");
    Ok(RetrainOutcome::Trained)
  }

  /// Retrain model A then model B. A store error on one model is recorded
  /// as [`RetrainOutcome::Aborted`] and the other model is still checked;
  /// the first such error is handed back to the caller.
  async fn retrain_all(&self) -> (Vec<(ModelKind, RetrainOutcome)>, Option<Error>) {
    let mut retrains = Vec::with_capacity(ModelKind::ALL.len());
    let mut first_error = None;
    for model in ModelKind::ALL {
      let outcome = match self.retrain(model).await {
        Ok(outcome) => outcome,
        Err(error) => {
          tracing::error!(%model, %error, "retrain aborted by store error");
          let outcome = RetrainOutcome::Aborted {
            reason: error.to_string(),
          };
          first_error.get_or_insert(error);
          outcome
        }
      };
      retrains.push((model, outcome));
    }
    (retrains, first_error)
  }

  /// Check model A then model B, and refresh if either was trained (or
  /// tried to be). A store error from either retrain is returned after the
  /// refresh has run.
  pub async fn check_and_retrain(&self) -> Result<CheckReport> {
    let (retrains, error) = self.retrain_all().await;
    let refresh = if retrains.iter().any(|(_, o)| o.attempted()) {
      Some(self.refresh().await)
    } else {
      None
    };
    match error {
      Some(error) => Err(error),
      None => Ok(CheckReport { retrains, refresh }),
    }
  }

  /// Regenerate predictions, then explanations and charts for every user,
  /// then the business-facing summary. Each step runs whatever happened to
  /// the ones before it.
  pub async fn refresh(&self) -> RefreshReport {
    let predictions = self.runner.run(Step::Predict).await;
    if !predictions.is_success() {
      tracing::error!(outcome = %predictions, "prediction refresh failed");
    }
    let explanations = self.runner.run(Step::Explain).await;
    if !explanations.is_success() {
      tracing::error!(outcome = %explanations, "explanation refresh failed");
    }
    let insights = self.runner.run(Step::Insights).await;
    if !insights.is_success() {
      tracing::error!(outcome = %insights, "insight refresh failed");
    }
    RefreshReport {
      predictions,
      explanations,
      insights,
    }
  }

  // ── Batches ────────────────────────────────────────────────────────────

  /// Fold the preprocessed batch into both training tables, advance the
  /// counters, retrain what is due, refresh, and archive the batch.
  ///
  /// Once the counters are saved the refresh and the archive always run; a
  /// store error from a retrain or the archive is returned afterwards.
  pub async fn process_batch(&self) -> Result<BatchOutcome> {
    let batch = self
      .store
      .load_table(Dataset::PreprocessedBatch)
      .await
      .map_err(Error::store)?;
    let Some(mut batch) = batch.filter(|t| !t.is_empty()) else {
      tracing::info!("no preprocessed batch to process");
      return Ok(BatchOutcome::NoBatch);
    };

    clip_day_columns(&mut batch, DAY_USAGE_CAP);
    let split = split_for_models(&batch);
    let model_a = merge_into(&*self.store, Dataset::ModelATrain, &split.model_a).await?;
    let model_b = merge_into(&*self.store, Dataset::ModelBTrain, &split.model_b).await?;

    let mut counters = self.store.load_counters().await.map_err(Error::store)?;
    counters.add(ModelKind::A, split.total() as u64);
    counters.add(ModelKind::B, split.with_reviews() as u64);
    self.store.save_counters(&counters).await.map_err(Error::store)?;
    tracing::info!(
      rows = split.total(),
      with_reviews = split.with_reviews(),
      model_a = counters.model_a,
      model_b = counters.model_b,
      "counters updated"
    );

    let (retrains, retrain_error) = self.retrain_all().await;
    let refresh = self.refresh().await;
    let archive = self.store.archive_batch(Utc::now()).await.map_err(Error::store);
    if let Some(error) = retrain_error {
      if let Err(archive_error) = &archive {
        tracing::error!(error = %archive_error, "batch archive failed");
      }
      return Err(error);
    }
    let archive = archive?;

    Ok(BatchOutcome::Processed(Box::new(BatchReport {
      rows: split.total(),
      with_reviews: split.with_reviews(),
      model_a,
      model_b,
      counters,
      retrains,
      refresh,
      archive,
    })))
  }
}
