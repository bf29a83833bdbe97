//! The `StateStore` trait: every piece of persisted pipeline state.
//!
//! The trait is implemented by `churn-store-fs` (flat files) and by
//! [`MemoryStore`](crate::memory::MemoryStore) (tests). The ingestor,
//! scheduler and reindexer receive a store instead of touching files, so they
//! can be exercised without a filesystem.
//!
//! Implementations must make each `save_*` whole-value-then-replace: a failed
//! save leaves the previous value intact.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
  counters::Counters,
  dataset::{ArtifactKind, ArtifactName, Dataset},
  table::Table,
};

/// What a [`StateStore::backup`] call copied, and where to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
  pub location: String,
  pub files:    usize,
}

/// Abstraction over the pipeline's persisted state.
pub trait StateStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Tables ───────────────────────────────────────────────────────────

  /// Load a table. Returns `None` if it does not exist or is zero-sized; a
  /// header-only table comes back as an empty [`Table`].
  fn load_table(
    &self,
    dataset: Dataset,
  ) -> impl Future<Output = Result<Option<Table>, Self::Error>> + Send + '_;

  /// Replace a table atomically.
  fn save_table<'a>(
    &'a self,
    dataset: Dataset,
    table: &'a Table,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Write `table` beside `dataset` under a fresh, never-reused name. Used
  /// when merging into `dataset` failed. Returns where it went.
  fn save_fallback<'a>(
    &'a self,
    dataset: Dataset,
    table: &'a Table,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  // ── Inbox and archive ────────────────────────────────────────────────

  /// Whether the inbox exists and is non-empty.
  fn inbox_pending(
    &self,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Truncate the inbox.
  fn clear_inbox(&self)
  -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Copy the preprocessed batch into the archive under a name derived from
  /// `at`. Returns the archive location, or `None` if there was no batch.
  fn archive_batch(
    &self,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  // ── Counters ─────────────────────────────────────────────────────────

  /// Load the counters; a store with none yet returns the default record.
  fn load_counters(
    &self,
  ) -> impl Future<Output = Result<Counters, Self::Error>> + Send + '_;

  fn save_counters<'a>(
    &'a self,
    counters: &'a Counters,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Artifacts ────────────────────────────────────────────────────────

  /// Every artifact of `kind`, staged ones included.
  fn list_artifacts(
    &self,
    kind: ArtifactKind,
  ) -> impl Future<Output = Result<Vec<ArtifactName>, Self::Error>> + Send + '_;

  fn read_explanation(
    &self,
    name: ArtifactName,
  ) -> impl Future<Output = Result<Value, Self::Error>> + Send + '_;

  /// Rewrite an explanation in place, atomically.
  fn write_explanation<'a>(
    &'a self,
    name: ArtifactName,
    body: &'a Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Rename an artifact. Must refuse, without touching either file, when
  /// `to` already exists.
  fn rename_artifact(
    &self,
    from: ArtifactName,
    to: ArtifactName,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Backups ──────────────────────────────────────────────────────────

  /// Copy every reindexable table and every artifact into a backup named
  /// after `label`.
  fn backup<'a>(
    &'a self,
    label: &'a str,
  ) -> impl Future<Output = Result<Backup, Self::Error>> + Send + 'a;
}
