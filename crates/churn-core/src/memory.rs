//! [`MemoryStore`]: an in-memory [`StateStore`] for tests.
//!
//! Besides holding state it can be told to fail specific operations
//! ([`Fault`]), which is how the degraded paths of the pipeline get exercised.

use std::{
  collections::{BTreeMap, HashSet},
  future::{Future, ready},
  sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
  Error, Result,
  counters::Counters,
  dataset::{ArtifactKind, ArtifactName, Dataset},
  store::{Backup, StateStore},
  table::Table,
};

/// An operation the store can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
  LoadTable(Dataset),
  SaveTable(Dataset),
  SaveFallback,
  SaveCounters,
  ClearInbox,
  Archive,
  RenameArtifact,
  Backup,
}

/// A point-in-time copy taken by [`StateStore::backup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
  pub label:     String,
  pub tables:    BTreeMap<Dataset, Table>,
  pub artifacts: BTreeMap<ArtifactName, Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
  tables:    BTreeMap<Dataset, Table>,
  counters:  Option<Counters>,
  fallbacks: Vec<(Dataset, Table)>,
  archives:  Vec<(DateTime<Utc>, Table)>,
  artifacts: BTreeMap<ArtifactName, Vec<u8>>,
  backups:   Vec<Snapshot>,
  faults:    HashSet<Fault>,
}

/// All state in one mutex. Cheap to create; not shared between tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
  state: Mutex<State>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, State> {
    // Poisoned only when a test already panicked.
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn check(state: &State, fault: Fault) -> Result<()> {
    if state.faults.contains(&fault) {
      Err(Error::Unavailable(format!("{fault:?}")))
    } else {
      Ok(())
    }
  }

  // ── Test setup and inspection ─────────────────────────────────────────

  pub fn inject(&self, fault: Fault) { self.lock().faults.insert(fault); }

  pub fn heal(&self, fault: Fault) { self.lock().faults.remove(&fault); }

  pub fn put_table(&self, dataset: Dataset, table: Table) {
    self.lock().tables.insert(dataset, table);
  }

  pub fn table(&self, dataset: Dataset) -> Option<Table> {
    self.lock().tables.get(&dataset).cloned()
  }

  pub fn put_counters(&self, counters: Counters) {
    self.lock().counters = Some(counters);
  }

  pub fn counters(&self) -> Counters {
    self.lock().counters.clone().unwrap_or_default()
  }

  pub fn fallbacks(&self) -> Vec<(Dataset, Table)> {
    self.lock().fallbacks.clone()
  }

  pub fn archives(&self) -> Vec<Table> {
    self.lock().archives.iter().map(|(_, t)| t.clone()).collect()
  }

  pub fn put_artifact(&self, name: ArtifactName, bytes: Vec<u8>) {
    self.lock().artifacts.insert(name, bytes);
  }

  pub fn put_explanation(&self, name: ArtifactName, body: &Value) {
    self.put_artifact(name, body.to_string().into_bytes());
  }

  pub fn artifact(&self, name: ArtifactName) -> Option<Vec<u8>> {
    self.lock().artifacts.get(&name).cloned()
  }

  pub fn artifact_names(&self) -> Vec<ArtifactName> {
    self.lock().artifacts.keys().copied().collect()
  }

  pub fn backups(&self) -> Vec<Snapshot> { self.lock().backups.clone() }
}

impl StateStore for MemoryStore {
  type Error = Error;

  fn load_table(
    &self,
    dataset: Dataset,
  ) -> impl Future<Output = Result<Option<Table>>> + Send + '_ {
    let state = self.lock();
    ready(
      Self::check(&state, Fault::LoadTable(dataset))
        .map(|()| state.tables.get(&dataset).cloned()),
    )
  }

  fn save_table<'a>(
    &'a self,
    dataset: Dataset,
    table: &'a Table,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    let mut state = self.lock();
    ready(Self::check(&state, Fault::SaveTable(dataset)).map(|()| {
      state.tables.insert(dataset, table.clone());
    }))
  }

  fn save_fallback<'a>(
    &'a self,
    dataset: Dataset,
    table: &'a Table,
  ) -> impl Future<Output = Result<String>> + Send + 'a {
    let mut state = self.lock();
    ready(Self::check(&state, Fault::SaveFallback).map(|()| {
      state.fallbacks.push((dataset, table.clone()));
      format!("memory://{}_append_error_{}", dataset.file_stem(), state.fallbacks.len())
    }))
  }

  fn inbox_pending(&self) -> impl Future<Output = Result<bool>> + Send + '_ {
    ready(Ok(self.lock().tables.contains_key(&Dataset::Inbox)))
  }

  fn clear_inbox(&self) -> impl Future<Output = Result<()>> + Send + '_ {
    let mut state = self.lock();
    ready(Self::check(&state, Fault::ClearInbox).map(|()| {
      state.tables.remove(&Dataset::Inbox);
    }))
  }

  fn archive_batch(
    &self,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<String>>> + Send + '_ {
    let mut state = self.lock();
    let result = Self::check(&state, Fault::Archive).map(|()| {
      let batch = state.tables.get(&Dataset::PreprocessedBatch).cloned()?;
      state.archives.push((at, batch));
      Some(format!("memory://archived_uploads/preprocessed_{}", at.timestamp()))
    });
    ready(result)
  }

  fn load_counters(&self) -> impl Future<Output = Result<Counters>> + Send + '_ {
    ready(Ok(self.counters()))
  }

  fn save_counters<'a>(
    &'a self,
    counters: &'a Counters,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    let mut state = self.lock();
    ready(Self::check(&state, Fault::SaveCounters).map(|()| {
      state.counters = Some(counters.clone());
    }))
  }

  fn list_artifacts(
    &self,
    kind: ArtifactKind,
  ) -> impl Future<Output = Result<Vec<ArtifactName>>> + Send + '_ {
    let names = self
      .lock()
      .artifacts
      .keys()
      .filter(|n| n.kind == kind)
      .copied()
      .collect();
    ready(Ok(names))
  }

  fn read_explanation(
    &self,
    name: ArtifactName,
  ) -> impl Future<Output = Result<Value>> + Send + '_ {
    let result = match self.lock().artifacts.get(&name) {
      Some(bytes) => serde_json::from_slice(bytes).map_err(Error::from),
      None => Err(Error::ArtifactNotFound(name.to_string())),
    };
    ready(result)
  }

  fn write_explanation<'a>(
    &'a self,
    name: ArtifactName,
    body: &'a Value,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    self.put_explanation(name, body);
    ready(Ok(()))
  }

  fn rename_artifact(
    &self,
    from: ArtifactName,
    to: ArtifactName,
  ) -> impl Future<Output = Result<()>> + Send + '_ {
    let mut state = self.lock();
    let result = Self::check(&state, Fault::RenameArtifact).and_then(|()| {
      if state.artifacts.contains_key(&to) {
        return Err(Error::ArtifactExists(to.to_string()));
      }
      let bytes = state
        .artifacts
        .remove(&from)
        .ok_or_else(|| Error::ArtifactNotFound(from.to_string()))?;
      state.artifacts.insert(to, bytes);
      Ok(())
    });
    ready(result)
  }

  fn backup<'a>(
    &'a self,
    label: &'a str,
  ) -> impl Future<Output = Result<Backup>> + Send + 'a {
    let mut state = self.lock();
    let result = Self::check(&state, Fault::Backup).map(|()| {
      let tables: BTreeMap<_, _> = Dataset::REINDEXED
        .iter()
        .filter_map(|d| state.tables.get(d).map(|t| (*d, t.clone())))
        .collect();
      let artifacts = state.artifacts.clone();
      let files = tables.len() + artifacts.len();
      state.backups.push(Snapshot {
        label: label.to_owned(),
        tables,
        artifacts,
      });
      Backup {
        location: format!("memory://backups/{label}"),
        files,
      }
    });
    ready(result)
  }
}
