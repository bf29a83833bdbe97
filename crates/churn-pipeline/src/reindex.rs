//! Compacting user identifiers to a contiguous range.
//!
//! Work happens in three passes, each only after the previous succeeded:
//!
//! 1. Build an [`IdMap`] from the authoritative dataset. Read-only.
//! 2. Back up every reindexable table and artifact.
//! 3. Rewrite ids in the tables, then rename artifacts: first each to a staged
//!    name, then every staged name to its final one. A rename never replaces
//!    an existing file and nothing is deleted.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use chrono::Utc;
use churn_core::{
  dataset::{ArtifactKind, ArtifactName, Dataset, columns},
  store::{Backup, StateStore},
  table::{Table, parse_id},
};
use serde_json::Value;

use crate::{Error, Result};

// ─── Identifier map ───────────────────────────────────────────────────────────

/// Old id to new id. Injective by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap(BTreeMap<i64, i64>);

impl IdMap {
  /// Sort the distinct ids and number them from `base`.
  pub fn assign(ids: impl IntoIterator<Item = i64>, base: i64) -> Self {
    let distinct: BTreeSet<i64> = ids.into_iter().collect();
    Self(distinct.into_iter().zip(base..).collect())
  }

  pub fn get(&self, old: i64) -> Option<i64> { self.0.get(&old).copied() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
    self.0.iter().map(|(old, new)| (*old, *new))
  }

  /// The map that undoes this one.
  pub fn inverse(&self) -> Self { Self(self.0.iter().map(|(old, new)| (*new, *old)).collect()) }

  /// Map an id cell, leaving unparseable and unmapped ids alone.
  fn map_cell(&self, cell: &str) -> Option<String> {
    parse_id(cell)
      .and_then(|id| self.get(id))
      .map(|id| id.to_string())
  }
}

/// Build the map for `main`'s `userid` column.
pub fn build_id_map(main: &Table, base: i64) -> Result<IdMap> {
  if !main.has_column(columns::USER_ID) {
    return Err(Error::MissingColumn(columns::USER_ID));
  }
  Ok(IdMap::assign(main.ids(columns::USER_ID), base))
}

// ─── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
  pub backup:    Backup,
  /// Tables rewritten, with the number of cells changed in each.
  pub tables:    Vec<(Dataset, usize)>,
  /// Artifacts now under their final name.
  pub renamed:   usize,
  /// Artifacts left under a staged name because the final name was taken.
  pub conflicts: Vec<ArtifactName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexReport {
  pub base:  i64,
  pub map:   IdMap,
  pub apply: ApplyReport,
}

// ─── Reindexer ────────────────────────────────────────────────────────────────

pub struct Reindexer<S> {
  store: Arc<S>,
  base:  i64,
}

impl<S: StateStore> Reindexer<S> {
  pub fn new(store: Arc<S>, base: i64) -> Self { Self { store, base } }

  /// Renumber every user from the base id.
  pub async fn reindex(&self) -> Result<ReindexReport> {
    let main = self
      .store
      .load_table(Dataset::Main)
      .await
      .map_err(Error::store)?
      .ok_or(Error::MissingMainDataset)?;
    let map = build_id_map(&main, self.base)?;
    tracing::info!(users = map.len(), base = self.base, "identifier map built");

    let label = format!("reindex_{}", Utc::now().format("%Y%m%d_%H%M%S"));
    let apply = self.apply(&map, &label).await?;
    tracing::info!(
      users = map.len(),
      base = self.base,
      backup = %apply.backup.location,
      renamed = apply.renamed,
      conflicts = apply.conflicts.len(),
      "reindex complete"
    );
    Ok(ReindexReport {
      base: self.base,
      map,
      apply,
    })
  }

  /// Back up, then apply `map` to every table and artifact.
  pub async fn apply(&self, map: &IdMap, label: &str) -> Result<ApplyReport> {
    let backup = self.store.backup(label).await.map_err(Error::store)?;

    let mut tables = Vec::new();
    for dataset in Dataset::REINDEXED {
      let Some(mut table) = self.store.load_table(dataset).await.map_err(Error::store)? else {
        continue;
      };
      let Some(changed) = table.map_column(columns::USER_ID, |cell| map.map_cell(cell)) else {
        tracing::debug!(%dataset, "no userid column; left alone");
        continue;
      };
      self.store.save_table(dataset, &table).await.map_err(Error::store)?;
      tracing::info!(%dataset, changed, "identifiers rewritten");
      tables.push((dataset, changed));
    }

    for kind in [ArtifactKind::Explanation, ArtifactKind::Chart] {
      self.stage(kind, map).await?;
    }
    let mut renamed = 0;
    let mut conflicts = Vec::new();
    for kind in [ArtifactKind::Explanation, ArtifactKind::Chart] {
      let (done, refused) = self.commit(kind).await?;
      renamed += done;
      conflicts.extend(refused);
    }

    Ok(ApplyReport {
      backup,
      tables,
      renamed,
      conflicts,
    })
  }

  /// The id an explanation belongs to: its `user_id` field, else its name.
  fn explanation_owner(name: ArtifactName, body: &Value) -> i64 {
    let embedded = match body.get("user_id") {
      Some(Value::Number(n)) => n
        .as_i64()
        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
      Some(Value::String(s)) => parse_id(s),
      _ => None,
    };
    embedded.unwrap_or(name.user_id)
  }

  /// Rename every mapped artifact of `kind` to its staged new name,
  /// rewriting explanations first.
  async fn stage(&self, kind: ArtifactKind, map: &IdMap) -> Result<()> {
    let names = self.store.list_artifacts(kind).await.map_err(Error::store)?;
    for name in names.into_iter().filter(|n| !n.staged) {
      let new_id = match kind {
        ArtifactKind::Explanation => {
          let mut body = match self.store.read_explanation(name).await {
            Ok(body) => body,
            Err(error) => {
              tracing::warn!(artifact = %name, %error, "unreadable explanation; left alone");
              continue;
            }
          };
          let Some(new_id) = map.get(Self::explanation_owner(name, &body)) else {
            continue;
          };
          if let Some(fields) = body.as_object_mut() {
            fields.insert("user_id".to_owned(), Value::from(new_id));
          }
          self.store.write_explanation(name, &body).await.map_err(Error::store)?;
          new_id
        }
        ArtifactKind::Chart => match map.get(name.user_id) {
          Some(new_id) => new_id,
          None => continue,
        },
      };

      let staged = ArtifactName::staged(kind, new_id);
      if let Err(error) = self.store.rename_artifact(name, staged).await {
        tracing::warn!(artifact = %name, to = %staged, %error, "could not stage artifact");
      }
    }
    Ok(())
  }

  /// Move every staged artifact of `kind` to its final name. Returns how
  /// many moved and which were refused.
  async fn commit(&self, kind: ArtifactKind) -> Result<(usize, Vec<ArtifactName>)> {
    let names = self.store.list_artifacts(kind).await.map_err(Error::store)?;
    let mut done = 0;
    let mut refused = Vec::new();
    for staged in names.into_iter().filter(|n| n.staged) {
      let target = staged.committed();
      match self.store.rename_artifact(staged, target).await {
        Ok(()) => done += 1,
        Err(error) => {
          tracing::warn!(artifact = %staged, to = %target, %error, "artifact left staged");
          refused.push(staged);
        }
      }
    }
    Ok((done, refused))
  }
}
