//! [`FsStore`]: the flat-file implementation of [`StateStore`].

use std::{
  fs, io,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use strum::IntoEnumIterator as _;

use churn_core::{
  counters::Counters,
  dataset::{ArtifactKind, ArtifactName, Dataset},
  store::{Backup, StateStore},
  table::Table,
};

use crate::{
  Error, Layout, Result,
  encode::{create_unique, create_unique_dir, decode_table, encode_table, write_atomic},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Pipeline state kept as plain files under one root directory.
///
/// Cloning is cheap; the layout is reference-counted.
#[derive(Debug, Clone)]
pub struct FsStore {
  layout: Arc<Layout>,
}

/// Run filesystem work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
  F: FnOnce() -> Result<T> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f).await?
}

/// Read a file, treating "not there" as `None`.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
  match fs::read(path) {
    Ok(bytes) => Ok(Some(bytes)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e.into()),
  }
}

fn copy_into(src: &Path, dir: &Path) -> Result<bool> {
  let Some(name) = src.file_name() else {
    return Ok(false);
  };
  if !src.is_file() {
    return Ok(false);
  }
  fs::create_dir_all(dir)?;
  fs::copy(src, dir.join(name))?;
  Ok(true)
}

fn list_artifacts_in(dir: &Path, kind: ArtifactKind) -> Result<Vec<ArtifactName>> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e.into()),
  };
  let mut names = Vec::new();
  for entry in entries {
    let entry = entry?;
    if let Some(name) = entry
      .file_name()
      .to_str()
      .and_then(|n| ArtifactName::parse(kind, n))
    {
      names.push(name);
    }
  }
  names.sort();
  Ok(names)
}

impl FsStore {
  /// Open (or create) a store rooted at `root`.
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
    let layout = Layout::new(root);
    let datasets = layout.datasets_dir();
    let outputs = layout.outputs_dir();
    blocking(move || {
      fs::create_dir_all(datasets)?;
      fs::create_dir_all(outputs)?;
      Ok(())
    })
    .await?;
    Ok(Self {
      layout: Arc::new(layout),
    })
  }

  pub fn layout(&self) -> &Layout { &self.layout }
}

impl StateStore for FsStore {
  type Error = Error;

  fn load_table(
    &self,
    dataset: Dataset,
  ) -> impl Future<Output = Result<Option<Table>>> + Send + '_ {
    let path = self.layout.table_path(dataset);
    async move {
      blocking(move || match read_optional(&path)? {
        Some(bytes) => decode_table(&bytes),
        None => Ok(None),
      })
      .await
    }
  }

  fn save_table<'a>(
    &'a self,
    dataset: Dataset,
    table: &'a Table,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    let path = self.layout.table_path(dataset);
    async move {
      let bytes = encode_table(table)?;
      blocking(move || write_atomic(&path, &bytes)).await?;
      tracing::debug!(%dataset, rows = table.len(), "table saved");
      Ok(())
    }
  }

  fn save_fallback<'a>(
    &'a self,
    dataset: Dataset,
    table: &'a Table,
  ) -> impl Future<Output = Result<String>> + Send + 'a {
    let dir = self.layout.datasets_dir();
    let stem = format!(
      "{}_append_error_{}",
      dataset.file_stem(),
      Utc::now().timestamp()
    );
    async move {
      let bytes = encode_table(table)?;
      let path = blocking(move || {
        let (mut file, path) = create_unique(&dir, &stem, ".csv")?;
        io::Write::write_all(&mut file, &bytes)?;
        file.sync_all()?;
        Ok(path)
      })
      .await?;
      Ok(path.display().to_string())
    }
  }

  fn inbox_pending(&self) -> impl Future<Output = Result<bool>> + Send + '_ {
    let path = self.layout.table_path(Dataset::Inbox);
    async move {
      blocking(move || match fs::metadata(&path) {
        Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
      })
      .await
    }
  }

  fn clear_inbox(&self) -> impl Future<Output = Result<()>> + Send + '_ {
    let path = self.layout.table_path(Dataset::Inbox);
    async move {
      blocking(move || {
        fs::File::create(&path)?;
        Ok(())
      })
      .await
    }
  }

  fn archive_batch(
    &self,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<String>>> + Send + '_ {
    let src = self.layout.table_path(Dataset::PreprocessedBatch);
    let dir = self.layout.archive_dir();
    let stem = format!("preprocessed_{}", at.timestamp());
    async move {
      blocking(move || {
        let Some(bytes) = read_optional(&src)?.filter(|b| !b.is_empty()) else {
          return Ok(None);
        };
        let (mut file, path) = create_unique(&dir, &stem, ".csv")?;
        io::Write::write_all(&mut file, &bytes)?;
        file.sync_all()?;
        Ok(Some(path.display().to_string()))
      })
      .await
    }
  }

  fn load_counters(&self) -> impl Future<Output = Result<Counters>> + Send + '_ {
    let path = self.layout.counters_path();
    async move {
      let bytes = blocking(move || read_optional(&path)).await?;
      let Some(bytes) = bytes.filter(|b| !b.is_empty()) else {
        return Ok(Counters::default());
      };
      match serde_json::from_slice(&bytes) {
        Ok(counters) => Ok(counters),
        Err(error) => {
          tracing::warn!(%error, "counters file is corrupt; starting from zero");
          Ok(Counters::default())
        }
      }
    }
  }

  fn save_counters<'a>(
    &'a self,
    counters: &'a Counters,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    let path = self.layout.counters_path();
    async move {
      let bytes = serde_json::to_vec_pretty(counters)?;
      blocking(move || write_atomic(&path, &bytes)).await
    }
  }

  fn list_artifacts(
    &self,
    kind: ArtifactKind,
  ) -> impl Future<Output = Result<Vec<ArtifactName>>> + Send + '_ {
    let dir = self.layout.artifact_dir(kind);
    async move { blocking(move || list_artifacts_in(&dir, kind)).await }
  }

  fn read_explanation(
    &self,
    name: ArtifactName,
  ) -> impl Future<Output = Result<Value>> + Send + '_ {
    let path = self.layout.artifact_path(name);
    async move {
      let bytes = blocking(move || match read_optional(&path)? {
        Some(bytes) => Ok(bytes),
        None => Err(Error::ArtifactNotFound(path)),
      })
      .await?;
      Ok(serde_json::from_slice(&bytes)?)
    }
  }

  fn write_explanation<'a>(
    &'a self,
    name: ArtifactName,
    body: &'a Value,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    let path = self.layout.artifact_path(name);
    async move {
      let bytes = serde_json::to_vec_pretty(body)?;
      blocking(move || write_atomic(&path, &bytes)).await
    }
  }

  fn rename_artifact(
    &self,
    from: ArtifactName,
    to: ArtifactName,
  ) -> impl Future<Output = Result<()>> + Send + '_ {
    let src = self.layout.artifact_path(from);
    let dst = self.layout.artifact_path(to);
    async move {
      blocking(move || {
        if dst.exists() {
          return Err(Error::ArtifactExists(dst));
        }
        if !src.exists() {
          return Err(Error::ArtifactNotFound(src));
        }
        fs::rename(&src, &dst)?;
        Ok(())
      })
      .await
    }
  }

  fn backup<'a>(
    &'a self,
    label: &'a str,
  ) -> impl Future<Output = Result<Backup>> + Send + 'a {
    let layout = Arc::clone(&self.layout);
    let label = label.to_owned();
    async move {
      let backup = blocking(move || {
        let root = create_unique_dir(&layout.backups_dir(), &label)?;
        let mut files = 0;
        for dataset in Dataset::REINDEXED {
          if copy_into(&layout.table_path(dataset), &root.join("datasets"))? {
            files += 1;
          }
        }
        for kind in ArtifactKind::iter() {
          let target = root.join(layout.artifact_dir(kind).file_name().unwrap_or_default());
          for name in list_artifacts_in(&layout.artifact_dir(kind), kind)? {
            if copy_into(&layout.artifact_path(name), &target)? {
              files += 1;
            }
          }
        }
        Ok(Backup {
          location: root.display().to_string(),
          files,
        })
      })
      .await?;
      tracing::info!(location = %backup.location, files = backup.files, "backup written");
      Ok(backup)
    }
  }
}
