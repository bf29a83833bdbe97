//! Where each piece of state lives under the store root.
//!
//! ```text
//! <root>/datasets/<stem>.csv
//! <root>/datasets/training_counters.json
//! <root>/datasets/archived_uploads/preprocessed_<unix>.csv
//! <root>/outputs/explanations/user_<id>.json
//! <root>/outputs/charts/user_<id>.png
//! <root>/backups/<label>/{datasets,explanations,charts}/
//! ```

use std::path::{Path, PathBuf};

use churn_core::dataset::{ArtifactKind, ArtifactName, Dataset};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
  root: PathBuf,
}

impl Layout {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  pub fn datasets_dir(&self) -> PathBuf { self.root.join("datasets") }

  pub fn outputs_dir(&self) -> PathBuf { self.root.join("outputs") }

  pub fn table_path(&self, dataset: Dataset) -> PathBuf {
    self
      .datasets_dir()
      .join(format!("{}.csv", dataset.file_stem()))
  }

  pub fn counters_path(&self) -> PathBuf {
    self.datasets_dir().join("training_counters.json")
  }

  pub fn archive_dir(&self) -> PathBuf {
    self.datasets_dir().join("archived_uploads")
  }

  pub fn artifact_dir(&self, kind: ArtifactKind) -> PathBuf {
    let dir = match kind {
      ArtifactKind::Explanation => "explanations",
      ArtifactKind::Chart => "charts",
    };
    self.outputs_dir().join(dir)
  }

  pub fn artifact_path(&self, name: ArtifactName) -> PathBuf {
    self.artifact_dir(name.kind).join(name.to_string())
  }

  pub fn backups_dir(&self) -> PathBuf { self.root.join("backups") }
}
