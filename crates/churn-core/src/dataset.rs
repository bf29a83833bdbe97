//! Names for every piece of persisted pipeline state.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::counters::ModelKind;

/// Well-known column names.
pub mod columns {
  pub const USER_ID: &str = "userid";
  pub const REVIEW: &str = "review";
  pub const LEFT_REVIEW: &str = "left_review";
  pub const IS_CHURNED: &str = "is_churned";

  /// Index column left behind by tools that write the frame index.
  pub const STRAY_INDEX: &str = "Unnamed: 0";

  /// Prefix of the daily-usage columns that get clipped.
  pub const DAY_PREFIX: &str = "Day_";

  /// Columns excluded from mean imputation.
  pub const NOT_IMPUTED: [&str; 4] = [USER_ID, REVIEW, LEFT_REVIEW, IS_CHURNED];
}

// ─── Datasets ────────────────────────────────────────────────────────────────

/// A CSV-shaped table the pipeline reads or writes.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dataset {
  /// The authoritative, append-only superset of all user records.
  Main,
  /// Newly uploaded rows waiting to be ingested.
  Inbox,
  /// The most recent ingested batch after imputation.
  PreprocessedBatch,
  ModelATrain,
  ModelBTrain,
  ChurnPrediction,
  ModelAPredictions,
  ModelBPredictions,
  SentimentAnalysis,
}

impl Dataset {
  /// Tables whose identifier column the reindexer rewrites.
  pub const REINDEXED: [Self; 7] = [
    Self::Main,
    Self::ModelATrain,
    Self::ModelBTrain,
    Self::ChurnPrediction,
    Self::ModelAPredictions,
    Self::ModelBPredictions,
    Self::SentimentAnalysis,
  ];

  /// The file stem used by flat-file stores.
  pub fn file_stem(self) -> &'static str {
    match self {
      Self::Main => "main-dataset",
      Self::Inbox => "user-uploads",
      Self::PreprocessedBatch => "user-uploads-preprocessed",
      Self::ModelATrain => "model_a_train",
      Self::ModelBTrain => "model_b_train",
      Self::ChurnPrediction => "churn_prediction",
      Self::ModelAPredictions => "model_a_predictions",
      Self::ModelBPredictions => "model_b_predictions",
      Self::SentimentAnalysis => "sentiment_analysis",
    }
  }

  pub fn training_table(model: ModelKind) -> Self {
    match model {
      ModelKind::A => Self::ModelATrain,
      ModelKind::B => Self::ModelBTrain,
    }
  }
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

/// Per-user output files produced by the explanation step.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
  /// `user_<id>.json`, carrying the id again in a `user_id` field.
  Explanation,
  /// `user_<id>.png`.
  Chart,
}

impl ArtifactKind {
  pub fn extension(self) -> &'static str {
    match self {
      Self::Explanation => "json",
      Self::Chart => "png",
    }
  }
}

/// Suffix marking an artifact renamed mid-reindex but not yet committed.
pub const STAGED_SUFFIX: &str = "reindex";

/// The identity of one artifact file: which user it belongs to, and whether
/// it is sitting under a staged name during a reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactName {
  pub kind:    ArtifactKind,
  pub user_id: i64,
  pub staged:  bool,
}

impl ArtifactName {
  pub fn new(kind: ArtifactKind, user_id: i64) -> Self {
    Self {
      kind,
      user_id,
      staged: false,
    }
  }

  pub fn staged(kind: ArtifactKind, user_id: i64) -> Self {
    Self {
      kind,
      user_id,
      staged: true,
    }
  }

  /// The committed counterpart of a staged name.
  pub fn committed(self) -> Self {
    Self {
      staged: false,
      ..self
    }
  }

  /// Parse a file name such as `user_2001.json` or `user_2001.png.reindex`.
  pub fn parse(kind: ArtifactKind, file_name: &str) -> Option<Self> {
    let (rest, staged) = match file_name
      .strip_suffix(STAGED_SUFFIX)
      .and_then(|r| r.strip_suffix('.'))
    {
      Some(rest) => (rest, true),
      None => (file_name, false),
    };
    let stem = rest
      .strip_suffix(kind.extension())
      .and_then(|r| r.strip_suffix('.'))?;
    let user_id = stem.strip_prefix("user_")?.parse().ok()?;
    Some(Self {
      kind,
      user_id,
      staged,
    })
  }
}

impl fmt::Display for ArtifactName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "user_{}.{}", self.user_id, self.kind.extension())?;
    if self.staged {
      write!(f, ".{STAGED_SUFFIX}")?;
    }
    Ok(())
  }
}
