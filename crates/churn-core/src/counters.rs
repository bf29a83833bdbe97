//! Retrain counters: how many new records each model has seen since it was
//! last trained, and when that was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The two models the pipeline retrains.
///
/// Model A trains on every row; model B only on rows carrying a review.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ModelKind {
  A,
  B,
}

impl ModelKind {
  pub const ALL: [Self; 2] = [Self::A, Self::B];
}

/// The persisted counter record.
///
/// Field names match the on-disk JSON. Missing fields default, so files
/// written before timestamps were tracked still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
  #[serde(default)]
  pub model_a:        u64,
  #[serde(default)]
  pub model_b:        u64,
  #[serde(default)]
  pub last_retrain_a: Option<DateTime<Utc>>,
  #[serde(default)]
  pub last_retrain_b: Option<DateTime<Utc>>,
}

impl Counters {
  pub fn get(&self, model: ModelKind) -> u64 {
    match model {
      ModelKind::A => self.model_a,
      ModelKind::B => self.model_b,
    }
  }

  pub fn last_retrain(&self, model: ModelKind) -> Option<DateTime<Utc>> {
    match model {
      ModelKind::A => self.last_retrain_a,
      ModelKind::B => self.last_retrain_b,
    }
  }

  pub fn add(&mut self, model: ModelKind, n: u64) {
    let slot = match model {
      ModelKind::A => &mut self.model_a,
      ModelKind::B => &mut self.model_b,
    };
    *slot = slot.saturating_add(n);
  }

  /// Record a completed retrain: the counter goes to zero, not down by the
  /// threshold, and the timestamp moves to `at`.
  pub fn reset(&mut self, model: ModelKind, at: DateTime<Utc>) {
    match model {
      ModelKind::A => {
        self.model_a = 0;
        self.last_retrain_a = Some(at);
      }
      ModelKind::B => {
        self.model_b = 0;
        self.last_retrain_b = Some(at);
      }
    }
  }
}

/// Per-model retrain thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
  pub model_a: u64,
  pub model_b: u64,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      model_a: 20,
      model_b: 10,
    }
  }
}

impl Thresholds {
  pub fn get(&self, model: ModelKind) -> u64 {
    match model {
      ModelKind::A => self.model_a,
      ModelKind::B => self.model_b,
    }
  }

  pub fn reached(&self, counters: &Counters, model: ModelKind) -> bool {
    counters.get(model) >= self.get(model)
  }
}
