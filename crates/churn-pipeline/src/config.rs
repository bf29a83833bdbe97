//! Runtime configuration, deserialised with the `config` crate from an
//! optional TOML file layered under `CHURNFLOW_*` environment variables.
//!
//! Every field has a default, so an empty (or absent) file is a valid
//! configuration.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use churn_core::{counters::Thresholds, steps::Step};
use serde::Deserialize;

use crate::Result;

/// Environment variable prefix; nested keys are separated by `__`, as in
/// `CHURNFLOW_THRESHOLDS__MODEL_A=25`.
pub const ENV_PREFIX: &str = "CHURNFLOW";

// ─── Top level ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Root holding `datasets/`, `outputs/` and `backups/`.
  pub data_dir:     PathBuf,
  /// First identifier handed out on an empty dataset, and the base of a
  /// reindex.
  pub base_user_id: i64,
  pub thresholds:   Thresholds,
  pub schedule:     ScheduleConfig,
  pub steps:        StepsConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      data_dir:     PathBuf::from("."),
      base_user_id: 2000,
      thresholds:   Thresholds::default(),
      schedule:     ScheduleConfig::default(),
      steps:        StepsConfig::default(),
    }
  }
}

impl PipelineConfig {
  /// Load from `path` (skipped when missing) and the environment.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?;
    Ok(settings.try_deserialize()?)
  }
}

// ─── Schedule ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
  pub upload_interval_secs:  u64,
  pub retrain_interval_secs: u64,
}

impl Default for ScheduleConfig {
  fn default() -> Self {
    Self {
      upload_interval_secs:  300,
      retrain_interval_secs: 60,
    }
  }
}

impl ScheduleConfig {
  pub fn upload_interval(&self) -> Duration {
    Duration::from_secs(self.upload_interval_secs.max(1))
  }

  pub fn retrain_interval(&self) -> Duration {
    Duration::from_secs(self.retrain_interval_secs.max(1))
  }
}

// ─── Steps ────────────────────────────────────────────────────────────────────

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepCommand {
  pub program: String,
  #[serde(default)]
  pub args:    Vec<String>,
}

impl StepCommand {
  fn python(script: &str, extra: &[&str]) -> Self {
    Self {
      program: "python".to_owned(),
      args:    std::iter::once(script)
        .chain(extra.iter().copied())
        .map(str::to_owned)
        .collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StepsConfig {
  /// Directory the step programs run in.
  pub working_dir:   PathBuf,
  /// Upper bound on a single step; it is killed after this long.
  pub timeout_secs:  u64,
  pub train_model_a: StepCommand,
  pub train_model_b: StepCommand,
  pub predict:       StepCommand,
  pub explain:       StepCommand,
  pub insights:      StepCommand,
}

impl Default for StepsConfig {
  fn default() -> Self {
    Self {
      working_dir:   PathBuf::from("."),
      timeout_secs:  3600,
      train_model_a: StepCommand::python("scripts/train_model_a.py", &[]),
      train_model_b: StepCommand::python("scripts/train_model_b.py", &[]),
      predict:       StepCommand::python("scripts/churn_prediction.py", &[]),
      explain:       StepCommand::python("scripts/explain_user.py", &["--all"]),
      insights:      StepCommand::python("scripts/explinableAI.py", &[]),
    }
  }
}

impl StepsConfig {
  pub fn command(&self, step: Step) -> &StepCommand {
    use churn_core::counters::ModelKind;
    match step {
      Step::Train(ModelKind::A) => &self.train_model_a,
      Step::Train(ModelKind::B) => &self.train_model_b,
      Step::Predict => &self.predict,
      Step::Explain => &self.explain,
      Step::Insights => &self.insights,
    }
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}
