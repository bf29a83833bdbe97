//! The [`StepRunner`] trait: how the orchestrator invokes the external
//! training and regeneration steps.
//!
//! A step is opaque beyond pass/fail. Runners report failure as a
//! [`StepOutcome`] value, never as an error, so a crashing step can never
//! unwind the caller.

use std::{fmt, future::Future, time::Duration};

use crate::counters::ModelKind;

/// An externally implemented unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
  /// Fit one model from its training table.
  Train(ModelKind),
  /// Regenerate the prediction tables from the latest trained models.
  Predict,
  /// Regenerate explanations and charts for every known user.
  Explain,
  /// Regenerate the business-facing summary of what drives churn.
  Insights,
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Train(model) => write!(f, "train_model_{model}"),
      Self::Predict => f.write_str("predict"),
      Self::Explain => f.write_str("explain"),
      Self::Insights => f.write_str("insights"),
    }
  }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
  Succeeded,
  /// The step ran and reported failure, or could not be started.
  Failed { reason: String },
  /// The step exceeded its bounded wait and was stopped.
  TimedOut { after: Duration },
}

impl StepOutcome {
  pub fn failed(reason: impl Into<String>) -> Self {
    Self::Failed {
      reason: reason.into(),
    }
  }

  pub fn is_success(&self) -> bool { matches!(self, Self::Succeeded) }
}

impl fmt::Display for StepOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Succeeded => f.write_str("succeeded"),
      Self::Failed { reason } => write!(f, "failed: {reason}"),
      Self::TimedOut { after } => write!(f, "timed out after {after:?}"),
    }
  }
}

/// Executes [`Step`]s on behalf of the scheduler.
pub trait StepRunner: Send + Sync {
  /// Run `step` to completion (or until the runner gives up on it).
  fn run(&self, step: Step) -> impl Future<Output = StepOutcome> + Send + '_;
}
