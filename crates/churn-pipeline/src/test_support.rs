//! Shared fixtures for the unit tests.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex},
};

use churn_core::{
  steps::{Step, StepOutcome, StepRunner},
  table::Table,
};
use tokio::sync::Notify;

pub fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
  Table::from_rows(
    columns.iter().copied(),
    rows
      .iter()
      .map(|r| r.iter().map(|c| (*c).to_owned()).collect())
      .collect(),
  )
  .expect("well-formed fixture")
}

/// A [`StepRunner`] that records every call and fails the steps it is told
/// to. With a gate, training steps block until the gate is notified.
#[derive(Default)]
pub struct ScriptedRunner {
  calls:   Mutex<Vec<Step>>,
  failing: Mutex<HashSet<Step>>,
  gate:    Option<Arc<Notify>>,
}

impl ScriptedRunner {
  pub fn new() -> Self { Self::default() }

  pub fn gated(gate: Arc<Notify>) -> Self {
    Self {
      gate: Some(gate),
      ..Self::default()
    }
  }

  pub fn fail(&self, step: Step) { self.failing.lock().unwrap().insert(step); }

  pub fn calls(&self) -> Vec<Step> { self.calls.lock().unwrap().clone() }
}

impl StepRunner for ScriptedRunner {
  fn run(&self, step: Step) -> impl Future<Output = StepOutcome> + Send + '_ {
    async move {
      self.calls.lock().unwrap().push(step);
      if let Some(gate) = &self.gate
        && matches!(step, Step::Train(_))
      {
        gate.notified().await;
      }
      if self.failing.lock().unwrap().contains(&step) {
        StepOutcome::failed(format!("{step} was told to fail"))
      } else {
        StepOutcome::Succeeded
      }
    }
  }
}
