//! Core types and trait definitions for the churn retraining pipeline.
//!
//! This crate holds the table model, the merge and preprocessing algorithms,
//! and the two seams the orchestrator talks through: [`store::StateStore`] for
//! persisted state and [`steps::StepRunner`] for external training and
//! regeneration steps. It has no filesystem or process dependencies.

pub mod counters;
pub mod dataset;
pub mod error;
pub mod memory;
pub mod merge;
pub mod preprocess;
pub mod steps;
pub mod store;
pub mod table;

pub use error::{Error, Result};
