//! Orchestration for the churn retraining pipeline.
//!
//! - [`ingest::Ingestor`] turns the upload inbox into rows of the
//!   authoritative dataset and hands the batch downstream.
//! - [`scheduler::Scheduler`] merges each batch into the training tables,
//!   keeps the retrain counters, trains models whose threshold is reached and
//!   refreshes predictions and explanations.
//! - [`reindex::Reindexer`] compacts every identifier to a contiguous range.
//! - [`daemon::Daemon`] polls for uploads and retrain conditions on two
//!   independent intervals.
//!
//! All of them work against any [`StateStore`](churn_core::store::StateStore)
//! and [`StepRunner`](churn_core::steps::StepRunner).

pub mod config;
pub mod daemon;
pub mod error;
pub mod ingest;
pub mod reindex;
pub mod runner;
pub mod scheduler;
pub mod training;

pub use config::PipelineConfig;
pub use error::{Error, Result};

#[cfg(test)]
mod test_support;
