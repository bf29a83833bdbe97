//! `churnflow`: the churn retraining pipeline.
//!
//! # Usage
//!
//! ```
//! churnflow run                    # poll for uploads and retrains until Ctrl-C
//! churnflow ingest                 # process the inbox once
//! churnflow retrain --model a      # retrain model A if it is due
//! churnflow reindex --base 2000    # renumber every user
//! churnflow status                 # counters and thresholds as JSON
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use churn_core::{counters::ModelKind, store::StateStore};
use churn_pipeline::{
  PipelineConfig,
  daemon::Daemon,
  ingest::{IngestOutcome, Ingestor},
  reindex::Reindexer,
  runner::CommandRunner,
  scheduler::Scheduler,
};
use churn_store_fs::FsStore;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Incremental retraining pipeline for churn models")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "churnflow.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Poll for uploads and due retrains until interrupted.
  Run,
  /// Ingest the inbox once.
  Ingest,
  /// Run one retrain check.
  Retrain {
    /// Only consider this model (`a` or `b`).
    #[arg(long)]
    model: Option<ModelKind>,
  },
  /// Renumber every user id from the base id.
  Reindex {
    /// First id of the new range; defaults to `base_user_id`.
    #[arg(long)]
    base: Option<i64>,
  },
  /// Print counters and thresholds as JSON.
  Status,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = PipelineConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

  let store = FsStore::open(&config.data_dir)
    .await
    .with_context(|| format!("failed to open data directory {}", config.data_dir.display()))?;
  let store = Arc::new(store);
  let runner = Arc::new(CommandRunner::new(config.steps.clone()));

  match cli.command {
    Command::Run => {
      let daemon = Daemon::new(store, runner, &config);
      daemon
        .run(async {
          if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
          }
        })
        .await;
    }
    Command::Ingest => {
      let scheduler = Scheduler::new(Arc::clone(&store), runner, config.thresholds);
      let ingestor = Ingestor::new(store, config.base_user_id);
      match ingestor.ingest(&scheduler).await.context("ingestion failed")? {
        IngestOutcome::NothingToDo => println!("inbox is empty"),
        IngestOutcome::Ingested(report) => println!(
          "ingested {} rows as users {}..={}",
          report.rows, report.first_id, report.last_id
        ),
      }
    }
    Command::Retrain { model } => {
      let scheduler = Scheduler::new(store, runner, config.thresholds);
      match model {
        Some(model) => {
          let outcome = scheduler.retrain(model).await.context("retrain failed")?;
          if outcome.attempted() {
            scheduler.refresh().await;
          }
          println!("model {model}: {outcome:?}");
        }
        None => {
          let report = scheduler
            .check_and_retrain()
            .await
            .context("retrain check failed")?;
          for (model, outcome) in &report.retrains {
            println!("model {model}: {outcome:?}");
          }
        }
      }
    }
    Command::Reindex { base } => {
      let base = base.unwrap_or(config.base_user_id);
      let report = Reindexer::new(store, base)
        .reindex()
        .await
        .context("reindex failed")?;
      println!(
        "reindexed {} users from {base}; backup at {}",
        report.map.len(),
        report.apply.backup.location
      );
      if !report.apply.conflicts.is_empty() {
        println!("{} artifacts left staged:", report.apply.conflicts.len());
        for name in &report.apply.conflicts {
          println!("  {name}");
        }
      }
    }
    Command::Status => {
      let counters = store.load_counters().await.context("failed to read counters")?;
      let status = serde_json::json!({
        "counters": counters,
        "thresholds": config.thresholds,
        "due": ModelKind::ALL
          .iter()
          .filter(|m| config.thresholds.reached(&counters, **m))
          .map(ToString::to_string)
          .collect::<Vec<_>>(),
        "inbox_pending": store.inbox_pending().await.context("failed to check inbox")?,
      });
      println!("{}", serde_json::to_string_pretty(&status)?);
    }
  }

  Ok(())
}
