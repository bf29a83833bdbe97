//! The scheduling loop.

use std::sync::Arc;

use churn_core::{steps::StepRunner, store::StateStore};
use tokio::time::{MissedTickBehavior, interval};

use crate::{
  config::{PipelineConfig, ScheduleConfig},
  ingest::{IngestOutcome, Ingestor},
  scheduler::Scheduler,
};

/// Polls for uploads and for due retrains on independent intervals.
///
/// One check runs at a time and always to completion. Errors are logged and
/// the loop carries on; it ends only when the shutdown future resolves.
pub struct Daemon<S, R> {
  ingestor:  Ingestor<S>,
  scheduler: Scheduler<S, R>,
  schedule:  ScheduleConfig,
}

impl<S: StateStore, R: StepRunner> Daemon<S, R> {
  pub fn new(store: Arc<S>, runner: Arc<R>, config: &PipelineConfig) -> Self {
    Self {
      ingestor:  Ingestor::new(Arc::clone(&store), config.base_user_id),
      scheduler: Scheduler::new(store, runner, config.thresholds),
      schedule:  config.schedule.clone(),
    }
  }

  pub fn scheduler(&self) -> &Scheduler<S, R> { &self.scheduler }

  pub async fn run(&self, shutdown: impl Future<Output = ()>) {
    let mut uploads = interval(self.schedule.upload_interval());
    uploads.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut retrains = interval(self.schedule.retrain_interval());
    retrains.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!(
      upload_interval = ?self.schedule.upload_interval(),
      retrain_interval = ?self.schedule.retrain_interval(),
      "pipeline started"
    );
    loop {
      tokio::select! {
        biased;
        () = &mut shutdown => break,
        _ = uploads.tick() => self.poll_uploads().await,
        _ = retrains.tick() => self.poll_retrains().await,
      }
    }
    tracing::info!("pipeline stopped");
  }

  /// One upload check.
  pub async fn poll_uploads(&self) {
    match self.ingestor.ingest(&self.scheduler).await {
      Ok(IngestOutcome::NothingToDo) => {}
      Ok(IngestOutcome::Ingested(report)) => {
        tracing::info!(rows = report.rows, first_id = report.first_id, "upload processed");
      }
      Err(error) => tracing::error!(%error, "upload check failed"),
    }
  }

  /// One retrain check.
  pub async fn poll_retrains(&self) {
    match self.scheduler.check_and_retrain().await {
      Ok(report) => {
        for (model, outcome) in report.retrains.iter().filter(|(_, o)| o.attempted()) {
          tracing::info!(%model, ?outcome, "retrain check acted");
        }
      }
      Err(error) => tracing::error!(%error, "retrain check failed"),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
  };

  use churn_core::{
    counters::{Counters, ModelKind},
    dataset::Dataset,
    memory::{Fault, MemoryStore},
    steps::Step,
  };
  use tokio::sync::{Notify, oneshot};

  use super::*;
  use crate::{
    scheduler::RetrainState,
    test_support::{ScriptedRunner, table},
  };

  fn config() -> PipelineConfig {
    PipelineConfig {
      schedule: ScheduleConfig {
        upload_interval_secs:  300,
        retrain_interval_secs: 60,
      },
      ..PipelineConfig::default()
    }
  }

  #[tokio::test(start_paused = true)]
  async fn runs_both_checks_until_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(ScriptedRunner::new());
    store.put_table(Dataset::Inbox, table(&["review"], &[&["nice"]]));
    let daemon = Daemon::new(Arc::clone(&store), Arc::clone(&runner), &config());

    let (stop, stopped) = oneshot::channel::<()>();
    let run = daemon.run(async {
      let _ = stopped.await;
    });
    let drive = async {
      tokio::time::sleep(Duration::from_secs(90)).await;
      let _ = stop.send(());
    };
    tokio::join!(run, drive);

    assert_eq!(store.table(Dataset::Main).unwrap().len(), 1);
    assert!(store.table(Dataset::Inbox).is_none());
    assert_eq!(runner.calls(), vec![Step::Predict, Step::Explain, Step::Insights]);
  }

  #[tokio::test(start_paused = true)]
  async fn errors_do_not_stop_the_loop() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(ScriptedRunner::new());
    store.put_table(Dataset::Inbox, table(&["review"], &[&["nice"]]));
    store.inject(Fault::SaveTable(Dataset::Main));
    let daemon = Daemon::new(Arc::clone(&store), Arc::clone(&runner), &config());

    let (stop, stopped) = oneshot::channel::<()>();
    let run = daemon.run(async {
      let _ = stopped.await;
    });
    let drive = async {
      tokio::time::sleep(Duration::from_secs(301)).await;
      store.heal(Fault::SaveTable(Dataset::Main));
      tokio::time::sleep(Duration::from_secs(300)).await;
      let _ = stop.send(());
    };
    tokio::join!(run, drive);

    assert_eq!(store.table(Dataset::Main).unwrap().len(), 1);
    assert_eq!(daemon.scheduler().state(ModelKind::A), RetrainState::Idle);
  }

  #[tokio::test(start_paused = true)]
  async fn shutdown_waits_for_training_in_flight() {
    let store = Arc::new(MemoryStore::new());
    let gate = Arc::new(Notify::new());
    let runner = Arc::new(ScriptedRunner::gated(Arc::clone(&gate)));
    store.put_counters(Counters {
      model_a: 20,
      ..Counters::default()
    });
    store.put_table(Dataset::ModelATrain, table(&["userid"], &[&["2000"]]));
    let daemon = Daemon::new(Arc::clone(&store), Arc::clone(&runner), &config());
    let done = AtomicBool::new(false);

    let (stop, stopped) = oneshot::channel::<()>();
    let run = async {
      daemon
        .run(async {
          let _ = stopped.await;
        })
        .await;
      done.store(true, Ordering::SeqCst);
    };
    let drive = async {
      while daemon.scheduler().state(ModelKind::A) != RetrainState::Training {
        tokio::task::yield_now().await;
      }
      let _ = stop.send(());
      tokio::time::sleep(Duration::from_secs(10)).await;
      assert!(!done.load(Ordering::SeqCst));
      assert_eq!(store.counters().model_a, 20);
      gate.notify_one();
    };
    tokio::join!(run, drive);

    assert!(done.load(Ordering::SeqCst));
    assert_eq!(store.counters().model_a, 0);
    assert_eq!(daemon.scheduler().state(ModelKind::A), RetrainState::Idle);
    assert_eq!(runner.calls(), vec![
      Step::Train(ModelKind::A),
      Step::Predict,
      Step::Explain,
      Step::Insights
    ]);
  }

  #[tokio::test]
  async fn stops_immediately_when_already_signalled() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(ScriptedRunner::new());
    let daemon = Daemon::new(store, Arc::clone(&runner), &config());

    daemon.run(std::future::ready(())).await;
    assert!(runner.calls().is_empty());
  }
}
