//! End-to-end runs over a temporary data directory.

use std::{
  fs,
  sync::{Arc, Mutex},
};

use churn_core::{
  counters::ModelKind,
  dataset::Dataset,
  steps::{Step, StepOutcome, StepRunner},
};
use churn_pipeline::{
  ingest::{IngestOutcome, Ingestor},
  reindex::Reindexer,
  scheduler::{RetrainOutcome, Scheduler},
};
use churn_store_fs::FsStore;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingRunner {
  calls: Mutex<Vec<Step>>,
}

impl StepRunner for RecordingRunner {
  fn run(&self, step: Step) -> impl Future<Output = StepOutcome> + Send + '_ {
    self.calls.lock().unwrap().push(step);
    std::future::ready(StepOutcome::Succeeded)
  }
}

struct Harness {
  dir:       TempDir,
  store:     Arc<FsStore>,
  runner:    Arc<RecordingRunner>,
  scheduler: Scheduler<FsStore, RecordingRunner>,
  ingestor:  Ingestor<FsStore>,
}

async fn harness() -> Harness {
  let dir = TempDir::new().unwrap();
  let store = Arc::new(FsStore::open(dir.path()).await.unwrap());
  let runner = Arc::new(RecordingRunner::default());
  Harness {
    scheduler: Scheduler::new(Arc::clone(&store), Arc::clone(&runner), Default::default()),
    ingestor: Ingestor::new(Arc::clone(&store), 2000),
    dir,
    store,
    runner,
  }
}

impl Harness {
  fn dataset(&self, dataset: Dataset) -> std::path::PathBuf {
    self.store.layout().table_path(dataset)
  }

  fn upload(&self, csv: &str) { fs::write(self.dataset(Dataset::Inbox), csv).unwrap(); }

  fn read(&self, dataset: Dataset) -> String { fs::read_to_string(self.dataset(dataset)).unwrap() }

  async fn ingest(&self) -> IngestOutcome { self.ingestor.ingest(&self.scheduler).await.unwrap() }
}

const UPLOAD: &str = "\
,review,screen,Day_1
0,\"fast, clean\",4,350
1,,,2
2,laggy,8,3
";

#[tokio::test]
async fn upload_flows_through_to_training_tables() {
  let h = harness().await;
  h.upload(UPLOAD);

  let IngestOutcome::Ingested(report) = h.ingest().await else {
    panic!("upload should be ingested");
  };
  assert_eq!((report.first_id, report.last_id), (2000, 2002));

  assert_eq!(
    h.read(Dataset::Main),
    "userid,review,screen,Day_1\n2000,\"fast, clean\",4,350\n2001,,,2\n2002,laggy,8,3\n"
  );
  assert_eq!(
    h.read(Dataset::PreprocessedBatch),
    "userid,review,screen,Day_1\n2000,\"fast, clean\",4,350\n2001,,6,2\n2002,laggy,8,3\n"
  );
  assert_eq!(
    h.read(Dataset::ModelATrain),
    "userid,screen,Day_1\n2000,4,300\n2001,6,2\n2002,8,3\n"
  );
  assert_eq!(h.read(Dataset::ModelBTrain).lines().count(), 3);
  assert!(h.read(Dataset::Inbox).is_empty());

  let counters: serde_json::Value = serde_json::from_str(
    &fs::read_to_string(h.store.layout().counters_path()).unwrap(),
  )
  .unwrap();
  assert_eq!(counters["model_a"], 3);
  assert_eq!(counters["model_b"], 2);

  let archived = fs::read_dir(h.store.layout().archive_dir()).unwrap().count();
  assert_eq!(archived, 1);
  assert_eq!(*h.runner.calls.lock().unwrap(), [Step::Predict, Step::Explain, Step::Insights]);

  // the emptied inbox is not picked up again
  assert_eq!(h.ingest().await, IngestOutcome::NothingToDo);
}

#[tokio::test]
async fn retrain_after_enough_uploads() {
  let h = harness().await;
  for _ in 0..4 {
    h.upload(UPLOAD);
    h.ingest().await;
  }
  // 8 reviewed rows so far; model B is due at 10
  let report = h.scheduler.check_and_retrain().await.unwrap();
  assert!(matches!(report.outcome(ModelKind::B), Some(RetrainOutcome::NotDue { count: 8, .. })));

  h.upload(UPLOAD);
  let IngestOutcome::Ingested(report) = h.ingest().await else {
    panic!("upload should be ingested");
  };
  assert_eq!(report.last_id, 2014);
  let counters = fs::read_to_string(h.store.layout().counters_path()).unwrap();
  let counters: serde_json::Value = serde_json::from_str(&counters).unwrap();
  assert_eq!(counters["model_b"], 0);
  assert_eq!(counters["model_a"], 15);
  assert!(counters["last_retrain_b"].is_string());
}

#[tokio::test]
async fn reindex_compacts_files_and_artifacts() {
  let h = harness().await;
  fs::write(h.dataset(Dataset::Main), "userid,screen\n2005,1\n2010,2\n2007,3\n").unwrap();
  fs::write(h.dataset(Dataset::ModelATrain), "userid,screen\n2010,2\n").unwrap();
  let explanations = h.dir.path().join("outputs/explanations");
  let charts = h.dir.path().join("outputs/charts");
  fs::create_dir_all(&explanations).unwrap();
  fs::create_dir_all(&charts).unwrap();
  fs::write(explanations.join("user_2010.json"), r#"{"user_id": 2010}"#).unwrap();
  fs::write(charts.join("user_2007.png"), b"png").unwrap();

  let report = Reindexer::new(Arc::clone(&h.store), 2000).reindex().await.unwrap();
  assert_eq!(report.map.len(), 3);
  assert!(fs::metadata(&report.apply.backup.location).unwrap().is_dir());

  assert_eq!(h.read(Dataset::Main), "userid,screen\n2000,1\n2002,2\n2001,3\n");
  assert_eq!(h.read(Dataset::ModelATrain), "userid,screen\n2002,2\n");

  let body = fs::read_to_string(explanations.join("user_2002.json")).unwrap();
  let body: serde_json::Value = serde_json::from_str(&body).unwrap();
  assert_eq!(body["user_id"], 2002);
  assert!(!explanations.join("user_2010.json").exists());
  assert_eq!(fs::read(charts.join("user_2001.png")).unwrap(), b"png");
}
