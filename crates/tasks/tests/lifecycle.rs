use std::sync::Arc;

use mlswarm_core::{ChunkId, EstimatorId, TaskId, TaskKind, TaskStatus};
use mlswarm_services::RawProperties;
use mlswarm_tasks::{
    Dispatcher, NewChunk, NewEstimator, NewTask, ReportDirs, Swarm, TaskError,
};
use serde_json::json;

struct Setup {
    swarm: Swarm,
    chunk: ChunkId,
    _tmp: tempfile::TempDir,
}

fn setup(csv: &str) -> Setup {
    let tmp = tempfile::tempdir().unwrap();
    let swarm = Swarm::in_memory(ReportDirs::new(tmp.path()));
    let ds = swarm.create_dataset("line").unwrap();
    let chunk = swarm.add_chunk(ds.id, NewChunk::csv(csv)).unwrap().id;
    Setup {
        swarm,
        chunk,
        _tmp: tmp,
    }
}

fn estimator(swarm: &Swarm, service: &str, target: &str) -> EstimatorId {
    swarm
        .create_estimator(NewEstimator {
            name: None,
            service: service.into(),
            properties: json!({ "target": target }).into(),
        })
        .unwrap()
        .id
}

fn task(
    swarm: &Swarm,
    kind: TaskKind,
    estimator_id: EstimatorId,
    chunk: ChunkId,
    training_id: Option<TaskId>,
    properties: serde_json::Value,
) -> TaskId {
    swarm
        .create_task(NewTask {
            kind,
            owner_id: "analyst".into(),
            estimator_id,
            chunk_ids: vec![chunk],
            training_id,
            properties: RawProperties::from(properties),
        })
        .unwrap()
}

const LINE: &str = "x,y\n0,1\n1,3\n2,5\n3,7\n4,9";

#[test]
fn train_test_predict_end_to_end() {
    let s = setup(LINE);
    let est = estimator(&s.swarm, "simple-regressor", "y");

    let training = task(
        &s.swarm,
        TaskKind::Training,
        est,
        s.chunk,
        None,
        json!({"learning_rate": "0.1", "epochs": 3000}),
    );
    let trained = s.swarm.start(training).unwrap();
    assert_eq!(trained.status, TaskStatus::Completed, "{:?}", trained.errors);
    let report_dir = trained.report_dir.clone().unwrap();
    assert!(report_dir.join("model.json").is_file());
    assert!(s.swarm.get_report(training).unwrap().is_some());

    let test = task(&s.swarm, TaskKind::Test, est, s.chunk, Some(training), json!({}));
    let tested = s.swarm.start(test).unwrap();
    assert_eq!(tested.status, TaskStatus::Completed, "{:?}", tested.errors);
    let report = tested.report().unwrap();
    assert!(report["r2"].as_f64().unwrap() > 0.99);

    let predict = task(&s.swarm, TaskKind::Predict, est, s.chunk, Some(training), json!({}));
    let predicted = s.swarm.start(predict).unwrap();
    assert_eq!(predicted.status, TaskStatus::Completed);
    assert_eq!(predicted.output.unwrap()["predictions"].as_array().unwrap().len(), 5);
}

#[test]
fn failing_training_is_rolled_back() {
    let s = setup(LINE);
    // The target column does not exist, so training fails after setup.
    let est = estimator(&s.swarm, "simple-regressor", "price");
    let id = task(&s.swarm, TaskKind::Training, est, s.chunk, None, json!({}));

    let done = s.swarm.start(id).unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.errors.as_deref().unwrap().contains("price"));
    assert!(done.finished_at.unwrap() >= done.started_at.unwrap());
    assert!(!done.report_dir.unwrap().exists());
    assert!(s.swarm.get_report(id).unwrap().is_none());
}

#[test]
fn test_against_failed_training_fails() {
    let s = setup(LINE);
    let est = estimator(&s.swarm, "simple-regressor", "y");
    let training = task(
        &s.swarm,
        TaskKind::Training,
        est,
        s.chunk,
        None,
        json!({"learning_rate": 1000.0, "epochs": 100}),
    );
    let trained = s.swarm.start(training).unwrap();
    assert_eq!(trained.status, TaskStatus::Failed);

    let test = task(&s.swarm, TaskKind::Test, est, s.chunk, Some(training), json!({}));
    let tested = s.swarm.start(test).unwrap();
    assert_eq!(tested.status, TaskStatus::Failed);
    assert!(tested.errors.unwrap().contains("no trained model"));
}

#[test]
fn interrupted_task_records_no_errors() {
    let s = setup(LINE);
    let est = estimator(&s.swarm, "nearest-centroid-classifier", "y");
    let id = task(&s.swarm, TaskKind::Training, est, s.chunk, None, json!({}));

    assert!(s.swarm.interrupt(id).unwrap());
    let done = s.swarm.start(id).unwrap();
    assert_eq!(done.status, TaskStatus::Interrupted);
    assert!(done.errors.is_none());
    assert!(done.finished_at.is_some());
    assert!(s.swarm.get_report(id).unwrap().is_none());
}

#[test]
fn distinct_tasks_get_distinct_report_dirs() {
    let s = setup(LINE);
    let est = estimator(&s.swarm, "nearest-centroid-classifier", "y");
    let a = task(&s.swarm, TaskKind::Training, est, s.chunk, None, json!({}));
    let b = task(&s.swarm, TaskKind::Training, est, s.chunk, None, json!({}));

    let a = s.swarm.start(a).unwrap();
    let b = s.swarm.start(b).unwrap();
    assert_eq!(a.status, TaskStatus::Completed);
    assert_eq!(b.status, TaskStatus::Completed);
    assert_ne!(a.report_dir, b.report_dir);
}

#[test]
fn terminal_task_is_not_restarted() {
    let s = setup(LINE);
    let est = estimator(&s.swarm, "nearest-centroid-classifier", "y");
    let id = task(&s.swarm, TaskKind::Training, est, s.chunk, None, json!({}));
    let first = s.swarm.start(id).unwrap();

    let err = s.swarm.start(id).unwrap_err();
    assert!(matches!(err, TaskError::NotStartable { status: TaskStatus::Completed, .. }));
    assert_eq!(s.swarm.get_task(id).unwrap(), first);
}

#[test]
fn invalid_task_properties_are_field_keyed() {
    let s = setup(LINE);
    let est = estimator(&s.swarm, "simple-regressor", "y");
    let err = s
        .swarm
        .create_task(NewTask {
            kind: TaskKind::Training,
            owner_id: "analyst".into(),
            estimator_id: est,
            chunk_ids: vec![s.chunk],
            training_id: None,
            properties: r#"{"epochs": "lots"}"#.into(),
        })
        .unwrap_err();
    assert!(err.to_string().contains("epochs"));
    assert!(s.swarm.list_tasks().unwrap().is_empty());
}

#[test]
fn dispatched_task_completes_in_background() {
    let s = setup(LINE);
    let est = estimator(&s.swarm, "simple-regressor", "y");
    let id = task(&s.swarm, TaskKind::Training, est, s.chunk, None, json!({}));

    let swarm = Arc::new(s.swarm);
    let dispatcher = Dispatcher::new(2).unwrap();
    let done = dispatcher.dispatch(Arc::clone(&swarm), id).wait().unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(swarm.get_task(id).unwrap().status, TaskStatus::Completed);
}
