use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use spl_engine::{
    EngineError, JobSettings, JobStatus, JobTracker, OperationId, OperationKind, Progress,
};
use spl_model::{ErrorKind, OperationFailure};

fn tracker(max_concurrent: usize) -> JobTracker<u32> {
    JobTracker::new(&JobSettings {
        retention_secs: 3600,
        max_concurrent,
    })
    .unwrap()
}

async fn until_status(tracker: &JobTracker<u32>, id: OperationId, status: JobStatus) -> Progress<u32> {
    for _ in 0..500 {
        let progress = tracker.progress(id).unwrap();
        if progress.status == status {
            return progress;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("operation {id} never reached {status:?}");
}

#[tokio::test]
async fn test_work_runs_once_however_often_polled() {
    let tracker = tracker(2);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let id = tracker.submit(OperationKind::Import, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(7)
    });

    let done = tracker.wait(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.result, Some(7));
    assert_eq!(done.percent, 100);
    for _ in 0..10 {
        assert_eq!(tracker.progress(id).unwrap().result, Some(7));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_queued_operation_never_runs() {
    let tracker = tracker(1);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let id = tracker.submit(OperationKind::Import, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    });

    assert_eq!(tracker.progress(id).unwrap().status, JobStatus::Queued);
    assert!(tracker.cancel(id).unwrap());

    let done = tracker.wait(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error.unwrap().kind, ErrorKind::Cancelled);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!tracker.cancel(id).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_running_operation() {
    let tracker = tracker(1);
    let id = tracker.submit(OperationKind::Comparison, |context| {
        while !context.is_cancelled() {
            std::thread::sleep(Duration::from_millis(2));
        }
        Err(OperationFailure::cancelled())
    });

    until_status(&tracker, id, JobStatus::Running).await;
    assert!(tracker.cancel(id).unwrap());
    let done = tracker.progress(id).unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error.unwrap().kind, ErrorKind::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_is_refused_once_committing() {
    let tracker = tracker(1);
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let id = tracker.submit(OperationKind::Import, move |context| {
        let admitted = context.begin_commit();
        started_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        if admitted { Ok(3) } else { Err(OperationFailure::cancelled()) }
    });

    started_rx.recv().unwrap();
    assert!(!tracker.cancel(id).unwrap());
    release_tx.send(()).unwrap();

    let done = tracker.wait(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.result, Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_never_goes_backwards() {
    let tracker = tracker(1);
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let id = tracker.submit(OperationKind::Import, move |context| {
        context.set_progress(0.5);
        context.set_progress(0.2);
        started_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        Ok(0)
    });

    started_rx.recv().unwrap();
    let running = tracker.progress(id).unwrap();
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(running.percent, 50);
    release_tx.send(()).unwrap();
    assert_eq!(tracker.wait(id).await.unwrap().percent, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrency_limit_keeps_extra_work_queued() {
    let tracker = tracker(1);
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let first = tracker.submit(OperationKind::Import, move |_| {
        started_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        Ok(1)
    });
    let second = tracker.submit(OperationKind::Import, |_| Ok(2));

    started_rx.recv().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(tracker.progress(second).unwrap().status, JobStatus::Queued);

    release_tx.send(()).unwrap();
    assert_eq!(tracker.wait(first).await.unwrap().result, Some(1));
    assert_eq!(tracker.wait(second).await.unwrap().result, Some(2));
    assert_eq!(tracker.operations().len(), 2);
}

#[tokio::test]
async fn test_failed_work_keeps_its_failure() {
    let tracker = tracker(1);
    let id = tracker.submit(OperationKind::Import, |_| {
        Err(OperationFailure::new(ErrorKind::VersionConflict, "version 2 exists"))
    });
    let done = tracker.wait(id).await.unwrap();
    let failure = done.error.unwrap();
    assert_eq!(failure.kind, ErrorKind::VersionConflict);
    assert_eq!(failure.message, "version 2 exists");
    assert!(done.result.is_none());
}

#[tokio::test]
async fn test_panicking_work_fails_the_operation() {
    let tracker = tracker(1);
    let id = tracker.submit(OperationKind::Import, |_| panic!("boom"));
    let done = tracker.wait(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error.unwrap().kind, ErrorKind::Storage);
}

#[tokio::test]
async fn test_expired_results_are_purged() {
    let tracker: JobTracker<u32> = JobTracker::new(&JobSettings {
        retention_secs: 0,
        max_concurrent: 1,
    })
    .unwrap();
    let id = tracker.submit(OperationKind::Import, |_| Ok(1));
    assert_eq!(tracker.wait(id).await.unwrap().status, JobStatus::Succeeded);

    assert_eq!(tracker.purge_expired(), 1);
    assert!(matches!(
        tracker.progress(id),
        Err(EngineError::UnknownOperation(missing)) if missing == id
    ));
}

#[tokio::test]
async fn test_unknown_operation() {
    let tracker = tracker(1);
    let id: OperationId = "1f0e4b8c-3c1d-4d7e-9a55-0b6f7a3d2e10".parse().unwrap();
    assert!(matches!(tracker.progress(id), Err(EngineError::UnknownOperation(_))));
    assert!(matches!(tracker.cancel(id), Err(EngineError::UnknownOperation(_))));
    assert!(tracker.wait(id).await.is_err());
    assert_eq!(
        tracker.progress(id).unwrap_err().kind(),
        ErrorKind::EntityNotFound
    );
}

#[test]
fn test_tracker_requires_a_runtime() {
    let result = JobTracker::<u32>::new(&JobSettings::default());
    assert!(matches!(result, Err(EngineError::NoRuntime)));
}
