mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{attribute_failure, program, FakeStudio, HangingRenderer};
use reelsmith_core::domain::{JobError, JobId, JobRequest, JobState, Topic};
use reelsmith_core::fakes::{ScriptedModel, ScriptedRenderer};
use reelsmith_core::handbook::Catalog;
use reelsmith_core::jobs::JobRegistry;

fn request(topic: &str) -> JobRequest {
    JobRequest::new(Topic::new(topic).unwrap())
}

fn registry(studio: FakeStudio) -> JobRegistry {
    JobRegistry::new(Arc::new(studio), Catalog::default())
}

#[tokio::test]
async fn completed_job_reports_path_and_full_progress() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeStudio::succeeding(dir.path()));

    let handle = registry.submit(request("Basic Derivatives")).await;
    let id = handle.id.clone();
    let mut rx = handle.subscribe();

    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        loop {
            let status = rx.borrow_and_update().clone();
            seen.push(status.progress);
            if status.status.is_terminal() || rx.changed().await.is_err() {
                break;
            }
        }
        seen
    });

    let status = handle.join().await;
    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.progress, 100);
    assert_eq!(
        status.video_path,
        Some(dir.path().join(id.as_str()).join("final_video.mp4"))
    );
    assert_eq!(registry.status(&id).await.unwrap(), status);

    let seen = watcher.await.unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {seen:?}");
}

#[tokio::test]
async fn exhausted_job_ends_in_error_with_last_report() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(ScriptedRenderer::new((1..=5).map(attribute_failure).collect()));
    let studio = FakeStudio::new(dir.path(), renderer)
        .with_coder(ScriptedModel::new((1..=5).map(program).collect()));
    let registry = registry(studio);

    let status = registry.submit(request("Limits")).await.join().await;

    assert_eq!(status.status, JobState::Error);
    let error = status.error.unwrap();
    assert!(error.contains("marker_5"), "{error}");
    assert!(status.video_path.is_none());
}

#[tokio::test]
async fn panicking_worker_ends_in_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut studio = FakeStudio::succeeding(dir.path());
    studio.panic_on_build = true;
    let registry = registry(studio);

    let handle = registry.submit(request("Integrals")).await;
    let id = handle.id.clone();
    let status = handle.join().await;

    assert_eq!(status.status, JobState::Error);
    assert!(status.error.unwrap().contains("internal error"));
    assert_eq!(registry.status(&id).await.unwrap().status, JobState::Error);
}

#[tokio::test]
async fn cancelled_job_ends_in_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeStudio::new(dir.path(), Arc::new(HangingRenderer)));

    let handle = registry.submit(request("Series")).await;
    let id = handle.id.clone();

    // Wait until the job is stuck inside the renderer.
    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !rx.borrow_and_update().phase.starts_with("Attempt") {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    assert!(matches!(
        registry.remove(&id).await,
        Err(JobError::StillRunning(_))
    ));

    registry.cancel(&id).await.unwrap();
    let status = handle.join().await;
    assert_eq!(status.status, JobState::Error);
    assert_eq!(status.error.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeStudio::succeeding(dir.path()));
    let missing = JobId::from("deadbeef");

    assert!(matches!(
        registry.status(&missing).await,
        Err(JobError::NotFound(_))
    ));
    assert!(matches!(
        registry.cancel(&missing).await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_jobs_are_tracked_and_removable() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(FakeStudio::succeeding(dir.path()));

    let a = registry.submit(request("Vectors")).await;
    let b = registry.submit(request("Matrices")).await;
    let (ida, idb) = (a.id.clone(), b.id.clone());
    assert_ne!(ida, idb);

    let (sa, sb) = tokio::join!(a.join(), b.join());
    assert_eq!(sa.status, JobState::Completed);
    assert_eq!(sb.status, JobState::Completed);

    let listed = registry.list().await;
    assert_eq!(listed.len(), 2);

    let removed = registry.remove(&ida).await.unwrap();
    assert_eq!(removed.id, ida);
    assert!(matches!(
        registry.status(&ida).await,
        Err(JobError::NotFound(_))
    ));
    assert_eq!(registry.list().await.len(), 1);
    assert!(registry.status(&idb).await.is_ok());
}
