//! Job table: submission, observable progress, cancellation and cleanup.
//!
//! Each job runs on its own task. An outer guard task awaits the pipeline
//! task, so a panic, a cancellation or an error always ends in
//! [`JobState::Error`] and success always ends in [`JobState::Completed`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, Instrument};

use crate::domain::{JobError, JobId, JobRequest, JobState, JobStatus};
use crate::handbook::{Catalog, Phase};
use crate::obs;
use crate::pipeline::PipelineFactory;

/// Publishes one job's status. Cheap to clone.
///
/// Progress never decreases, and once the job is completed or failed every
/// further update is ignored.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<JobStatus>>,
    catalog: Catalog,
}

impl ProgressReporter {
    pub fn new(initial: JobStatus, catalog: Catalog) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            catalog,
        }
    }

    /// A reporter for a run outside any registry (CLI foreground runs).
    pub fn detached(request: &JobRequest, catalog: Catalog) -> Self {
        let status = JobStatus::queued(
            JobId::generate(),
            request,
            catalog.phase_label(Phase::Queued),
        );
        Self::new(status, catalog)
    }

    pub fn job_id(&self) -> JobId {
        self.tx.borrow().id.clone()
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog
    }

    pub fn snapshot(&self) -> JobStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.tx.subscribe()
    }

    /// Move to `label` at `progress`. Lower progress values are ignored.
    pub fn phase(&self, label: impl Into<String>, progress: u8) {
        let label = label.into();
        let progress = progress.min(100);
        self.tx.send_if_modified(|status| {
            if status.status.is_terminal() || progress < status.progress {
                return false;
            }
            status.status = JobState::Running;
            status.phase = label;
            status.progress = progress;
            true
        });
    }

    /// Enter a well-known phase using the catalog's label.
    pub fn enter(&self, phase: Phase, progress: u8) {
        self.phase(self.catalog.phase_label(phase), progress);
    }

    pub fn complete(&self, video_path: PathBuf) {
        let label = self.catalog.phase_label(Phase::Completed);
        self.tx.send_if_modified(|status| {
            if status.status.is_terminal() {
                return false;
            }
            status.status = JobState::Completed;
            status.phase = label;
            status.progress = 100;
            status.video_path = Some(video_path);
            true
        });
    }

    /// The only transition allowed to leave progress where it is.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|status| {
            if status.status.is_terminal() {
                return false;
            }
            status.status = JobState::Error;
            status.error = Some(reason);
            true
        });
    }
}

/// Handle returned by [`JobRegistry::submit`].
pub struct JobHandle {
    pub id: JobId,
    abort: AbortHandle,
    guard: JoinHandle<JobStatus>,
    rx: watch::Receiver<JobStatus>,
}

impl JobHandle {
    /// Abort the pipeline task. The job ends in `Error`.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// Wait for the job to reach a terminal state.
    pub async fn join(self) -> JobStatus {
        match self.guard.await {
            Ok(status) => status,
            Err(_) => self.rx.borrow().clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.rx.clone()
    }
}

struct JobEntry {
    reporter: ProgressReporter,
    abort: AbortHandle,
}

/// Draw ids from `next` until one is not already in `jobs`.
fn fresh_id(jobs: &HashMap<JobId, JobEntry>, mut next: impl FnMut() -> JobId) -> JobId {
    loop {
        let id = next();
        if !jobs.contains_key(&id) {
            return id;
        }
    }
}

/// Injected, lock-protected job table.
///
/// Entries live until [`JobRegistry::remove`] or process exit.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
    factory: Arc<dyn PipelineFactory>,
    catalog: Catalog,
}

impl JobRegistry {
    pub fn new(factory: Arc<dyn PipelineFactory>, catalog: Catalog) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            factory,
            catalog,
        }
    }

    /// Record a queued job and start it. Returns immediately.
    pub async fn submit(&self, request: JobRequest) -> JobHandle {
        // Held until the entry is inserted so a concurrent submit cannot take the same id.
        let mut jobs = self.jobs.write().await;
        let id = fresh_id(&jobs, JobId::generate);
        let reporter = ProgressReporter::new(
            JobStatus::queued(id.clone(), &request, self.catalog.phase_label(Phase::Queued)),
            self.catalog,
        );

        let inner = {
            let factory = Arc::clone(&self.factory);
            let reporter = reporter.clone();
            let id = id.clone();
            let span = obs::run_span(id.as_str());
            tokio::spawn(
                async move {
                    match factory.build(&id) {
                        Ok(coordinator) => coordinator.run(&request, &reporter).await,
                        Err(e) => Err(e),
                    }
                }
                .instrument(span),
            )
        };
        let abort = inner.abort_handle();

        let guard = {
            let reporter = reporter.clone();
            let id = id.clone();
            tokio::spawn(async move {
                match inner.await {
                    Ok(Ok(result)) => reporter.complete(result.final_video),
                    Ok(Err(e)) => {
                        obs::emit_run_failed(id.as_str(), &e);
                        reporter.fail(e.to_string());
                    }
                    Err(e) if e.is_cancelled() => {
                        obs::emit_run_failed(id.as_str(), &"cancelled");
                        reporter.fail("cancelled");
                    }
                    Err(e) => {
                        obs::emit_run_failed(id.as_str(), &e);
                        reporter.fail(format!("internal error: {e}"));
                    }
                }
                reporter.snapshot()
            })
        };

        let rx = reporter.subscribe();
        jobs.insert(
            id.clone(),
            JobEntry {
                reporter,
                abort: abort.clone(),
            },
        );
        drop(jobs);
        info!(job_id = %id, "job submitted");

        JobHandle {
            id,
            abort,
            guard,
            rx,
        }
    }

    pub async fn status(&self, id: &JobId) -> Result<JobStatus, JobError> {
        let jobs = self.jobs.read().await;
        jobs.get(id)
            .map(|entry| entry.reporter.snapshot())
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<JobStatus> = jobs.values().map(|e| e.reporter.snapshot()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Abort a job's pipeline task. A no-op for finished jobs.
    pub async fn cancel(&self, id: &JobId) -> Result<(), JobError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(id).ok_or_else(|| JobError::NotFound(id.to_string()))?;
        entry.abort.abort();
        info!(job_id = %id, "job cancel requested");
        Ok(())
    }

    /// Drop a finished job from the table.
    pub async fn remove(&self, id: &JobId) -> Result<JobStatus, JobError> {
        let mut jobs = self.jobs.write().await;
        let status = jobs
            .get(id)
            .map(|e| e.reporter.snapshot())
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        if !status.status.is_terminal() {
            return Err(JobError::StillRunning(id.to_string()));
        }
        jobs.remove(id);
        Ok(status)
    }
}
