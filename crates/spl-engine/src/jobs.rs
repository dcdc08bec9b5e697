//! Job tracker.
//!
//! Operations are submitted with their work and return an [`OperationId`]
//! at once. The work runs exactly once on the blocking pool; callers poll
//! [`JobTracker::progress`] or await [`JobTracker::wait`]. State only moves
//! forward: Queued → Running → Succeeded | Failed.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info};
use uuid::Uuid;

use spl_model::{ErrorKind, OperationFailure};
use spl_xml::ProgressMonitor;

use crate::config::JobSettings;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Import,
    Comparison,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Import => "import",
            OperationKind::Comparison => "comparison",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobState<T> {
    Queued,
    Running { percent: u8 },
    Succeeded(T),
    Failed(OperationFailure),
}

impl<T> JobState<T> {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Queued => JobStatus::Queued,
            JobState::Running { .. } => JobStatus::Running,
            JobState::Succeeded(_) => JobStatus::Succeeded,
            JobState::Failed(_) => JobStatus::Failed,
        }
    }
}

/// Snapshot of one operation, as returned by polling.
#[derive(Debug, Clone, Serialize)]
pub struct Progress<T> {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub status: JobStatus,
    pub percent: u8,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationFailure>,
}

// Cancellation phases. A job leaves ACTIVE exactly once.
const ACTIVE: u8 = 0;
const CANCELLED: u8 = 1;
const COMMITTING: u8 = 2;

struct Job<T> {
    kind: OperationKind,
    state: JobState<T>,
    percent: u8,
    submitted_at: DateTime<Utc>,
    finished_at: Option<Instant>,
    phase: Arc<AtomicU8>,
    done: watch::Sender<bool>,
}

impl<T: Clone> Job<T> {
    fn progress(&self, id: OperationId) -> Progress<T> {
        let (result, error) = match &self.state {
            JobState::Succeeded(output) => (Some(output.clone()), None),
            JobState::Failed(failure) => (None, Some(failure.clone())),
            JobState::Queued | JobState::Running { .. } => (None, None),
        };
        Progress {
            operation_id: id,
            kind: self.kind,
            status: self.state.status(),
            percent: self.percent,
            submitted_at: self.submitted_at,
            result,
            error,
        }
    }
}

impl<T> Job<T> {
    fn terminate(&mut self, state: JobState<T>) {
        if matches!(state, JobState::Succeeded(_)) {
            self.percent = 100;
        }
        self.state = state;
        self.finished_at = Some(Instant::now());
        self.done.send_replace(true);
    }
}

struct Shared<T> {
    jobs: Mutex<HashMap<OperationId, Job<T>>>,
    retention: Duration,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<OperationId, Job<T>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle given to running work: progress sink, cancellation source and
/// commit gate.
pub struct JobContext<T> {
    id: OperationId,
    shared: Arc<Shared<T>>,
    phase: Arc<AtomicU8>,
}

impl<T> Clone for JobContext<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            shared: Arc::clone(&self.shared),
            phase: Arc::clone(&self.phase),
        }
    }
}

impl<T> JobContext<T> {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == CANCELLED
    }

    /// Claim the right to commit. After this returns `true`, cancellation
    /// requests are refused; after `false`, the work must not write.
    pub fn begin_commit(&self) -> bool {
        self.phase
            .compare_exchange(ACTIVE, COMMITTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Record progress as a fraction of the whole operation.
    pub fn set_progress(&self, fraction: f64) {
        let percent = (fraction.clamp(0.0, 1.0) * 99.0).round() as u8;
        let mut jobs = self.shared.lock();
        if let Some(job) = jobs.get_mut(&self.id)
            && let JobState::Running { percent: current } = &mut job.state
            && percent > *current
        {
            *current = percent;
            job.percent = percent;
        }
    }

    fn start(&self) -> bool {
        let mut jobs = self.shared.lock();
        match jobs.get_mut(&self.id) {
            Some(job) if matches!(job.state, JobState::Queued) => {
                job.state = JobState::Running { percent: 0 };
                true
            }
            _ => false,
        }
    }

    fn finish(&self, result: std::result::Result<T, OperationFailure>) {
        let mut jobs = self.shared.lock();
        let Some(job) = jobs.get_mut(&self.id) else {
            return;
        };
        if job.state.status().is_terminal() {
            debug!(operation_id = %self.id, "late result ignored");
            return;
        }
        let state = match result {
            Ok(output) => JobState::Succeeded(output),
            Err(failure) => JobState::Failed(failure),
        };
        info!(operation_id = %self.id, status = state.status().as_str(), "operation finished");
        job.terminate(state);
    }
}

impl<T: Send> ProgressMonitor for JobContext<T> {
    fn report(&self, fraction: f64) {
        self.set_progress(fraction);
    }

    fn is_cancelled(&self) -> bool {
        JobContext::is_cancelled(self)
    }
}

pub struct JobTracker<T> {
    shared: Arc<Shared<T>>,
    permits: Arc<Semaphore>,
    runtime: Handle,
}

impl<T> JobTracker<T>
where
    T: Clone + Send + 'static,
{
    /// Create a tracker bound to the current tokio runtime.
    pub fn new(settings: &JobSettings) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        Ok(Self {
            shared: Arc::new(Shared {
                jobs: Mutex::new(HashMap::new()),
                retention: settings.retention(),
            }),
            permits: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            runtime,
        })
    }

    /// Register an operation and schedule `work`. Returns immediately.
    pub fn submit<F>(&self, kind: OperationKind, work: F) -> OperationId
    where
        F: FnOnce(&JobContext<T>) -> std::result::Result<T, OperationFailure> + Send + 'static,
    {
        self.purge_expired();
        let id = OperationId::generate();
        let phase = Arc::new(AtomicU8::new(ACTIVE));
        let (done, _) = watch::channel(false);
        self.shared.lock().insert(
            id,
            Job {
                kind,
                state: JobState::Queued,
                percent: 0,
                submitted_at: Utc::now(),
                finished_at: None,
                phase: Arc::clone(&phase),
                done,
            },
        );

        let context = JobContext {
            id,
            shared: Arc::clone(&self.shared),
            phase,
        };
        let permits = Arc::clone(&self.permits);
        self.runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                context.finish(Err(OperationFailure::new(
                    ErrorKind::Storage,
                    "job queue is closed",
                )));
                return;
            };
            if !context.start() {
                return;
            }
            let worker = context.clone();
            let outcome = tokio::task::spawn_blocking(move || work(&worker)).await;
            let result = outcome.unwrap_or_else(|err| {
                Err(OperationFailure::new(
                    ErrorKind::Storage,
                    format!("operation aborted: {err}"),
                ))
            });
            context.finish(result);
        });
        info!(operation_id = %id, kind = kind.as_str(), "operation submitted");
        id
    }

    /// Current state of an operation. Never triggers work.
    pub fn progress(&self, id: OperationId) -> Result<Progress<T>> {
        self.purge_expired();
        self.shared
            .lock()
            .get(&id)
            .map(|job| job.progress(id))
            .ok_or(EngineError::UnknownOperation(id))
    }

    /// Every retained operation, oldest first.
    pub fn operations(&self) -> Vec<Progress<T>> {
        self.purge_expired();
        let mut all: Vec<Progress<T>> = self
            .shared
            .lock()
            .iter()
            .map(|(id, job)| job.progress(*id))
            .collect();
        all.sort_by_key(|progress| progress.submitted_at);
        all
    }

    /// Wait until the operation reaches a terminal state.
    pub async fn wait(&self, id: OperationId) -> Result<Progress<T>> {
        let mut receiver = self
            .shared
            .lock()
            .get(&id)
            .map(|job| job.done.subscribe())
            .ok_or(EngineError::UnknownOperation(id))?;
        if receiver.wait_for(|done| *done).await.is_err() {
            debug!(operation_id = %id, "operation dropped while waiting");
        }
        self.shared
            .lock()
            .get(&id)
            .map(|job| job.progress(id))
            .ok_or(EngineError::UnknownOperation(id))
    }

    /// Request cancellation.
    ///
    /// Queued and running operations move to `Failed(Cancelled)` at once and
    /// `true` is returned. Returns `false` when the operation already
    /// finished or has started committing its results.
    pub fn cancel(&self, id: OperationId) -> Result<bool> {
        let mut jobs = self.shared.lock();
        let job = jobs
            .get_mut(&id)
            .ok_or(EngineError::UnknownOperation(id))?;
        if job.state.status().is_terminal() {
            return Ok(false);
        }
        if job
            .phase
            .compare_exchange(ACTIVE, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(operation_id = %id, "cancel refused, results are being committed");
            return Ok(false);
        }
        job.terminate(JobState::Failed(OperationFailure::cancelled()));
        info!(operation_id = %id, "operation cancelled");
        Ok(true)
    }

    /// Drop terminal operations older than the retention window.
    pub fn purge_expired(&self) -> usize {
        let retention = self.shared.retention;
        let mut jobs = self.shared.lock();
        let before = jobs.len();
        jobs.retain(|_, job| {
            job.finished_at
                .is_none_or(|finished| finished.elapsed() < retention)
        });
        let purged = before - jobs.len();
        if purged > 0 {
            debug!(purged, "expired operations purged");
        }
        purged
    }
}
