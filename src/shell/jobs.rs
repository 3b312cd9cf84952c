//! Background job tracking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        self != Self::Running
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Snapshot of one job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: JobId,
    pub description: String,
    pub status: JobStatus,
    pub elapsed: Duration,
}

/// Tracks stages started with a trailing `&`.
pub trait JobTracker: Send + Sync {
    /// Record a new running job that stops when `cancel` fires.
    fn register(&self, description: &str, cancel: CancellationToken) -> JobId;

    /// Mark a job finished.
    fn finish(&self, id: JobId, status: JobStatus);

    fn get(&self, id: JobId) -> Option<JobInfo>;

    /// All jobs in id order.
    fn list(&self) -> Vec<JobInfo>;

    /// Request cancellation of a running job. Returns false when the job
    /// is unknown or already finished.
    fn kill(&self, id: JobId) -> bool;

    /// Forget finished jobs; returns how many were removed.
    fn clean(&self) -> usize;
}

#[derive(Debug)]
struct JobRecord {
    description: String,
    status: JobStatus,
    started: Instant,
    finished: Option<Instant>,
    cancel: CancellationToken,
}

impl JobRecord {
    fn info(&self, id: JobId) -> JobInfo {
        let end = self.finished.unwrap_or_else(Instant::now);
        JobInfo {
            id,
            description: self.description.clone(),
            status: self.status,
            elapsed: end.duration_since(self.started),
        }
    }
}

/// In-memory job table.
#[derive(Debug)]
pub struct JobTable {
    next_id: AtomicU64,
    jobs: Mutex<BTreeMap<JobId, JobRecord>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, BTreeMap<JobId, JobRecord>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker for JobTable {
    fn register(&self, description: &str, cancel: CancellationToken) -> JobId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.jobs().insert(
            id,
            JobRecord {
                description: description.to_string(),
                status: JobStatus::Running,
                started: Instant::now(),
                finished: None,
                cancel,
            },
        );
        tracing::debug!(job = id, description, "job started");
        id
    }

    fn finish(&self, id: JobId, status: JobStatus) {
        if let Some(record) = self.jobs().get_mut(&id) {
            record.status = status;
            record.finished = Some(Instant::now());
            tracing::debug!(job = id, %status, "job finished");
        }
    }

    fn get(&self, id: JobId) -> Option<JobInfo> {
        self.jobs().get(&id).map(|record| record.info(id))
    }

    fn list(&self) -> Vec<JobInfo> {
        self.jobs()
            .iter()
            .map(|(id, record)| record.info(*id))
            .collect()
    }

    fn kill(&self, id: JobId) -> bool {
        match self.jobs().get(&id) {
            Some(record) if !record.status.is_finished() => {
                record.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    fn clean(&self) -> usize {
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, record| !record.status.is_finished());
        before - jobs.len()
    }
}
