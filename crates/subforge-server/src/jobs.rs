//! Job Progress Store.
//!
//! One process-wide map from job id to job state. Each job is mutated only
//! by its own pipeline task (stages run strictly sequentially per job), and
//! read concurrently by the status/SSE endpoints — `DashMap` keeps readers
//! from ever blocking writers.
//!
//! Progress is monotonic non-decreasing while a job is active; only a
//! failure resets it (to 0, with status `failed`). A periodic sweep deletes
//! jobs once their age exceeds the retention window.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use subforge_core::{ClientKey, JobId};

/// Lifecycle states surfaced to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Audio is being extracted from the upload.
    Extracting,
    /// Chunks are being transcribed.
    Transcribing,
    /// The subtitle sequence is being translated.
    Translating,
    /// Caption files are being rendered and persisted.
    Formatting,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Unknown job id (only ever sent, never stored).
    NotFound,
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::NotFound)
    }
}

/// Client-facing snapshot of a job.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    /// Current status.
    pub status: JobStatus,
    /// Progress in percent, 0–100.
    pub progress: u8,
    /// Human-readable stage message.
    pub message: String,
    /// Submission wall-clock time in epoch milliseconds.
    pub start_time: i64,
}

struct JobEntry {
    status: JobStatus,
    progress: u8,
    message: String,
    client: ClientKey,
    start_time_ms: i64,
    created_at: Instant,
    updated_at: Instant,
}

/// Process-wide job table.
#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<JobId, JobEntry>,
}

impl JobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly admitted job.
    pub fn create(&self, job_id: JobId, client: ClientKey) {
        let now = Instant::now();
        let _ = self.jobs.insert(
            job_id,
            JobEntry {
                status: JobStatus::Extracting,
                progress: 0,
                message: "Preparing upload...".to_owned(),
                client,
                start_time_ms: chrono::Utc::now().timestamp_millis(),
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Advance a job's stage.
    ///
    /// Progress never moves backwards while the job is active; a stale or
    /// out-of-order update keeps the higher value.
    pub fn update(&self, job_id: &JobId, status: JobStatus, progress: u8, message: impl Into<String>) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.status = status;
            entry.progress = entry.progress.max(progress.min(100));
            entry.message = message.into();
            entry.updated_at = Instant::now();
            debug!(job = %job_id, ?status, progress = entry.progress, "job progress");
        }
    }

    /// Mark a job completed at 100 %.
    pub fn complete(&self, job_id: &JobId) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.status = JobStatus::Completed;
            entry.progress = 100;
            entry.message = "Done".to_owned();
            entry.updated_at = Instant::now();
            info!(job = %job_id, "job completed");
        }
    }

    /// Mark a job failed: progress resets to 0 and the message carries the
    /// error surfaced to the caller.
    pub fn fail(&self, job_id: &JobId, message: impl Into<String>) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.status = JobStatus::Failed;
            entry.progress = 0;
            entry.message = message.into();
            entry.updated_at = Instant::now();
            info!(job = %job_id, "job failed");
        }
    }

    /// Snapshot a job for a client.
    #[must_use]
    pub fn get(&self, job_id: &JobId) -> Option<JobView> {
        self.jobs.get(job_id).map(|entry| JobView {
            status: entry.status,
            progress: entry.progress,
            message: entry.message.clone(),
            start_time: entry.start_time_ms,
        })
    }

    /// The client that owns a job.
    #[must_use]
    pub fn owner(&self, job_id: &JobId) -> Option<ClientKey> {
        self.jobs.get(job_id).map(|entry| entry.client.clone())
    }

    /// Delete jobs whose age exceeds `retention`. Returns how many went.
    pub fn sweep_expired(&self, now: Instant, retention: Duration) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|_, entry| now.duration_since(entry.created_at) <= retention);
        let removed = before - self.jobs.len();
        if removed > 0 {
            info!(removed, "swept expired jobs");
        }
        removed
    }

    /// Number of tracked jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
