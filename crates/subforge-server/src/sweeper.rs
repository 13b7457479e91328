//! Periodic maintenance tasks.
//!
//! Two fire-and-forget sweeps owned by the process lifecycle: expired-job
//! deletion and admission-history eviction. Both are plain spawned tasks
//! parked on an interval and cancelled through a [`CancellationToken`] at
//! shutdown — nothing here survives the process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::admission::AdmissionController;
use crate::jobs::JobStore;

/// Spawn the expired-job sweep.
pub fn spawn_job_sweeper(
    jobs: Arc<JobStore>,
    retention: Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; skip it so a fresh boot does
        // not sweep an empty table.
        let _ = ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("job sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let _ = jobs.sweep_expired(Instant::now(), retention);
                }
            }
        }
    })
}

/// Spawn the admission-history eviction sweep.
pub fn spawn_admission_sweeper(
    admission: Arc<AdmissionController>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        let _ = ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("admission sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let _ = admission.purge(Instant::now());
                }
            }
        }
    })
}
