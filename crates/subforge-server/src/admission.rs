//! Per-client admission control.
//!
//! A mutual-exclusion gate in front of job creation, not a queue: a client
//! with an in-flight job is rejected with that job's id, and a client whose
//! previous upload completed less than the cool-down window ago is told how
//! long to wait. Rejected callers retry on their own.
//!
//! State is a pair of small maps behind one sync lock; checks take `now`
//! explicitly so tests control the clock, and no lock is held across an
//! await point.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use subforge_core::{ClientKey, JobId};

/// Admission tuning.
#[derive(Clone, Copy, Debug)]
pub struct AdmissionConfig {
    /// Minimum wall-clock gap between a client's uploads (default 5 s).
    pub cooldown: Duration,
    /// How long completion timestamps are kept (default 1 h).
    pub history_retention: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            history_retention: Duration::from_secs(60 * 60),
        }
    }
}

/// Why a submission was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionRejection {
    /// The client already has a job running.
    InFlight {
        /// The running job's id.
        job_id: JobId,
    },
    /// The client must wait out the cool-down.
    RateLimited {
        /// Remaining whole seconds, rounded up.
        wait_seconds: u64,
    },
}

struct Inner {
    active: HashMap<ClientKey, JobId>,
    history: HashMap<ClientKey, Instant>,
}

/// Deduplicates and rate-limits concurrent submissions per client.
pub struct AdmissionController {
    config: AdmissionConfig,
    inner: Mutex<Inner>,
}

impl AdmissionController {
    /// Create a controller.
    #[must_use]
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                active: HashMap::new(),
                history: HashMap::new(),
            }),
        }
    }

    /// Admit or reject a submission from `client` at time `now`.
    ///
    /// On admission the client is marked in-flight under a fresh job id.
    /// Stale history entries are purged opportunistically on every check.
    pub fn admit(&self, client: &ClientKey, now: Instant) -> Result<JobId, AdmissionRejection> {
        let mut inner = self.inner.lock();

        let retention = self.config.history_retention;
        inner
            .history
            .retain(|_, at| now.duration_since(*at) <= retention);

        if let Some(job_id) = inner.active.get(client) {
            debug!(client = %client, job = %job_id, "rejecting: upload already in flight");
            return Err(AdmissionRejection::InFlight {
                job_id: job_id.clone(),
            });
        }

        if let Some(last) = inner.history.get(client) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.config.cooldown {
                let remaining = self.config.cooldown - elapsed;
                let wait_seconds = remaining.as_secs_f64().ceil() as u64;
                debug!(client = %client, wait_seconds, "rejecting: cool-down active");
                return Err(AdmissionRejection::RateLimited { wait_seconds });
            }
        }

        let job_id = JobId::new();
        let _ = inner.active.insert(client.clone(), job_id.clone());
        info!(client = %client, job = %job_id, "admission granted");
        Ok(job_id)
    }

    /// Record completion (success or failure): clear the in-flight marker
    /// and start the cool-down from `now`.
    pub fn release(&self, client: &ClientKey, now: Instant) {
        let mut inner = self.inner.lock();
        let _ = inner.active.remove(client);
        let _ = inner.history.insert(client.clone(), now);
        debug!(client = %client, "admission released");
    }

    /// Drop history entries older than the retention window.
    pub fn purge(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();
        let retention = self.config.history_retention;
        let before = inner.history.len();
        inner
            .history
            .retain(|_, at| now.duration_since(*at) <= retention);
        before - inner.history.len()
    }

    /// Number of clients currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().active.len()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionConfig::default())
    }
}
