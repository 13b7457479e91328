//! # subforge-server
//!
//! HTTP surface and job lifecycle for subforge:
//!
//! - [`admission`]: per-client admission control (in-flight exclusion +
//!   cool-down rate limit)
//! - [`jobs`]: process-wide job progress store with monotonic progress
//! - [`pipeline`]: the extract → transcribe → translate → format pipeline
//! - [`routes`]: axum router (submit, status, SSE progress, downloads)
//! - [`sweeper`]: cancellable periodic sweeps (job expiry, admission cache)
//! - [`config`]: environment-driven configuration

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod routes;
pub mod sweeper;
pub mod validate;

#[cfg(test)]
mod testutil;

pub use admission::{AdmissionController, AdmissionRejection};
pub use config::ServerConfig;
pub use error::ApiError;
pub use jobs::{JobStatus, JobStore, JobView};
pub use pipeline::{JobOutput, JobPipeline};
pub use routes::{AppState, router};
