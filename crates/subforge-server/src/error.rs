//! Structured API errors.
//!
//! Every error response has the shape
//! `{"success": false, "error": <message>, "code": <CODE>, ...}` with an
//! optional job id and code-specific extras (`waitSeconds`,
//! `activeUploadId`).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use subforge_core::JobId;

/// A structured API error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    job_id: Option<JobId>,
    extra: Vec<(&'static str, Value)>,
}

impl ApiError {
    /// Generic constructor.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            job_id: None,
            extra: Vec::new(),
        }
    }

    /// Attach the job id to the response body.
    #[must_use]
    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Attach an extra body field.
    #[must_use]
    pub fn with_field(mut self, key: &'static str, value: Value) -> Self {
        self.extra.push((key, value));
        self
    }

    /// An upload is already running for this client.
    #[must_use]
    pub fn upload_in_progress(active_job: JobId) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "UPLOAD_IN_PROGRESS",
            "an upload is already in progress for this client",
        )
        .with_field("activeUploadId", json!(active_job.as_str()))
    }

    /// Client must wait out the cool-down window.
    #[must_use]
    pub fn rate_limited(wait_seconds: u64) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            format!("uploads too frequent, wait {wait_seconds} second(s)"),
        )
        .with_field("waitSeconds", json!(wait_seconds))
    }

    /// The multipart body had no media file.
    #[must_use]
    pub fn no_file() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "NO_FILE", "no media file provided")
    }

    /// The uploaded file was empty.
    #[must_use]
    pub fn empty_file() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "EMPTY_FILE",
            "the uploaded file is empty (0 bytes)",
        )
    }

    /// The upload exceeded the body cap.
    #[must_use]
    pub fn file_too_large() -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "FILE_TOO_LARGE",
            "file too large (maximum 10GB)",
        )
    }

    /// Extension or MIME type outside the allowlist.
    #[must_use]
    pub fn unsupported_format(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT", detail)
    }

    /// Unknown job id.
    #[must_use]
    pub fn job_not_found(job_id: JobId) -> Self {
        Self::new(StatusCode::NOT_FOUND, "JOB_NOT_FOUND", "job not found").with_job(job_id)
    }

    /// Unsupported caption format in a download path.
    #[must_use]
    pub fn invalid_format() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "INVALID_FORMAT",
            "unsupported format, use srt or vtt",
        )
    }

    /// Caption file missing on disk.
    #[must_use]
    pub fn file_not_found(job_id: JobId) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "FILE_NOT_FOUND",
            "subtitle file not found",
        )
        .with_job(job_id)
    }

    /// The pipeline failed.
    #[must_use]
    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "PROCESSING_ERROR",
            message,
        )
    }

    /// Response code (tests).
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        });
        if let Some(job_id) = &self.job_id {
            body["jobId"] = json!(job_id.as_str());
        }
        for (key, value) in self.extra {
            body[key] = value;
        }
        (self.status, Json(body)).into_response()
    }
}
