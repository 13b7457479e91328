//! HTTP routes.
//!
//! The submit endpoint accepts one media file plus language fields as
//! multipart form data, runs the pipeline in a detached task (a dropped
//! client connection never cancels a job), and answers with the finished
//! subtitle payload. Progress is observable concurrently via polling and
//! a 2-second server-sent-event stream.

use std::convert::Infallible;
use std::time::Instant;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::Stream;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tower_http::trace::TraceLayer;
use tracing::info;

use subforge_core::{CaptionFormat, ClientKey, JobId};
use subforge_engine::LanguageHint;

use crate::admission::{AdmissionController, AdmissionRejection};
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::jobs::JobStore;
use crate::pipeline::{JobOutput, JobPipeline};
use crate::validate::{unique_filename, validate_upload};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job progress store.
    pub jobs: Arc<JobStore>,
    /// Admission controller.
    pub admission: Arc<AdmissionController>,
    /// Job pipeline.
    pub pipeline: Arc<JobPipeline>,
    /// Process start, for the health endpoint.
    pub started_at: Instant,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes as usize;
    Router::new()
        .route("/health", get(health))
        .route("/api/subtitles/generate", post(generate))
        .route("/api/subtitles/status/{job_id}", get(status))
        .route("/api/subtitles/progress/{job_id}", get(progress))
        .route("/api/subtitles/download/{job_id}/{format}", get(download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "activeJobs": state.jobs.len(),
    }))
}

/// POST /api/subtitles/generate
async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let client = client_key(&headers);
    let job_id = state
        .admission
        .admit(&client, Instant::now())
        .map_err(|rejection| match rejection {
            AdmissionRejection::InFlight { job_id } => ApiError::upload_in_progress(job_id),
            AdmissionRejection::RateLimited { wait_seconds } => {
                ApiError::rate_limited(wait_seconds)
            }
        })?;

    let upload = match save_upload(&state, multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            // Validation failed before a job existed; free the slot now.
            state.admission.release(&client, Instant::now());
            return Err(e.with_job(job_id));
        }
    };

    state.jobs.create(job_id.clone(), client.clone());
    info!(
        job = %job_id,
        file = %upload.original_name,
        size = upload.size,
        source = %upload.source,
        target = %upload.target,
        "upload accepted"
    );

    let pipeline = state.pipeline.clone();
    let admission = state.admission.clone();
    let task_job = job_id.clone();
    let task_client = client.clone();
    let path = upload.path.clone();
    let source = upload.source.clone();
    let target = upload.target.clone();

    // The pipeline runs detached so a dropped connection cannot cancel it;
    // the handler merely awaits the result when the client stays around.
    let handle = tokio::spawn(async move {
        let result = pipeline.run(&task_job, &path, &source, &target).await;
        admission.release(&task_client, Instant::now());
        result.map_err(|e| e.to_string())
    });

    match handle.await {
        Ok(Ok(output)) => Ok(Json(success_body(&job_id, &upload, &output))),
        Ok(Err(message)) => Err(ApiError::processing(message).with_job(job_id)),
        Err(e) => Err(ApiError::processing(format!("job task failed: {e}")).with_job(job_id)),
    }
}

/// GET /api/subtitles/status/{job_id}
async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = JobId::from(job_id);
    match state.jobs.get(&id) {
        Some(view) => Ok(Json(serde_json::to_value(view).unwrap_or_default())),
        None => Err(ApiError::job_not_found(id)),
    }
}

/// GET /api/subtitles/progress/{job_id} — server-sent events.
async fn progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = JobId::from(job_id);
    let jobs = state.jobs.clone();
    let interval = state.config.sse_interval;

    let stream = async_stream::stream! {
        loop {
            match jobs.get(&id) {
                Some(view) => {
                    let terminal = view.status.is_terminal();
                    let event = Event::default()
                        .json_data(&view)
                        .unwrap_or_else(|_| Event::default().data("{}"));
                    yield Ok(event);
                    if terminal {
                        break;
                    }
                }
                None => {
                    let body = json!({
                        "status": "not_found",
                        "progress": 0,
                        "message": "job not found",
                        "jobId": id.as_str(),
                    });
                    yield Ok(Event::default().data(body.to_string()));
                    break;
                }
            }
            tokio::time::sleep(interval).await;
        }
    };
    Sse::new(stream)
}

/// GET /api/subtitles/download/{job_id}/{format}
async fn download(
    State(state): State<AppState>,
    Path((job_id, format)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let id = JobId::from(job_id);
    let format: CaptionFormat = format
        .parse()
        .map_err(|_| ApiError::invalid_format())?;

    let path = state.pipeline.caption_path(&id, format.extension());
    let contents = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::file_not_found(id))?;

    let disposition = format!("attachment; filename=\"subtitles.{}\"", format.extension());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        contents,
    )
        .into_response())
}

struct SavedUpload {
    path: PathBuf,
    original_name: String,
    size: u64,
    source: LanguageHint,
    target: String,
}

/// Stream the multipart body to disk, validating as fields arrive.
async fn save_upload(state: &AppState, mut multipart: Multipart) -> Result<SavedUpload, ApiError> {
    let mut saved: Option<(PathBuf, String, u64)> = None;
    let mut source = LanguageHint::Auto;
    let mut target = "en".to_owned();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("video") | Some("file") => {
                let original_name = field
                    .file_name()
                    .map(str::to_owned)
                    .unwrap_or_else(|| "upload".to_owned());
                let content_type = field.content_type().map(str::to_owned);
                validate_upload(&original_name, content_type.as_deref())
                    .map_err(ApiError::unsupported_format)?;

                let disk_name =
                    unique_filename(&original_name, chrono::Utc::now().timestamp_millis());
                let path = state.config.upload_dir.join(disk_name);
                let mut file = tokio::fs::File::create(&path)
                    .await
                    .map_err(|e| ApiError::processing(format!("cannot store upload: {e}")))?;

                let mut size: u64 = 0;
                loop {
                    match field.chunk().await.map_err(multipart_error) {
                        Ok(Some(chunk)) => {
                            size += chunk.len() as u64;
                            file.write_all(&chunk).await.map_err(|e| {
                                ApiError::processing(format!("write failed: {e}"))
                            })?;
                        }
                        Ok(None) => break,
                        Err(e) => {
                            drop(file);
                            let _ = tokio::fs::remove_file(&path).await;
                            return Err(e);
                        }
                    }
                }
                file.flush()
                    .await
                    .map_err(|e| ApiError::processing(format!("flush failed: {e}")))?;

                if size == 0 {
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(ApiError::empty_file());
                }
                saved = Some((path, original_name, size));
            }
            Some("sourceLanguage") => {
                let text = field.text().await.map_err(multipart_error)?;
                source = text.parse().unwrap_or(LanguageHint::Auto);
            }
            Some("targetLanguage") => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    target = text.trim().to_lowercase();
                }
            }
            _ => {}
        }
    }

    let (path, original_name, size) = saved.ok_or_else(ApiError::no_file)?;
    Ok(SavedUpload {
        path,
        original_name,
        size,
        source,
        target,
    })
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::file_too_large()
    } else {
        ApiError::new(StatusCode::BAD_REQUEST, "UPLOAD_ERROR", error.to_string())
    }
}

fn success_body(job_id: &JobId, upload: &SavedUpload, output: &JobOutput) -> Value {
    json!({
        "success": true,
        "jobId": job_id.as_str(),
        "subtitles": output.subtitles,
        "downloads": {
            "srt": format!("/api/subtitles/download/{job_id}/srt"),
            "vtt": format!("/api/subtitles/download/{job_id}/vtt"),
        },
        "metadata": {
            "sourceLanguage": upload.source.to_string(),
            "targetLanguage": upload.target,
            "duration": output.duration,
            "segmentCount": output.subtitles.len(),
            "fileSize": upload.size,
            "originalName": upload.original_name,
        },
    })
}

/// Client identity: network origin (forwarded-for, first hop) plus the
/// client-agent string.
fn client_key(headers: &HeaderMap) -> ClientKey {
    let origin = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown");
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    ClientKey::from_parts(origin, agent)
}
