//! The job pipeline: extract → transcribe → translate → format → persist.
//!
//! One pipeline run owns one job. Stages execute strictly sequentially and
//! report progress to the [`JobStore`] at stage boundaries (0→25
//! extraction, 25→50 transcription, 50→75 translation, 75→90 formatting,
//! 100 completion). Every temp file the run creates is removed on success
//! and failure alike; only the caption artifacts in the download directory
//! survive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use subforge_core::caption::{render_srt, render_vtt};
use subforge_core::{JobId, Subtitle};
use subforge_engine::classify::ContentClassifier;
use subforge_engine::orchestrator::ProgressFn;
use subforge_engine::{EngineError, LanguageHint, TranscriptionOrchestrator, TranslationStage};
use subforge_media::{MediaError, MediaToolkit};

use crate::config::ServerConfig;
use crate::jobs::{JobStatus, JobStore};

/// What a successful run hands back to the HTTP layer.
#[derive(Clone, Debug)]
pub struct JobOutput {
    /// Final subtitle sequence (translated when requested).
    pub subtitles: Vec<Subtitle>,
    /// Source media duration, when the probe could determine it.
    pub duration: Option<f64>,
}

/// Pipeline failure; the message is surfaced to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Toolkit/segmentation failure.
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Engine failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Disk I/O failure while persisting artifacts.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes jobs end to end.
pub struct JobPipeline {
    toolkit: Arc<dyn MediaToolkit>,
    orchestrator: TranscriptionOrchestrator,
    translator: TranslationStage,
    classifier: Arc<dyn ContentClassifier>,
    jobs: Arc<JobStore>,
    config: Arc<ServerConfig>,
}

impl JobPipeline {
    /// Wire up a pipeline from its collaborators.
    pub fn new(
        toolkit: Arc<dyn MediaToolkit>,
        orchestrator: TranscriptionOrchestrator,
        translator: TranslationStage,
        classifier: Arc<dyn ContentClassifier>,
        jobs: Arc<JobStore>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            toolkit,
            orchestrator,
            translator,
            classifier,
            jobs,
            config,
        }
    }

    /// Run a job to completion, updating the store and cleaning up temp
    /// files on both success and failure paths.
    pub async fn run(
        &self,
        job_id: &JobId,
        upload: &Path,
        source: &LanguageHint,
        target: &str,
    ) -> Result<JobOutput, PipelineError> {
        let audio = self.audio_path(job_id);
        let result = self.run_inner(job_id, upload, &audio, source, target).await;

        remove_quietly(upload).await;
        remove_quietly(&audio).await;

        match &result {
            Ok(_) => self.jobs.complete(job_id),
            Err(e) => self.jobs.fail(job_id, e.to_string()),
        }
        result
    }

    async fn run_inner(
        &self,
        job_id: &JobId,
        upload: &Path,
        audio: &Path,
        source: &LanguageHint,
        target: &str,
    ) -> Result<JobOutput, PipelineError> {
        // Metadata probe runs against the original upload; a file the
        // toolkit cannot read still fails later with a precise error.
        let duration = self.toolkit.probe_duration(upload).await.ok().flatten();

        self.jobs
            .update(job_id, JobStatus::Extracting, 5, "Extracting audio...");
        self.toolkit.extract_audio(upload, audio).await?;

        self.jobs
            .update(job_id, JobStatus::Transcribing, 25, "Transcribing audio...");
        let progress = self.transcription_progress(job_id.clone());
        let subtitles = self
            .orchestrator
            .transcribe(audio, source, Some(progress))
            .await?;

        self.jobs
            .update(job_id, JobStatus::Translating, 50, "Translating subtitles...");
        let subtitles = if should_translate(source, target) && !subtitles.is_empty() {
            let analysis = self.classifier.classify(&subtitles);
            info!(job = %job_id, class = %analysis.class, target, "translating");
            self.translator.translate(&subtitles, target, analysis).await?
        } else {
            subtitles
        };

        self.jobs
            .update(job_id, JobStatus::Formatting, 75, "Formatting captions...");
        self.persist_captions(job_id, &subtitles).await?;
        self.jobs
            .update(job_id, JobStatus::Formatting, 90, "Finalizing...");

        Ok(JobOutput {
            subtitles,
            duration,
        })
    }

    /// Progress sink mapping the orchestrator's chunk fraction onto the
    /// 25–50 band of the job's progress.
    fn transcription_progress(&self, job_id: JobId) -> ProgressFn {
        let jobs = self.jobs.clone();
        Arc::new(move |fraction: f32| {
            let progress = 25 + (fraction.clamp(0.0, 1.0) * 25.0) as u8;
            jobs.update(
                &job_id,
                JobStatus::Transcribing,
                progress,
                "Transcribing audio...",
            );
        })
    }

    async fn persist_captions(
        &self,
        job_id: &JobId,
        subtitles: &[Subtitle],
    ) -> Result<(), PipelineError> {
        let srt = self.caption_path(job_id, "srt");
        let vtt = self.caption_path(job_id, "vtt");
        tokio::fs::write(&srt, render_srt(subtitles)).await?;
        tokio::fs::write(&vtt, render_vtt(subtitles)).await?;
        info!(job = %job_id, srt = %srt.display(), vtt = %vtt.display(), "caption files written");
        Ok(())
    }

    /// Scratch path for a job's audio extract.
    #[must_use]
    pub fn audio_path(&self, job_id: &JobId) -> PathBuf {
        self.config.temp_dir.join(format!("{job_id}_audio.wav"))
    }

    /// Artifact path for a job's caption file.
    #[must_use]
    pub fn caption_path(&self, job_id: &JobId, extension: &str) -> PathBuf {
        self.config
            .download_dir
            .join(format!("{job_id}_subtitles.{extension}"))
    }
}

/// Translation runs only for an explicit source language that differs from
/// the target.
fn should_translate(source: &LanguageHint, target: &str) -> bool {
    match source {
        LanguageHint::Auto => false,
        LanguageHint::Code(code) => !target.is_empty() && code != target,
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "temp file cleanup failed");
        }
    }
}
