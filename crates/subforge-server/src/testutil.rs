//! Shared test doubles for server-crate tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use subforge_core::retry::RetryConfig;
use subforge_engine::classify::LexicalClassifier;
use subforge_engine::fallback::{FallbackChain, LocalTranscriber};
use subforge_engine::orchestrator::OrchestratorConfig;
use subforge_engine::provider::{
    LanguageHint, RawSegment, TranscriptionProvider, TranslationProvider,
};
use subforge_engine::{
    CircuitBreaker, ContentClass, ProviderError, QualityFilter, TranscriptionOrchestrator,
    TranslateConfig, TranslationStage,
};
use subforge_media::{MediaError, MediaToolkit, SegmenterConfig};

use crate::admission::AdmissionController;
use crate::config::ServerConfig;
use crate::jobs::JobStore;
use crate::pipeline::JobPipeline;

/// Toolkit double: every file is 30 s long, extraction writes a tiny WAV.
pub(crate) struct HarnessToolkit {
    fail_extract: AtomicBool,
}

#[async_trait]
impl MediaToolkit for HarnessToolkit {
    async fn probe_duration(&self, _path: &Path) -> Result<Option<f64>, MediaError> {
        Ok(Some(30.0))
    }

    async fn extract_audio(&self, _input: &Path, output: &Path) -> Result<(), MediaError> {
        if self.fail_extract.load(Ordering::SeqCst) {
            return Err(MediaError::Toolkit {
                tool: "ffmpeg",
                message: "simulated extraction failure".into(),
            });
        }
        tokio::fs::write(output, b"RIFFwav").await?;
        Ok(())
    }

    async fn extract_clip(
        &self,
        _input: &Path,
        output: &Path,
        _start: f64,
        _duration: f64,
    ) -> Result<(), MediaError> {
        tokio::fs::write(output, b"RIFFclip").await?;
        Ok(())
    }
}

/// Transcriber double returning a fixed segment list.
pub(crate) struct FixedTranscriber {
    segments: Vec<RawSegment>,
}

#[async_trait]
impl TranscriptionProvider for FixedTranscriber {
    async fn transcribe(
        &self,
        _audio: &Path,
        _language: &LanguageHint,
    ) -> Result<Vec<RawSegment>, ProviderError> {
        Ok(self.segments.clone())
    }
}

/// Translator double prefixing every line with `XL:`.
pub(crate) struct EchoTranslator;

#[async_trait]
impl TranslationProvider for EchoTranslator {
    async fn translate(
        &self,
        lines: &[String],
        _target: &str,
        _profile: ContentClass,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(lines.iter().map(|l| format!("XL:{l}")).collect())
    }
}

/// A transcriber that emits `texts` as consecutive 2-second segments.
pub(crate) fn scripted_segments(texts: &[&str]) -> Arc<FixedTranscriber> {
    let segments = texts
        .iter()
        .enumerate()
        .map(|(i, text)| RawSegment {
            start: i as f64 * 2.0,
            end: (i + 1) as f64 * 2.0,
            text: (*text).to_owned(),
        })
        .collect();
    Arc::new(FixedTranscriber { segments })
}

/// Fully wired pipeline + stores over temp directories.
pub(crate) struct TestHarness {
    pub config: Arc<ServerConfig>,
    pub jobs: Arc<JobStore>,
    pub admission: Arc<AdmissionController>,
    pub pipeline: Arc<JobPipeline>,
    toolkit: Arc<HarnessToolkit>,
    _dirs: tempfile::TempDir,
}

impl TestHarness {
    pub(crate) async fn new(provider: Arc<FixedTranscriber>) -> Self {
        let dirs = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            upload_dir: dirs.path().join("uploads"),
            temp_dir: dirs.path().join("temp"),
            download_dir: dirs.path().join("downloads"),
            sse_interval: Duration::from_millis(10),
            ..ServerConfig::default()
        };
        for dir in [&config.upload_dir, &config.temp_dir, &config.download_dir] {
            tokio::fs::create_dir_all(dir).await.unwrap();
        }
        let config = Arc::new(config);

        let toolkit = Arc::new(HarnessToolkit {
            fail_extract: AtomicBool::new(false),
        });
        let toolkit_dyn: Arc<dyn MediaToolkit> = toolkit.clone();
        let jobs = Arc::new(JobStore::new());
        let admission = Arc::new(AdmissionController::default());

        let filter = Arc::new(QualityFilter::with_defaults());
        let fallback = FallbackChain::with_local(
            toolkit_dyn.clone(),
            LocalTranscriber::with_binary("definitely-not-a-real-binary-4217"),
        );
        let orchestrator = TranscriptionOrchestrator::new(
            provider,
            Arc::new(CircuitBreaker::default()),
            toolkit_dyn.clone(),
            filter,
            fallback,
            OrchestratorConfig {
                chunk_threshold_bytes: 1024 * 1024,
                retry: RetryConfig {
                    max_attempts: 3,
                    base_delay_ms: 0,
                    max_delay_ms: 0,
                    jitter_ms: 0,
                },
                max_consecutive_failures: 3,
            },
            SegmenterConfig::default(),
        );
        let translator = TranslationStage::new(
            Arc::new(EchoTranslator),
            TranslateConfig {
                batch_pause_ms: 0,
                ..TranslateConfig::default()
            },
        );

        let pipeline = Arc::new(JobPipeline::new(
            toolkit_dyn,
            orchestrator,
            translator,
            Arc::new(LexicalClassifier::default()),
            jobs.clone(),
            config.clone(),
        ));

        Self {
            config,
            jobs,
            admission,
            pipeline,
            toolkit,
            _dirs: dirs,
        }
    }

    /// Make the next audio extraction fail.
    pub(crate) fn fail_extraction(&self) {
        self.toolkit.fail_extract.store(true, Ordering::SeqCst);
    }

    /// Drop a fake upload into the upload directory.
    pub(crate) async fn write_upload(&self, name: &str, size: usize) -> PathBuf {
        let path = self.config.upload_dir.join(name);
        tokio::fs::write(&path, vec![0u8; size]).await.unwrap();
        path
    }
}
