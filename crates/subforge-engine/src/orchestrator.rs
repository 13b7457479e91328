//! Transcription Orchestrator.
//!
//! Drives the remote provider per audio chunk with retry, backoff and the
//! shared circuit breaker, degrades failed chunks to placeholder subtitles,
//! and falls back to the alternative transcription path when the provider
//! is unusable at the job level.
//!
//! Chunk transcription is strictly sequential — deliberately so: the
//! provider rate-limits aggressively, and interleaved calls would make the
//! breaker's consecutive-failure accounting meaningless.
//!
//! Each chunk runs an explicit state machine (`Pending → InFlight →
//! {Succeeded, Retrying, FailedPlaceholder}`) driven by one controller
//! loop, so the retry/backoff/breaker interaction is testable without I/O.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use subforge_core::Subtitle;
use subforge_core::retry::RetryConfig;
use subforge_core::subtitle::{renumber, stitch};
use subforge_media::segmenter::cleanup;
use subforge_media::{AudioSegment, MediaToolkit, Segmenter, SegmenterConfig};

use crate::breaker::CircuitBreaker;
use crate::error::{EngineError, ProviderError};
use crate::fallback::FallbackChain;
use crate::filter::QualityFilter;
use crate::provider::{LanguageHint, TranscriptionProvider};

/// Audio larger than this is routed through the segmenter (20 MB).
pub const CHUNK_THRESHOLD_BYTES: u64 = 20 * 1024 * 1024;

/// Orchestrator tuning.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Size above which audio is segmented before transcription.
    pub chunk_threshold_bytes: u64,
    /// Per-chunk retry parameters.
    pub retry: RetryConfig,
    /// Consecutive chunk failures that abort the remaining chunks.
    pub max_consecutive_failures: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: CHUNK_THRESHOLD_BYTES,
            retry: RetryConfig::default(),
            max_consecutive_failures: 3,
        }
    }
}

/// Lifecycle of one chunk inside the controller loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// Not yet attempted.
    Pending,
    /// A provider call is in flight.
    InFlight {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Waiting out the backoff before another attempt.
    Retrying {
        /// Attempt that just failed.
        attempt: u32,
    },
    /// A transcript was obtained.
    Succeeded,
    /// Attempts exhausted; the chunk degrades to a placeholder.
    FailedPlaceholder,
}

/// Progress callback: fraction of chunks finished, in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

enum ChunkOutcome {
    Transcribed(Vec<Subtitle>),
    Empty,
    Failed(ProviderError),
}

/// Orchestrates chunked transcription against the remote provider.
pub struct TranscriptionOrchestrator {
    provider: Arc<dyn TranscriptionProvider>,
    breaker: Arc<CircuitBreaker>,
    segmenter: Segmenter,
    toolkit: Arc<dyn MediaToolkit>,
    filter: Arc<QualityFilter>,
    fallback: FallbackChain,
    config: OrchestratorConfig,
}

impl TranscriptionOrchestrator {
    /// Wire up an orchestrator from its collaborators.
    pub fn new(
        provider: Arc<dyn TranscriptionProvider>,
        breaker: Arc<CircuitBreaker>,
        toolkit: Arc<dyn MediaToolkit>,
        filter: Arc<QualityFilter>,
        fallback: FallbackChain,
        config: OrchestratorConfig,
        segmenter_config: SegmenterConfig,
    ) -> Self {
        Self {
            provider,
            breaker,
            segmenter: Segmenter::new(toolkit.clone(), segmenter_config),
            toolkit,
            filter,
            fallback,
            config,
        }
    }

    /// Transcribe `audio`, returning an ordered subtitle sequence.
    ///
    /// The primary provider path is tried first; if it is unusable at the
    /// job level, the alternative path produces a degraded sequence instead
    /// of failing the job.
    pub async fn transcribe(
        &self,
        audio: &Path,
        language: &LanguageHint,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<Subtitle>, EngineError> {
        match self.transcribe_primary(audio, language, progress).await {
            Ok(subtitles) => Ok(subtitles),
            Err(e) => {
                warn!(error = %e, "primary transcription path unusable, engaging alternative path");
                Ok(self.fallback.transcribe(audio, language).await)
            }
        }
    }

    async fn transcribe_primary(
        &self,
        audio: &Path,
        language: &LanguageHint,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<Subtitle>, EngineError> {
        let size = tokio::fs::metadata(audio)
            .await
            .map_err(subforge_media::MediaError::Io)?
            .len();

        if size > self.config.chunk_threshold_bytes {
            info!(size, "audio exceeds provider threshold, segmenting");
            let segments = self.segmenter.split(audio).await?;
            return self
                .transcribe_chunks(audio, &segments, language, progress)
                .await;
        }

        // Small file: one chunk spanning the whole extract.
        let duration = self
            .toolkit
            .probe_duration(audio)
            .await
            .ok()
            .flatten()
            .unwrap_or(0.0);
        let chunk = AudioSegment {
            path: audio.to_path_buf(),
            start: 0.0,
            duration,
            index: 0,
        };
        let outcome = self.run_chunk(&chunk, language).await;
        if let Some(report) = &progress {
            report(1.0);
        }
        match outcome {
            ChunkOutcome::Transcribed(mut subtitles) => {
                renumber(&mut subtitles);
                Ok(subtitles)
            }
            ChunkOutcome::Empty => {
                if duration > 0.0 {
                    Ok(vec![no_speech_placeholder(&chunk)])
                } else {
                    Ok(Vec::new())
                }
            }
            ChunkOutcome::Failed(e) => Err(e.into()),
        }
    }

    async fn transcribe_chunks(
        &self,
        source: &Path,
        segments: &[AudioSegment],
        language: &LanguageHint,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<Subtitle>, EngineError> {
        let total = segments.len();
        let mut all: Vec<Subtitle> = Vec::new();
        let mut consecutive_failures = 0u32;

        for (i, segment) in segments.iter().enumerate() {
            info!(chunk = i + 1, total, start = segment.start, "transcribing chunk");
            let outcome = self.run_chunk(segment, language).await;

            if segment.path != source {
                let _ = tokio::fs::remove_file(&segment.path).await;
            }

            match outcome {
                ChunkOutcome::Transcribed(subtitles) => {
                    stitch(&mut all, &subtitles, segment.start);
                    consecutive_failures = 0;
                }
                ChunkOutcome::Empty => {
                    debug!(chunk = i + 1, "chunk produced no speech, inserting marker");
                    all.push(no_speech_placeholder(segment));
                }
                ChunkOutcome::Failed(e) => {
                    consecutive_failures += 1;
                    warn!(
                        chunk = i + 1,
                        consecutive_failures,
                        error = %e,
                        "chunk transcription failed"
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        warn!("too many consecutive chunk failures, aborting remaining chunks");
                        cleanup(&segments[i + 1..]).await;
                        break;
                    }
                    all.push(failed_placeholder(segment, &e));
                }
            }

            if let Some(report) = &progress {
                report((i + 1) as f32 / total as f32);
            }
        }

        renumber(&mut all);
        Ok(all)
    }

    /// Run the per-chunk state machine to completion.
    async fn run_chunk(&self, chunk: &AudioSegment, language: &LanguageHint) -> ChunkOutcome {
        let max_attempts = self.config.retry.max_attempts;
        let mut state = ChunkState::Pending;
        debug!(?state, chunk = chunk.index, "chunk queued");
        let mut last_error: Option<ProviderError> = None;

        for attempt in 1..=max_attempts {
            state = ChunkState::InFlight { attempt };
            debug!(?state, chunk = chunk.index, "chunk attempt");

            match self.attempt_chunk(chunk, language).await {
                Ok(subtitles) => {
                    if subtitles.is_empty() {
                        debug!(chunk = chunk.index, "chunk transcript empty");
                        return ChunkOutcome::Empty;
                    }
                    let stats = self.filter.stats(&subtitles);
                    if self.filter.is_catastrophic(stats) && attempt < max_attempts {
                        // The provider answered, but with garbage; count it
                        // against the breaker and try again.
                        self.breaker.record_failure(Instant::now());
                        state = ChunkState::Retrying { attempt };
                        debug!(?state, ?stats, "transcript quality catastrophic, retrying");
                        self.backoff(attempt).await;
                        continue;
                    }
                    state = ChunkState::Succeeded;
                    debug!(?state, count = subtitles.len(), "chunk transcribed");
                    return ChunkOutcome::Transcribed(subtitles);
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable || attempt == max_attempts {
                        break;
                    }
                    state = ChunkState::Retrying { attempt };
                    debug!(?state, "retryable chunk failure, backing off");
                    self.backoff(attempt).await;
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| ProviderError::InvalidResponse("chunk loop made no attempt".into()));

        // Connectivity trouble gets one shot over the secondary transport
        // before the chunk degrades.
        if error.is_connectivity() {
            match self.attempt_secondary(chunk, language).await {
                Ok(subtitles) if subtitles.is_empty() => return ChunkOutcome::Empty,
                Ok(subtitles) => return ChunkOutcome::Transcribed(subtitles),
                Err(e) => warn!(error = %e, "secondary transport path failed"),
            }
        }

        state = ChunkState::FailedPlaceholder;
        debug!(?state, chunk = chunk.index, "chunk degrades to placeholder");
        ChunkOutcome::Failed(error)
    }

    async fn attempt_chunk(
        &self,
        chunk: &AudioSegment,
        language: &LanguageHint,
    ) -> Result<Vec<Subtitle>, ProviderError> {
        self.breaker.check(Instant::now())?;
        match self.provider.transcribe(&chunk.path, language).await {
            Ok(raw) => {
                self.breaker.record_success();
                Ok(self.filter_raw(raw, language))
            }
            Err(e) => {
                self.breaker.record_failure(Instant::now());
                Err(e)
            }
        }
    }

    async fn attempt_secondary(
        &self,
        chunk: &AudioSegment,
        language: &LanguageHint,
    ) -> Result<Vec<Subtitle>, ProviderError> {
        match self.provider.transcribe_secondary(&chunk.path, language).await {
            Ok(raw) => {
                self.breaker.record_success();
                Ok(self.filter_raw(raw, language))
            }
            Err(e) => {
                self.breaker.record_failure(Instant::now());
                Err(e)
            }
        }
    }

    fn filter_raw(
        &self,
        raw: Vec<crate::provider::RawSegment>,
        language: &LanguageHint,
    ) -> Vec<Subtitle> {
        let subtitles: Vec<Subtitle> = raw
            .into_iter()
            .enumerate()
            .map(|(i, s)| Subtitle::new((i + 1) as u32, s.start, s.end, s.text))
            .collect();
        self.filter.clean(subtitles, language).subtitles
    }

    async fn backoff(&self, attempt: u32) {
        let random = rand::rng().random_range(0.0..1.0);
        let delay = self.config.retry.delay_ms(attempt, random);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

fn no_speech_placeholder(segment: &AudioSegment) -> Subtitle {
    Subtitle::new(
        (segment.index + 1) as u32,
        segment.start,
        segment.start + segment.duration,
        "[No detectable speech in this segment]",
    )
}

fn failed_placeholder(segment: &AudioSegment, error: &ProviderError) -> Subtitle {
    Subtitle::new(
        (segment.index + 1) as u32,
        segment.start,
        segment.start + segment.duration,
        format!(
            "[Segment {} transcription unavailable: {error}]",
            segment.index + 1
        ),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use subforge_core::subtitle::is_ordered;
    use subforge_media::MediaError;

    use crate::breaker::{BreakerState, CircuitBreakerConfig};
    use crate::fallback::LocalTranscriber;
    use crate::provider::RawSegment;

    use super::*;

    // ── test doubles ────────────────────────────────────────────────────

    struct FakeToolkit {
        source_duration: Option<f64>,
        bytes_per_sec: u64,
        durations: Mutex<HashMap<PathBuf, f64>>,
    }

    impl FakeToolkit {
        fn new(source_duration: f64, bytes_per_sec: u64) -> Self {
            Self {
                source_duration: Some(source_duration),
                bytes_per_sec,
                durations: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl MediaToolkit for FakeToolkit {
        async fn probe_duration(&self, path: &Path) -> Result<Option<f64>, MediaError> {
            if let Some(d) = self.durations.lock().unwrap().get(path) {
                return Ok(Some(*d));
            }
            Ok(self.source_duration)
        }

        async fn extract_audio(&self, _input: &Path, output: &Path) -> Result<(), MediaError> {
            tokio::fs::write(output, b"wav").await?;
            Ok(())
        }

        async fn extract_clip(
            &self,
            _input: &Path,
            output: &Path,
            _start: f64,
            duration: f64,
        ) -> Result<(), MediaError> {
            let size = (duration * self.bytes_per_sec as f64) as usize;
            tokio::fs::write(output, vec![0u8; size]).await?;
            let _ = self
                .durations
                .lock()
                .unwrap()
                .insert(output.to_path_buf(), duration);
            Ok(())
        }
    }

    type Script = Box<dyn Fn(usize, &Path) -> Result<Vec<RawSegment>, ProviderError> + Send + Sync>;

    struct ScriptedProvider {
        calls: AtomicUsize,
        secondary_calls: AtomicUsize,
        script: Script,
        secondary: Option<Vec<RawSegment>>,
    }

    impl ScriptedProvider {
        fn new(script: Script) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                secondary_calls: AtomicUsize::new(0),
                script,
                secondary: None,
            }
        }
    }

    #[async_trait]
    impl TranscriptionProvider for ScriptedProvider {
        async fn transcribe(
            &self,
            audio: &Path,
            _language: &LanguageHint,
        ) -> Result<Vec<RawSegment>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(call, audio)
        }

        async fn transcribe_secondary(
            &self,
            _audio: &Path,
            _language: &LanguageHint,
        ) -> Result<Vec<RawSegment>, ProviderError> {
            let _ = self.secondary_calls.fetch_add(1, Ordering::SeqCst);
            match &self.secondary {
                Some(segments) => Ok(segments.clone()),
                None => Err(ProviderError::Network("secondary down too".into())),
            }
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
        }
    }

    fn orchestrator_with(
        provider: Arc<ScriptedProvider>,
        toolkit: Arc<FakeToolkit>,
        breaker: Arc<CircuitBreaker>,
    ) -> TranscriptionOrchestrator {
        let filter = Arc::new(QualityFilter::with_defaults());
        let fallback = FallbackChain::with_local(
            toolkit.clone(),
            LocalTranscriber::with_binary("definitely-not-a-real-binary-4217"),
        );
        TranscriptionOrchestrator::new(
            provider,
            breaker,
            toolkit,
            filter,
            fallback,
            OrchestratorConfig {
                chunk_threshold_bytes: 1000,
                retry: fast_retry(),
                max_consecutive_failures: 3,
            },
            SegmenterConfig {
                target_duration_secs: 180.0,
                max_segment_bytes: 25 * 1024 * 1024,
            },
        )
    }

    async fn small_audio(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("audio.wav");
        tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();
        path
    }

    async fn large_audio(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("audio.wav");
        tokio::fs::write(&path, vec![0u8; 5000]).await.unwrap();
        path
    }

    /// Four 45-second segments covering one 180 s chunk.
    fn chunk_segments() -> Vec<RawSegment> {
        ["part one", "part two", "part three", "part four"]
            .iter()
            .enumerate()
            .map(|(i, text)| RawSegment {
                start: i as f64 * 45.0,
                end: (i + 1) as f64 * 45.0,
                text: (*text).to_owned(),
            })
            .collect()
    }

    // ── small-file path ─────────────────────────────────────────────────

    #[tokio::test]
    async fn small_file_single_chunk_success() {
        let dir = tempfile::tempdir().unwrap();
        let audio = small_audio(&dir).await;
        let provider = Arc::new(ScriptedProvider::new(Box::new(|_, _| {
            Ok(vec![RawSegment {
                start: 0.0,
                end: 3.0,
                text: "hello world".into(),
            }])
        })));
        let toolkit = Arc::new(FakeToolkit::new(30.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, Arc::default());

        let subs = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].text, "hello world");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_failure_then_success_retries() {
        let dir = tempfile::tempdir().unwrap();
        let audio = small_audio(&dir).await;
        let provider = Arc::new(ScriptedProvider::new(Box::new(|call, _| {
            if call == 0 {
                Err(ProviderError::Api {
                    status: 500,
                    message: "flaky".into(),
                })
            } else {
                Ok(vec![RawSegment {
                    start: 0.0,
                    end: 2.0,
                    text: "recovered".into(),
                }])
            }
        })));
        let toolkit = Arc::new(FakeToolkit::new(30.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, Arc::default());

        let subs = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();
        assert_eq!(subs[0].text, "recovered");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_failure_fails_fast_to_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let audio = small_audio(&dir).await;
        let provider = Arc::new(ScriptedProvider::new(Box::new(|_, _| {
            Err(ProviderError::Auth("bad key".into()))
        })));
        let toolkit = Arc::new(FakeToolkit::new(30.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, Arc::default());

        let subs = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();
        // Auth is terminal: one attempt, no secondary transport, synthetic fallback.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.secondary_calls.load(Ordering::SeqCst), 0);
        assert!(!subs.is_empty());
        assert!(is_ordered(&subs));
    }

    #[tokio::test]
    async fn connectivity_failure_tries_secondary_transport_once() {
        let dir = tempfile::tempdir().unwrap();
        let audio = small_audio(&dir).await;
        let mut provider = ScriptedProvider::new(Box::new(|_, _| {
            Err(ProviderError::Network("reset".into()))
        }));
        provider.secondary = Some(vec![RawSegment {
            start: 0.0,
            end: 2.0,
            text: "via secondary".into(),
        }]);
        let provider = Arc::new(provider);
        let toolkit = Arc::new(FakeToolkit::new(30.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, Arc::default());

        let subs = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();
        assert_eq!(subs[0].text, "via secondary");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert_eq!(provider.secondary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_provider() {
        let dir = tempfile::tempdir().unwrap();
        let audio = small_audio(&dir).await;
        let provider = Arc::new(ScriptedProvider::new(Box::new(|_, _| {
            Ok(vec![RawSegment {
                start: 0.0,
                end: 1.0,
                text: "should never be reached".into(),
            }])
        })));
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let now = Instant::now();
        for _ in 0..5 {
            breaker.record_failure(now);
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let toolkit = Arc::new(FakeToolkit::new(30.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, breaker);

        let subs = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();
        // Provider untouched; synthetic fallback produced something.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(!subs.is_empty());
    }

    // ── chunked path ────────────────────────────────────────────────────

    #[tokio::test]
    async fn forty_five_minute_scenario_with_one_flaky_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let audio = large_audio(&dir).await;
        // 2700 s source → 15 × 180 s chunks. One retryable failure on the
        // 6th chunk, then success on its retry.
        let failed_once = AtomicUsize::new(0);
        let provider = Arc::new(ScriptedProvider::new(Box::new(move |_, path: &Path| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if name.contains("segment_5") && failed_once.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ProviderError::Api {
                    status: 502,
                    message: "bad gateway".into(),
                });
            }
            Ok(chunk_segments())
        })));
        let toolkit = Arc::new(FakeToolkit::new(2700.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, Arc::default());

        let progress_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = progress_seen.clone();
        let subs = orch
            .transcribe(
                &audio,
                &LanguageHint::Auto,
                Some(Arc::new(move |f| sink.lock().unwrap().push(f))),
            )
            .await
            .unwrap();

        // 15 chunks × 4 subtitles, contiguous indices, ordered times.
        assert_eq!(subs.len(), 60);
        assert!(is_ordered(&subs));
        for (i, s) in subs.iter().enumerate() {
            assert_eq!(s.index, (i + 1) as u32);
        }

        // No gap or duplicate range at the chunk-6 boundary (900–1080 s).
        let chunk6 = &subs[20..24];
        assert!((chunk6[0].start - 900.0).abs() < 1e-9);
        assert!((chunk6[0].end - 945.0).abs() < 1e-9);
        assert!((chunk6[3].end - 1080.0).abs() < 1e-9);
        assert!((subs[19].end - 900.0).abs() < 1e-9);
        assert!((subs[24].start - 1080.0).abs() < 1e-9);

        // 15 chunk calls plus the one retry.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 16);

        // Progress reached completion monotonically.
        let seen = progress_seen.lock().unwrap();
        assert!((seen.last().copied().unwrap() - 1.0).abs() < f32::EPSILON);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn failed_chunk_becomes_placeholder_and_job_continues() {
        let dir = tempfile::tempdir().unwrap();
        let audio = large_audio(&dir).await;
        // 540 s → 3 chunks; the middle one always fails terminally.
        let provider = Arc::new(ScriptedProvider::new(Box::new(|_, path: &Path| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if name.contains("segment_1") {
                Err(ProviderError::Api {
                    status: 400,
                    message: "rejected".into(),
                })
            } else {
                Ok(chunk_segments())
            }
        })));
        let toolkit = Arc::new(FakeToolkit::new(540.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, Arc::default());

        let subs = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();

        // 4 + placeholder + 4 subtitles.
        assert_eq!(subs.len(), 9);
        let placeholder = &subs[4];
        assert!(placeholder.text.contains("transcription unavailable"));
        assert!((placeholder.start - 180.0).abs() < 1e-9);
        assert!((placeholder.end - 360.0).abs() < 1e-9);
        assert!(is_ordered(&subs));
    }

    #[tokio::test]
    async fn three_consecutive_failures_abort_remaining_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let audio = large_audio(&dir).await;
        // 900 s → 5 chunks; everything fails terminally.
        let provider = Arc::new(ScriptedProvider::new(Box::new(|_, _| {
            Err(ProviderError::Api {
                status: 400,
                message: "rejected".into(),
            })
        })));
        let toolkit = Arc::new(FakeToolkit::new(900.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, Arc::default());

        let subs = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();

        // Chunks 1 and 2 degrade to placeholders; the third consecutive
        // failure aborts without a placeholder, and chunks 4–5 never run.
        assert_eq!(subs.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

        // No chunk files left behind.
        for i in 0..5 {
            let clip = dir.path().join(format!("audio_segment_{i}.wav"));
            assert!(!tokio::fs::try_exists(&clip).await.unwrap(), "clip {i} leaked");
        }
    }

    #[tokio::test]
    async fn empty_chunk_gets_no_speech_marker() {
        let dir = tempfile::tempdir().unwrap();
        let audio = large_audio(&dir).await;
        // 360 s → 2 chunks; the first returns nothing.
        let provider = Arc::new(ScriptedProvider::new(Box::new(|_, path: &Path| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if name.contains("segment_0") {
                Ok(Vec::new())
            } else {
                Ok(chunk_segments())
            }
        })));
        let toolkit = Arc::new(FakeToolkit::new(360.0, 1));
        let orch = orchestrator_with(provider.clone(), toolkit, Arc::default());

        let subs = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();
        assert_eq!(subs.len(), 5);
        assert!(subs[0].text.contains("No detectable speech"));
        assert!((subs[0].end - 180.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn chunk_files_removed_after_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let audio = large_audio(&dir).await;
        let provider = Arc::new(ScriptedProvider::new(Box::new(|_, _| Ok(chunk_segments()))));
        let toolkit = Arc::new(FakeToolkit::new(360.0, 1));
        let orch = orchestrator_with(provider, toolkit, Arc::default());

        let _ = orch
            .transcribe(&audio, &LanguageHint::Auto, None)
            .await
            .unwrap();
        for i in 0..2 {
            let clip = dir.path().join(format!("audio_segment_{i}.wav"));
            assert!(!tokio::fs::try_exists(&clip).await.unwrap());
        }
        // The source extract itself is the pipeline's to clean up.
        assert!(tokio::fs::try_exists(&audio).await.unwrap());
    }
}
