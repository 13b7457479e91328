//! Audio segmentation for provider payload limits.
//!
//! The transcription provider rejects uploads above a hard byte ceiling, so
//! long extracts are cut into equal-length clips of a target duration. A
//! clip that still exceeds the ceiling after encoding is recursively
//! re-split at half the duration and spliced into the output in place.
//!
//! Invariants:
//! - segment durations sum to the source duration
//! - segment start offsets are absolute (relative to the source file)
//! - on failure, every clip produced so far is deleted before the error
//!   propagates — no orphaned temp files

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::MediaError;
use crate::toolkit::MediaToolkit;

/// Hard ceiling on encoded clip size, dictated by the provider (25 MB).
pub const MAX_SEGMENT_BYTES: u64 = 25 * 1024 * 1024;

/// Default target clip duration in seconds.
pub const DEFAULT_TARGET_SECS: f64 = 180.0;

/// Segmenter tuning. The defaults mirror the provider's published limits.
#[derive(Clone, Copy, Debug)]
pub struct SegmenterConfig {
    /// Target clip duration in seconds (default 180).
    pub target_duration_secs: f64,
    /// Maximum encoded clip size in bytes (default 25 MB).
    pub max_segment_bytes: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            target_duration_secs: DEFAULT_TARGET_SECS,
            max_segment_bytes: MAX_SEGMENT_BYTES,
        }
    }
}

/// A time-bounded clip of the audio source.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioSegment {
    /// On-disk clip file (the source file itself when no split was needed).
    pub path: PathBuf,
    /// Absolute start offset within the source, in seconds.
    pub start: f64,
    /// Clip duration in seconds.
    pub duration: f64,
    /// Sequence index within the job.
    pub index: usize,
}

/// Splits audio extracts into provider-sized clips.
pub struct Segmenter {
    toolkit: Arc<dyn MediaToolkit>,
    config: SegmenterConfig,
}

impl Segmenter {
    /// Create a segmenter over the given toolkit.
    pub fn new(toolkit: Arc<dyn MediaToolkit>, config: SegmenterConfig) -> Self {
        Self { toolkit, config }
    }

    /// Split `audio` into ordered segments no larger than the byte ceiling.
    ///
    /// Returns a single segment spanning the whole file (no re-encode) when
    /// the total duration fits the target.
    pub async fn split(&self, audio: &Path) -> Result<Vec<AudioSegment>, MediaError> {
        let mut segments = self
            .split_at(audio, self.config.target_duration_secs)
            .await?;
        for (i, segment) in segments.iter_mut().enumerate() {
            segment.index = i;
        }
        info!(
            count = segments.len(),
            source = %audio.display(),
            "audio segmentation complete"
        );
        Ok(segments)
    }

    fn split_at<'a>(
        &'a self,
        audio: &'a Path,
        target: f64,
    ) -> BoxFuture<'a, Result<Vec<AudioSegment>, MediaError>> {
        Box::pin(async move {
            let total = self
                .toolkit
                .probe_duration(audio)
                .await?
                .ok_or_else(|| MediaError::NoDuration {
                    path: audio.to_path_buf(),
                })?;

            if total <= target {
                debug!(total, target, "source fits a single segment");
                return Ok(vec![AudioSegment {
                    path: audio.to_path_buf(),
                    start: 0.0,
                    duration: total,
                    index: 0,
                }]);
            }

            let count = (total / target).ceil() as usize;
            debug!(total, target, count, "splitting into equal-length clips");

            let mut segments = Vec::with_capacity(count);
            if let Err(e) = self
                .extract_clips(audio, target, total, count, &mut segments)
                .await
            {
                cleanup_except(&segments, audio).await;
                return Err(e);
            }
            Ok(segments)
        })
    }

    async fn extract_clips(
        &self,
        audio: &Path,
        target: f64,
        total: f64,
        count: usize,
        segments: &mut Vec<AudioSegment>,
    ) -> Result<(), MediaError> {
        for i in 0..count {
            let start = i as f64 * target;
            let duration = target.min(total - start);
            let clip = clip_path(audio, i);

            self.toolkit
                .extract_clip(audio, &clip, start, duration)
                .await?;

            let size = tokio::fs::metadata(&clip).await?.len();
            if size <= self.config.max_segment_bytes {
                segments.push(AudioSegment {
                    path: clip,
                    start,
                    duration,
                    index: i,
                });
                continue;
            }

            warn!(
                clip = %clip.display(),
                size,
                ceiling = self.config.max_segment_bytes,
                "clip exceeds payload ceiling, re-splitting at half duration"
            );
            let subs = match self.split_at(&clip, target / 2.0).await {
                Ok(subs) => subs,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&clip).await;
                    return Err(e);
                }
            };
            // The oversized intermediate is discarded unless the re-split
            // handed it straight back (duration already below half target).
            if subs.iter().all(|s| s.path != clip) {
                let _ = tokio::fs::remove_file(&clip).await;
            }
            for mut sub in subs {
                sub.start += start;
                segments.push(sub);
            }
        }
        Ok(())
    }
}

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Delete the on-disk files of `segments`, ignoring files already gone.
pub async fn cleanup(segments: &[AudioSegment]) {
    for segment in segments {
        if let Err(e) = tokio::fs::remove_file(&segment.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %segment.path.display(), error = %e, "segment cleanup failed");
            }
        }
    }
}

async fn cleanup_except(segments: &[AudioSegment], keep: &Path) {
    for segment in segments {
        if segment.path != keep {
            let _ = tokio::fs::remove_file(&segment.path).await;
        }
    }
}

fn clip_path(audio: &Path, index: usize) -> PathBuf {
    let stem = audio
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_owned());
    audio.with_file_name(format!("{stem}_segment_{index}.wav"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// In-memory toolkit: clips become files of `bytes_per_sec * duration`
    /// bytes, and every written clip remembers its duration for re-probing.
    struct FakeToolkit {
        source_duration: Option<f64>,
        bytes_per_sec: u64,
        durations: Mutex<HashMap<PathBuf, f64>>,
        extractions: AtomicUsize,
        fail_on_extraction: Option<usize>,
    }

    impl FakeToolkit {
        fn new(source_duration: f64, bytes_per_sec: u64) -> Self {
            Self {
                source_duration: Some(source_duration),
                bytes_per_sec,
                durations: Mutex::new(HashMap::new()),
                extractions: AtomicUsize::new(0),
                fail_on_extraction: None,
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
            let n = self.extractions.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_extraction == Some(n) {
                return Err(MediaError::Toolkit {
                    tool: "ffmpeg",
                    message: "simulated extraction failure".into(),
                });
            }
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

    fn segmenter(toolkit: FakeToolkit, max_bytes: u64) -> Segmenter {
        Segmenter::new(
            Arc::new(toolkit),
            SegmenterConfig {
                target_duration_secs: 180.0,
                max_segment_bytes: max_bytes,
            },
        )
    }

    async fn source(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("extract.wav");
        tokio::fs::write(&path, b"source").await.unwrap();
        path
    }

    #[tokio::test]
    async fn short_file_returns_single_untouched_segment() {
        let dir = tempfile::tempdir().unwrap();
        let audio = source(&dir).await;
        let seg = segmenter(FakeToolkit::new(120.0, 10), 1_000_000);

        let segments = seg.split(&audio).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].path, audio);
        assert!((segments[0].duration - 120.0).abs() < f64::EPSILON);
        assert_eq!(segments[0].index, 0);
    }

    #[tokio::test]
    async fn forty_five_minutes_yields_fifteen_equal_segments() {
        let dir = tempfile::tempdir().unwrap();
        let audio = source(&dir).await;
        let seg = segmenter(FakeToolkit::new(2700.0, 10), 1_000_000);

        let segments = seg.split(&audio).await.unwrap();
        assert_eq!(segments.len(), 15);
        for (i, s) in segments.iter().enumerate() {
            assert_eq!(s.index, i);
            assert!((s.start - i as f64 * 180.0).abs() < 1e-9);
            assert!((s.duration - 180.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn last_segment_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let audio = source(&dir).await;
        let seg = segmenter(FakeToolkit::new(400.0, 10), 1_000_000);

        let segments = seg.split(&audio).await.unwrap();
        assert_eq!(segments.len(), 3);
        assert!((segments[2].duration - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn durations_reconstruct_total() {
        for total in [181.0, 360.0, 2700.0, 2710.5, 899.25] {
            let dir = tempfile::tempdir().unwrap();
            let audio = source(&dir).await;
            let seg = segmenter(FakeToolkit::new(total, 10), 1_000_000);

            let segments = seg.split(&audio).await.unwrap();
            let sum: f64 = segments.iter().map(|s| s.duration).sum();
            assert!((sum - total).abs() < 1.0, "sum {sum} vs total {total}");
        }
    }

    #[tokio::test]
    async fn oversized_clip_is_resplit_and_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let audio = source(&dir).await;
        // 180 s * 10 B/s = 1800 B > 1000 ceiling; 90 s clips fit.
        let seg = segmenter(FakeToolkit::new(360.0, 10), 1000);

        let segments = seg.split(&audio).await.unwrap();
        assert_eq!(segments.len(), 4);

        let starts: Vec<f64> = segments.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0.0, 90.0, 180.0, 270.0]);
        for s in &segments {
            assert!((s.duration - 90.0).abs() < 1e-9);
            assert!(tokio::fs::try_exists(&s.path).await.unwrap());
        }

        // The oversized 180 s intermediates were removed.
        assert!(
            !tokio::fs::try_exists(dir.path().join("extract_segment_0.wav"))
                .await
                .unwrap()
        );
        assert!(
            !tokio::fs::try_exists(dir.path().join("extract_segment_1.wav"))
                .await
                .unwrap()
        );

        // Indices renumbered contiguously across the splice.
        let indices: Vec<usize> = segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn extraction_failure_removes_earlier_clips() {
        let dir = tempfile::tempdir().unwrap();
        let audio = source(&dir).await;
        let mut toolkit = FakeToolkit::new(900.0, 10);
        toolkit.fail_on_extraction = Some(2);
        let seg = segmenter(toolkit, 1_000_000);

        let err = seg.split(&audio).await.unwrap_err();
        assert!(matches!(err, MediaError::Toolkit { .. }));

        // Clips 0 and 1 were written before the failure; both must be gone.
        for i in 0..2 {
            let clip = dir.path().join(format!("extract_segment_{i}.wav"));
            assert!(!tokio::fs::try_exists(&clip).await.unwrap());
        }
        // The source extract is never deleted by the segmenter.
        assert!(tokio::fs::try_exists(&audio).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_duration_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let audio = source(&dir).await;
        let toolkit = FakeToolkit {
            source_duration: None,
            bytes_per_sec: 10,
            durations: Mutex::new(HashMap::new()),
            extractions: AtomicUsize::new(0),
            fail_on_extraction: None,
        };
        let seg = segmenter(toolkit, 1_000_000);

        let err = seg.split(&audio).await.unwrap_err();
        assert!(matches!(err, MediaError::NoDuration { .. }));
    }

    #[tokio::test]
    async fn cleanup_removes_segment_files() {
        let dir = tempfile::tempdir().unwrap();
        let audio = source(&dir).await;
        let seg = segmenter(FakeToolkit::new(360.0, 10), 1_000_000);

        let segments = seg.split(&audio).await.unwrap();
        cleanup(&segments).await;
        for s in &segments {
            assert!(!tokio::fs::try_exists(&s.path).await.unwrap());
        }
    }
}
