//! External media toolkit boundary.
//!
//! The pipeline never shells out directly; it talks to a [`MediaToolkit`],
//! so tests can substitute an in-memory implementation and the ffmpeg
//! specifics stay in one place. [`FfmpegToolkit`] is the production
//! implementation: audio is normalized to 16 kHz mono PCM WAV, the format
//! the transcription provider handles best.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::MediaError;

/// Abstract audio toolkit used by the pipeline.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Duration of a media file in seconds, or `None` when it cannot be
    /// determined (corrupt container, missing stream).
    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>, MediaError>;

    /// Extract the audio track of `input` into `output` as 16 kHz mono WAV.
    async fn extract_audio(&self, input: &Path, output: &Path) -> Result<(), MediaError>;

    /// Extract `duration` seconds starting at `start` from `input` into
    /// `output`, re-encoded as 16 kHz mono WAV.
    async fn extract_clip(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<(), MediaError>;
}

/// ffmpeg/ffprobe-backed toolkit.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegToolkit;

impl FfmpegToolkit {
    /// Whether the `ffmpeg` binary is reachable on PATH.
    pub async fn is_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Run ffmpeg with `args`, deleting a partial `output` on failure.
    async fn run_ffmpeg(args: &[&str], output: &Path) -> Result<(), MediaError> {
        debug!(?args, "invoking ffmpeg");
        let result = Command::new("ffmpeg")
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                return Err(MediaError::Toolkit {
                    tool: "ffmpeg",
                    message: format!("failed to spawn: {e}"),
                });
            }
        };

        if out.status.success() {
            return Ok(());
        }

        // A failed run can leave a truncated output file behind.
        if tokio::fs::try_exists(output).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(output).await {
                warn!(path = %output.display(), error = %e, "could not remove partial output");
            }
        }

        let stderr = String::from_utf8_lossy(&out.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("; ");
        Err(MediaError::Toolkit {
            tool: "ffmpeg",
            message: tail,
        })
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>, MediaError> {
        let result = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                return Err(MediaError::Toolkit {
                    tool: "ffprobe",
                    message: format!("failed to spawn: {e}"),
                });
            }
        };

        if !out.status.success() {
            debug!(path = %path.display(), "ffprobe could not read file");
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&out.stdout);
        Ok(text.trim().parse::<f64>().ok().filter(|d| d.is_finite()))
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        let input_s = input.to_string_lossy();
        let output_s = output.to_string_lossy();
        Self::run_ffmpeg(
            &[
                "-y", "-i", &input_s, "-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1",
                "-f", "wav", &output_s,
            ],
            output,
        )
        .await
    }

    async fn extract_clip(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<(), MediaError> {
        let input_s = input.to_string_lossy();
        let output_s = output.to_string_lossy();
        let start_s = format!("{start}");
        let duration_s = format!("{duration}");
        Self::run_ffmpeg(
            &[
                "-y",
                "-ss",
                &start_s,
                "-t",
                &duration_s,
                "-i",
                &input_s,
                "-acodec",
                "pcm_s16le",
                "-ar",
                "16000",
                "-ac",
                "1",
                "-f",
                "wav",
                &output_s,
            ],
            output,
        )
        .await
    }
}
