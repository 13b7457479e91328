//! Translation Stage.
//!
//! Translates a cleaned subtitle sequence batch by batch. Batches are
//! bounded by a total character count to respect provider payload limits
//! and run sequentially with a short pause between them. Within a batch the
//! line order is 1:1 between request and response; a missing response line
//! falls back to the original text so the output sequence always has the
//! same length and ordering as the input.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use subforge_core::Subtitle;
use subforge_core::retry::RetryConfig;

use crate::classify::ContentAnalysis;
use crate::error::EngineError;
use crate::provider::TranslationProvider;

/// Translation stage tuning.
#[derive(Clone, Debug)]
pub struct TranslateConfig {
    /// Maximum total characters per batch (default 2000).
    pub max_batch_chars: usize,
    /// Pause between batches in ms (default 1000).
    pub batch_pause_ms: u64,
    /// Retry parameters; translation uses fewer attempts than transcription.
    pub retry: RetryConfig,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            max_batch_chars: 2000,
            batch_pause_ms: 1000,
            retry: RetryConfig {
                max_attempts: 3,
                ..RetryConfig::default()
            },
        }
    }
}

/// Batch translator over a [`TranslationProvider`].
pub struct TranslationStage {
    provider: Arc<dyn TranslationProvider>,
    config: TranslateConfig,
}

impl TranslationStage {
    /// Create the stage.
    pub fn new(provider: Arc<dyn TranslationProvider>, config: TranslateConfig) -> Self {
        Self { provider, config }
    }

    /// Translate `subtitles` into `target`, preserving length and ordering.
    pub async fn translate(
        &self,
        subtitles: &[Subtitle],
        target: &str,
        analysis: ContentAnalysis,
    ) -> Result<Vec<Subtitle>, EngineError> {
        if subtitles.is_empty() {
            return Ok(Vec::new());
        }

        let batches = batch_ranges(subtitles, self.config.max_batch_chars);
        info!(
            batches = batches.len(),
            target,
            class = %analysis.class,
            "translating subtitle sequence"
        );

        let mut translated: Vec<Subtitle> = Vec::with_capacity(subtitles.len());
        let last = batches.len() - 1;
        for (i, range) in batches.into_iter().enumerate() {
            let batch = &subtitles[range];
            let lines = self.translate_batch(batch, target, analysis).await?;
            translated.extend(batch.iter().enumerate().map(|(j, subtitle)| {
                let text = lines
                    .get(j)
                    .map(|l| l.trim())
                    .filter(|l| !l.is_empty())
                    .unwrap_or(&subtitle.text);
                Subtitle {
                    index: subtitle.index,
                    start: subtitle.start,
                    end: subtitle.end,
                    text: text.to_owned(),
                }
            }));
            if i < last && self.config.batch_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_pause_ms)).await;
            }
        }
        Ok(translated)
    }

    async fn translate_batch(
        &self,
        batch: &[Subtitle],
        target: &str,
        analysis: ContentAnalysis,
    ) -> Result<Vec<String>, EngineError> {
        let lines: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
        let max_attempts = self.config.retry.max_attempts;

        let mut last_message = String::new();
        for attempt in 1..=max_attempts {
            match self
                .provider
                .translate(&lines, target, analysis.class)
                .await
            {
                Ok(translated) => {
                    if translated.len() != lines.len() {
                        debug!(
                            sent = lines.len(),
                            received = translated.len(),
                            "line-count mismatch, missing lines keep original text"
                        );
                    }
                    return Ok(translated);
                }
                Err(e) => {
                    last_message = e.to_string();
                    if !e.is_retryable() || attempt == max_attempts {
                        return Err(EngineError::Translation(last_message));
                    }
                    let random = rand::rng().random_range(0.0..1.0);
                    let delay = self.config.retry.delay_ms(attempt, random);
                    warn!(attempt, delay_ms = delay, error = %e, "translation attempt failed");
                    if delay > 0 {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        Err(EngineError::Translation(last_message))
    }
}

/// Split a sequence into contiguous index ranges bounded by `max_chars`
/// total text length. A single over-long subtitle still forms a batch.
fn batch_ranges(subtitles: &[Subtitle], max_chars: usize) -> Vec<std::ops::Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = 0usize;

    for (i, subtitle) in subtitles.iter().enumerate() {
        let len = subtitle.text.chars().count();
        if chars + len > max_chars && i > start {
            ranges.push(start..i);
            start = i;
            chars = 0;
        }
        chars += len;
    }
    if start < subtitles.len() {
        ranges.push(start..subtitles.len());
    }
    ranges
}
