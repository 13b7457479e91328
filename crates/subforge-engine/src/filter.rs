//! Content Quality Filter.
//!
//! Removes hallucinated and degenerate segments from raw transcripts and
//! merges fragmented identical utterances, in a fixed pass order:
//!
//! 1. drop empty text
//! 2. drop instruction-leakage artifacts (prompt echoes)
//! 3. drop extreme mechanical repetition
//! 4. drop clear non-speech hallucinations (bracketed music/applause/silence)
//! 5. drop segments longer than the duration cutoff
//! 6. classify content type (biases translation strictness)
//! 7. merge adjacent identical subtitles with a sub-second gap
//! 8. reindex from 1
//!
//! The filter is deliberately permissive: anything not matched by a drop
//! rule is kept, including short emotional utterances, invented-looking
//! words and non-verbal sounds. It never reduces a sequence containing
//! non-empty text to zero, and filtering an already-filtered sequence is a
//! no-op (idempotence).

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use subforge_core::Subtitle;
use subforge_core::subtitle::renumber;

use crate::classify::{ContentAnalysis, ContentClassifier, LexicalClassifier};
use crate::provider::LanguageHint;

/// Filter thresholds.
///
/// Empirically tuned values carried as configuration rather than constants;
/// no derivation is claimed for the defaults.
#[derive(Clone, Copy, Debug)]
pub struct FilterConfig {
    /// Segments longer than this are treated as mis-aligned (default 60 s).
    pub max_duration_secs: f64,
    /// A token or short pattern repeated at least this many times is
    /// mechanical noise (default 9).
    pub repetition_threshold: usize,
    /// Adjacent identical subtitles closer than this merge (default 1 s).
    pub merge_gap_secs: f64,
    /// Share of suspicious segments above which a transcript is considered
    /// catastrophically bad (default 0.8).
    pub suspicious_reject_ratio: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 60.0,
            repetition_threshold: 9,
            merge_gap_secs: 1.0,
            suspicious_reject_ratio: 0.8,
        }
    }
}

/// Result of one filtering pass.
#[derive(Clone, Debug)]
pub struct FilterOutcome {
    /// Cleaned, reindexed subtitles.
    pub subtitles: Vec<Subtitle>,
    /// Content classification of the input sequence.
    pub analysis: ContentAnalysis,
    /// Number of subtitles removed.
    pub removed: usize,
}

/// Aggregate quality statistics over a subtitle sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QualityStats {
    /// Total segments inspected.
    pub total: usize,
    /// Segments that look broken (empty text or over-long duration).
    pub suspicious: usize,
}

// Residue of a transcription prompt being echoed back as transcript text.
static PROMPT_ARTIFACTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)preserve.*natural.*emotional.*context",
        r"(?i)transcribe.*accurately",
        r"(?i)including.*intimate.*expressions",
        r"(?i)emotional.*sounds.*adult.*content",
        r"(?i)whispers.*emotional.*context",
        r"(?i)^accurately transcribe",
        r"(?i)^transcribe all spoken",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("prompt artifact pattern"))
    .collect()
});

// Obvious non-speech technical hallucinations; everything else is kept.
static TECHNICAL_HALLUCINATIONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^\[(музыка|music|instrumental|applause|аплодисменты|silence|тишина)\]$",
        r"^♪.*♪$",
        r"(?i)^(background music|fond musical)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("hallucination pattern"))
    .collect()
});

/// Heuristic transcript cleaner.
pub struct QualityFilter {
    config: FilterConfig,
    classifier: Arc<dyn ContentClassifier>,
}

impl QualityFilter {
    /// Create a filter with an injected classifier.
    pub fn new(config: FilterConfig, classifier: Arc<dyn ContentClassifier>) -> Self {
        Self { config, classifier }
    }

    /// Filter with default thresholds and the lexical classifier.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FilterConfig::default(), Arc::new(LexicalClassifier::default()))
    }

    /// Clean a raw subtitle sequence.
    pub fn clean(&self, subtitles: Vec<Subtitle>, language: &LanguageHint) -> FilterOutcome {
        let analysis = self.classifier.classify(&subtitles);
        debug!(
            class = %analysis.class,
            confidence = analysis.confidence,
            language = %language,
            total = subtitles.len(),
            "filtering transcript"
        );

        let input_len = subtitles.len();
        let non_empty: Vec<Subtitle> = subtitles
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();

        let kept: Vec<Subtitle> = non_empty
            .iter()
            .filter(|s| {
                let text = s.text.trim();
                if is_prompt_artifact(text) {
                    debug!(text, "dropping prompt artifact");
                    return false;
                }
                if is_extreme_repetition(text, self.config.repetition_threshold) {
                    debug!(text, "dropping extreme repetition");
                    return false;
                }
                if is_technical_hallucination(text) {
                    debug!(text, "dropping technical hallucination");
                    return false;
                }
                if s.duration() > self.config.max_duration_secs {
                    debug!(duration = s.duration(), "dropping over-long segment");
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        // The drop rules must not wipe out a sequence that had real text;
        // when they would, fall back to the non-empty input unchanged.
        let survivors = if kept.is_empty() && !non_empty.is_empty() {
            non_empty
        } else {
            kept
        };

        let mut merged = merge_identical(survivors, self.config.merge_gap_secs);
        renumber(&mut merged);

        let removed = input_len - merged.len();
        FilterOutcome {
            subtitles: merged,
            analysis,
            removed,
        }
    }

    /// Quality statistics used by the orchestrator's reject-and-retry check.
    #[must_use]
    pub fn stats(&self, subtitles: &[Subtitle]) -> QualityStats {
        let suspicious = subtitles
            .iter()
            .filter(|s| s.text.trim().is_empty() || s.duration() > self.config.max_duration_secs)
            .count();
        QualityStats {
            total: subtitles.len(),
            suspicious,
        }
    }

    /// Whether a transcript is so broken it should be rejected outright.
    #[must_use]
    pub fn is_catastrophic(&self, stats: QualityStats) -> bool {
        stats.total > 0
            && stats.suspicious as f64 > stats.total as f64 * self.config.suspicious_reject_ratio
    }
}

fn is_prompt_artifact(text: &str) -> bool {
    PROMPT_ARTIFACTS.iter().any(|p| p.is_match(text))
}

fn is_technical_hallucination(text: &str) -> bool {
    TECHNICAL_HALLUCINATIONS.iter().any(|p| p.is_match(text))
}

/// Same token repeated `threshold`+ times, or a short character pattern
/// repeated `threshold`+ times with nothing else.
fn is_extreme_repetition(text: &str, threshold: usize) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() >= threshold {
        let first = words[0].to_lowercase();
        if words.iter().all(|w| w.to_lowercase() == first) {
            return true;
        }
    }
    is_pattern_repetition(text, threshold)
}

fn is_pattern_repetition(text: &str, min_repeats: usize) -> bool {
    let bytes = text.trim().as_bytes();
    for pattern_len in 1..=5usize {
        if bytes.len() >= pattern_len * min_repeats && bytes.len() % pattern_len == 0 {
            let pattern = &bytes[..pattern_len];
            if bytes.chunks_exact(pattern_len).all(|c| c == pattern) {
                return true;
            }
        }
    }
    false
}

/// Merge adjacent subtitles whose text is identical (case-insensitive) when
/// the gap between them is under `max_gap` seconds. The longer text wins
/// and the end time extends.
fn merge_identical(subtitles: Vec<Subtitle>, max_gap: f64) -> Vec<Subtitle> {
    let mut merged: Vec<Subtitle> = Vec::with_capacity(subtitles.len());
    for sub in subtitles {
        if let Some(last) = merged.last_mut() {
            let gap = sub.start - last.end;
            if gap < max_gap
                && last.text.trim().to_lowercase() == sub.text.trim().to_lowercase()
            {
                if sub.text.len() > last.text.len() {
                    last.text = sub.text;
                }
                last.end = last.end.max(sub.end);
                continue;
            }
        }
        merged.push(sub);
    }
    merged
}
