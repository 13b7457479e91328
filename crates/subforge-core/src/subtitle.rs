//! The [`Subtitle`] record and sequence helpers.
//!
//! A subtitle sequence is ordered by non-decreasing start time with 1-based
//! contiguous indices. Stitching (concatenating per-segment transcripts with
//! shifted time ranges) and reindexing preserve that invariant.

use serde::{Deserialize, Serialize};

/// One timed caption line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    /// 1-based sequence index, contiguous after any filtering pass.
    pub index: u32,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds (`end >= start`).
    pub end: f64,
    /// Caption text.
    pub text: String,
}

impl Subtitle {
    /// Construct a subtitle.
    #[must_use]
    pub fn new(index: u32, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// Duration in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Copy with start/end shifted by `offset` seconds.
    #[must_use]
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            index: self.index,
            start: self.start + offset,
            end: self.end + offset,
            text: self.text.clone(),
        }
    }
}

/// Renumber a sequence in place to contiguous 1-based indices.
pub fn renumber(subtitles: &mut [Subtitle]) {
    for (i, subtitle) in subtitles.iter_mut().enumerate() {
        subtitle.index = (i + 1) as u32;
    }
}

/// Whether the sequence is ordered by non-decreasing start time.
#[must_use]
pub fn is_ordered(subtitles: &[Subtitle]) -> bool {
    subtitles.windows(2).all(|w| w[0].start <= w[1].start)
}

/// Append `segment` subtitles to `acc`, shifting them by `offset` seconds
/// and continuing the accumulated index sequence.
pub fn stitch(acc: &mut Vec<Subtitle>, segment: &[Subtitle], offset: f64) {
    let base = acc.len() as u32;
    acc.extend(segment.iter().enumerate().map(|(i, s)| {
        let mut shifted = s.shifted(offset);
        shifted.index = base + (i + 1) as u32;
        shifted
    }));
}
