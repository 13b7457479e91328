//! Caption document rendering.
//!
//! Pure functions mapping a subtitle sequence to SubRip and WebVTT text
//! bodies. Rendering is deterministic: the same sequence always produces
//! byte-identical output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::subtitle::Subtitle;
use crate::timecode::{self, Separator};

/// Supported caption file formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionFormat {
    /// SubRip (`.srt`)
    Srt,
    /// WebVTT (`.vtt`)
    Vtt,
}

impl CaptionFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Vtt => "vtt",
        }
    }

    /// MIME type for download responses.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Srt => "application/x-subrip",
            Self::Vtt => "text/vtt",
        }
    }

    /// Render a subtitle sequence in this format.
    #[must_use]
    pub fn render(self, subtitles: &[Subtitle]) -> String {
        match self {
            Self::Srt => render_srt(subtitles),
            Self::Vtt => render_vtt(subtitles),
        }
    }
}

impl fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Error for unrecognized caption format names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownFormat;

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown caption format")
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for CaptionFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "srt" => Ok(Self::Srt),
            "vtt" => Ok(Self::Vtt),
            _ => Err(UnknownFormat),
        }
    }
}

/// Render a SubRip document: `index\nstart --> end\ntext\n` blocks joined
/// with blank lines.
#[must_use]
pub fn render_srt(subtitles: &[Subtitle]) -> String {
    subtitles
        .iter()
        .map(|s| {
            format!(
                "{}\n{} --> {}\n{}\n",
                s.index,
                timecode::format(s.start, Separator::Comma),
                timecode::format(s.end, Separator::Comma),
                s.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a WebVTT document: `WEBVTT` header then unindexed cues with
/// period-separated milliseconds.
#[must_use]
pub fn render_vtt(subtitles: &[Subtitle]) -> String {
    let cues = subtitles
        .iter()
        .map(|s| {
            format!(
                "{} --> {}\n{}\n",
                timecode::format(s.start, Separator::Period),
                timecode::format(s.end, Separator::Period),
                s.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("WEBVTT\n\n{cues}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Subtitle> {
        vec![
            Subtitle::new(1, 0.0, 2.5, "Hello there"),
            Subtitle::new(2, 2.5, 5.0, "Second line"),
        ]
    }

    #[test]
    fn srt_block_layout() {
        let srt = render_srt(&sample());
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:02,500\nHello there\n\n\
             2\n00:00:02,500 --> 00:00:05,000\nSecond line\n"
        );
    }

    #[test]
    fn vtt_has_header_and_period_separator() {
        let vtt = render_vtt(&sample());
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:02.500"));
        assert!(!vtt.contains(','));
    }

    #[test]
    fn vtt_cues_are_unindexed() {
        let vtt = render_vtt(&sample());
        assert!(!vtt.contains("\n1\n"));
    }

    #[test]
    fn empty_sequence_renders_empty_documents() {
        assert_eq!(render_srt(&[]), "");
        assert_eq!(render_vtt(&[]), "WEBVTT\n\n");
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(render_srt(&sample()), render_srt(&sample()));
        assert_eq!(render_vtt(&sample()), render_vtt(&sample()));
    }

    #[test]
    fn format_parses_from_str() {
        assert_eq!("srt".parse::<CaptionFormat>(), Ok(CaptionFormat::Srt));
        assert_eq!("vtt".parse::<CaptionFormat>(), Ok(CaptionFormat::Vtt));
        assert!("ass".parse::<CaptionFormat>().is_err());
    }

    #[test]
    fn format_metadata() {
        assert_eq!(CaptionFormat::Srt.extension(), "srt");
        assert_eq!(CaptionFormat::Vtt.content_type(), "text/vtt");
    }

    #[test]
    fn srt_round_trip_timestamps_within_one_millisecond() {
        let subs = vec![Subtitle::new(1, 12.3456, 17.8912, "x")];
        let srt = render_srt(&subs);
        let line = srt.lines().nth(1).unwrap();
        let (start, end) = line.split_once(" --> ").unwrap();
        let start = crate::timecode::parse(start).unwrap();
        let end = crate::timecode::parse(end).unwrap();
        assert!((start - 12.3456).abs() < 0.001);
        assert!((end - 17.8912).abs() < 0.001);
    }
}
