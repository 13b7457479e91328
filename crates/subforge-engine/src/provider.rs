//! Provider traits and shared request/response types.
//!
//! The orchestrator and translation stage talk to these traits only; the
//! reqwest-backed implementation lives in [`crate::openai`], and tests
//! substitute scripted fakes.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classify::ContentClass;
use crate::error::ProviderError;

/// Source-language hint for transcription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LanguageHint {
    /// Let the provider detect the language.
    Auto,
    /// Explicit ISO 639-1 code.
    Code(String),
}

impl LanguageHint {
    /// The explicit code, when one was given.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Auto => None,
            Self::Code(code) => Some(code),
        }
    }
}

impl FromStr for LanguageHint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Ok(Self::Code(trimmed.to_lowercase()))
        }
    }
}

impl fmt::Display for LanguageHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Code(code) => f.write_str(code),
        }
    }
}

/// One raw timed segment as returned by the provider, before filtering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    /// Start time in seconds, relative to the submitted chunk.
    pub start: f64,
    /// End time in seconds, relative to the submitted chunk.
    pub end: f64,
    /// Transcribed text.
    pub text: String,
}

/// Remote speech-to-text provider.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe one audio chunk over the primary transport.
    async fn transcribe(
        &self,
        audio: &Path,
        language: &LanguageHint,
    ) -> Result<Vec<RawSegment>, ProviderError>;

    /// One-shot attempt over a secondary transport path to the same
    /// provider, used when the primary path shows connectivity failure.
    async fn transcribe_secondary(
        &self,
        audio: &Path,
        language: &LanguageHint,
    ) -> Result<Vec<RawSegment>, ProviderError> {
        self.transcribe(audio, language).await
    }
}

/// Remote translation provider.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Translate `lines` into `target`, preserving line order 1:1.
    ///
    /// `profile` selects the tone-preservation instructions sent to the
    /// provider; it does not change the contract.
    async fn translate(
        &self,
        lines: &[String],
        target: &str,
        profile: ContentClass,
    ) -> Result<Vec<String>, ProviderError>;
}
