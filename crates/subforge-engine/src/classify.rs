//! Lexical content classification.
//!
//! Classifies a subtitle sequence as adult / conversation / general from
//! keyword ratios. The label only biases filtering and translation
//! strictness (tone-preservation prompts, translation temperature) and is
//! never persisted beyond a single pipeline run.
//!
//! The classifier is a pure function behind [`ContentClassifier`] so a
//! trained model could replace the keyword heuristic without touching the
//! pipeline.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use subforge_core::Subtitle;

/// Heuristic content label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClass {
    /// Intimate/emotional content; filter and translator preserve short
    /// emotional utterances.
    Adult,
    /// Ordinary dialogue.
    Conversation,
    /// Everything else.
    General,
}

impl fmt::Display for ContentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adult => f.write_str("adult"),
            Self::Conversation => f.write_str("conversation"),
            Self::General => f.write_str("general"),
        }
    }
}

/// Classification result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    /// Dominant content class.
    pub class: ContentClass,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ContentAnalysis {
    /// Neutral result used for empty sequences.
    #[must_use]
    pub fn general() -> Self {
        Self {
            class: ContentClass::General,
            confidence: 0.5,
        }
    }
}

/// Classifier interface.
pub trait ContentClassifier: Send + Sync {
    /// Classify a subtitle sequence.
    fn classify(&self, subtitles: &[Subtitle]) -> ContentAnalysis;
}

/// Ratio thresholds for the lexical classifier.
#[derive(Clone, Copy, Debug)]
pub struct ClassifierConfig {
    /// Intimacy-keyword ratio above which content is `Adult` (default 5 %).
    pub adult_ratio: f64,
    /// Conversational-keyword ratio above which content is `Conversation`
    /// (default 10 %).
    pub conversational_ratio: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            adult_ratio: 0.05,
            conversational_ratio: 0.10,
        }
    }
}

// Emotion/intimacy vocabulary, English and French plus common phrases.
static ADULT_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(love|baby|honey|darling|kiss|touch|feel|want|need|desire|beautiful|gorgeous|sexy|hot|pleasure|passion|intimate|close|moan|whisper|breathe|gasp|sigh|mmm|ahh|ohh|yes|more|amour|chéri|bébé|ma belle|embrasser|toucher|sentir|vouloir|désir|plaisir|intime|proche|gémir|murmurer|respirer|soupirer|oui|encore|plus|i love you|je t'aime|come here|viens ici|so good|c'est bon)\b",
    )
    .expect("adult keyword pattern")
});

// Conversational vocabulary.
static CONVERSATIONAL_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(hello|hi|how|what|where|when|why|think|know|say|tell|ask|answer|question|talk|speak|listen|hear|salut|bonjour|comment|quoi|où|quand|pourquoi|penser|savoir|dire|parler|écouter|entendre)\b",
    )
    .expect("conversational keyword pattern")
});

/// Keyword-ratio classifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalClassifier {
    config: ClassifierConfig,
}

impl LexicalClassifier {
    /// Create with explicit thresholds.
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }
}

impl ContentClassifier for LexicalClassifier {
    fn classify(&self, subtitles: &[Subtitle]) -> ContentAnalysis {
        let text = subtitles
            .iter()
            .map(|s| s.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let word_count = text.split_whitespace().count();
        if word_count == 0 {
            return ContentAnalysis::general();
        }

        let adult_hits = ADULT_KEYWORDS.find_iter(&text).count();
        let conversational_hits = CONVERSATIONAL_KEYWORDS.find_iter(&text).count();

        let adult_ratio = adult_hits as f64 / word_count as f64;
        let conversational_ratio = conversational_hits as f64 / word_count as f64;

        if adult_ratio > self.config.adult_ratio {
            ContentAnalysis {
                class: ContentClass::Adult,
                confidence: (adult_ratio * 10.0).min(1.0),
            }
        } else if conversational_ratio > self.config.conversational_ratio {
            ContentAnalysis {
                class: ContentClass::Conversation,
                confidence: (conversational_ratio * 5.0).min(1.0),
            }
        } else {
            ContentAnalysis::general()
        }
    }
}
