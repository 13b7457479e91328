//! # subforge-engine
//!
//! The transcription and translation engine:
//!
//! - [`provider`]: traits over the remote speech-to-text / translation
//!   provider, plus the language hint type
//! - [`openai`]: reqwest-backed provider client (primary + secondary
//!   transport path)
//! - [`breaker`]: process-wide circuit breaker guarding provider calls
//! - [`orchestrator`]: per-chunk retry/backoff state machine, sequential
//!   segment transcription, placeholder degradation, fallback chain
//! - [`fallback`]: local transcription binary probe and the synthetic
//!   subtitle generator
//! - [`classify`]: lexical content classification (adult / conversation /
//!   general)
//! - [`filter`]: heuristic cleanup of noisy transcripts
//! - [`translate`]: size-bounded batch translation with 1:1 line mapping

#![deny(unsafe_code)]

pub mod breaker;
pub mod classify;
pub mod error;
pub mod fallback;
pub mod filter;
pub mod openai;
pub mod orchestrator;
pub mod provider;
pub mod translate;

pub use breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use classify::{ContentAnalysis, ContentClass};
pub use error::{EngineError, ProviderError};
pub use fallback::{FallbackChain, LocalTranscriber, SyntheticGenerator};
pub use filter::{FilterConfig, QualityFilter};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use orchestrator::{OrchestratorConfig, ProgressFn, TranscriptionOrchestrator};
pub use provider::{LanguageHint, RawSegment, TranscriptionProvider, TranslationProvider};
pub use translate::{TranslateConfig, TranslationStage};
