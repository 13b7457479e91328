//! Reqwest-backed client for the remote transcription/translation provider.
//!
//! Speaks the OpenAI-compatible surface: `POST /v1/audio/transcriptions`
//! (multipart, verbose JSON with segment timestamps) and
//! `POST /v1/chat/completions` for translation. The base URL is
//! configurable so tests run against a local mock server.
//!
//! Transcription requests carry deliberately permissive decoding
//! parameters — the goal is to capture content, not suppress it; the
//! quality filter removes the noise afterwards.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::ContentClass;
use crate::error::ProviderError;
use crate::provider::{LanguageHint, RawSegment, TranscriptionProvider, TranslationProvider};

/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
/// Default request timeout — generous, large media uploads take minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

/// Provider client configuration.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Bearer API key.
    pub api_key: String,
    /// Endpoint base URL (default `https://api.openai.com`).
    pub base_url: String,
    /// Speech-to-text model (default `whisper-1`).
    pub transcription_model: String,
    /// Chat model used for translation (default `gpt-3.5-turbo`).
    pub chat_model: String,
    /// Per-request timeout (default 15 min).
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Config with defaults for everything but the key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            transcription_model: "whisper-1".to_owned(),
            chat_model: "gpt-3.5-turbo".to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// OpenAI-compatible provider client.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a provider with a pooled HTTP client.
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn transcription_url(&self) -> String {
        format!(
            "{}/v1/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn request_transcription(
        &self,
        client: &reqwest::Client,
        audio: &Path,
        language: &LanguageHint,
    ) -> Result<Vec<RawSegment>, ProviderError> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_owned());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::InvalidResponse(format!("bad mime: {e}")))?;

        // Permissive decoding: low no-speech bar, tolerant logprob and
        // compression thresholds, VAD off. No prompt text is sent — prompts
        // leak back into transcripts.
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .text("temperature", "0.3")
            .text("condition_on_previous_text", "true")
            .text("no_speech_threshold", "0.5")
            .text("logprob_threshold", "-1.2")
            .text("compression_ratio_threshold", "3.0")
            .text("vad_filter", "false");
        if let Some(code) = language.code() {
            form = form.text("language", code.to_owned());
        }

        debug!(url = %self.transcription_url(), language = %language, "sending transcription request");
        let response = client
            .post(self.transcription_url())
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                extract_api_message(&body),
            ));
        }

        let payload: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(payload.into_segments())
    }
}

#[async_trait]
impl TranscriptionProvider for OpenAiProvider {
    async fn transcribe(
        &self,
        audio: &Path,
        language: &LanguageHint,
    ) -> Result<Vec<RawSegment>, ProviderError> {
        self.request_transcription(&self.client, audio, language)
            .await
    }

    async fn transcribe_secondary(
        &self,
        audio: &Path,
        language: &LanguageHint,
    ) -> Result<Vec<RawSegment>, ProviderError> {
        // Fresh single-use client: no shared pool, so a wedged keep-alive
        // connection on the primary path cannot poison this attempt.
        warn!("retrying transcription over secondary transport path");
        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        self.request_transcription(&client, audio, language).await
    }
}

#[async_trait]
impl TranslationProvider for OpenAiProvider {
    async fn translate(
        &self,
        lines: &[String],
        target: &str,
        profile: ContentClass,
    ) -> Result<Vec<String>, ProviderError> {
        let request = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: translation_prompt(target, profile),
                },
                ChatMessage {
                    role: "user",
                    content: lines.join("\n"),
                },
            ],
            temperature: if profile == ContentClass::Adult { 0.2 } else { 0.3 },
            max_tokens: 4000,
        };

        debug!(url = %self.chat_url(), lines = lines.len(), target, "sending translation request");
        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                extract_api_message(&body),
            ));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".into()))?;

        Ok(content.lines().map(str::to_owned).collect())
    }
}

/// Tone-preservation instructions per content class.
fn translation_prompt(target: &str, profile: ContentClass) -> String {
    let language = language_name(target);
    let base = format!(
        "You are a professional subtitle translator. Translate the following text into {language}. \
         Preserve the line-by-line structure: each input line must be translated on its own output line."
    );
    match profile {
        ContentClass::Adult => format!(
            "{base}\n\nThis content includes intimate and emotional expressions. \
             Preserve the emotional tone and intimacy, translate expressions of love and passion \
             naturally, keep emotional nuance and whispers, and do not censor the adult context."
        ),
        ContentClass::Conversation => format!(
            "{base}\n\nThis content is conversational. Translate naturally, preserving the casual \
             tone, colloquial expressions, interjections and hesitations."
        ),
        ContentClass::General => format!("{base}\n\nTranslate precisely, keeping the original meaning."),
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "fr" => "French",
        "es" => "Spanish",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "ar" => "Arabic",
        other => other,
    }
}

/// Pull the provider's error message out of a JSON error body, falling back
/// to a truncated raw body.
fn extract_api_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(serde_json::Value::as_str)
        {
            return message.to_owned();
        }
        if let Some(message) = value.get("message").and_then(serde_json::Value::as_str) {
            return message.to_owned();
        }
    }
    body.chars().take(200).collect()
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    segments: Option<Vec<ApiSegment>>,
}

impl VerboseTranscription {
    fn into_segments(self) -> Vec<RawSegment> {
        match self.segments {
            Some(segments) if !segments.is_empty() => segments
                .into_iter()
                .map(|s| RawSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_owned(),
                })
                .collect(),
            // Some responses carry only flat text; synthesize one segment.
            _ => match self.text {
                Some(text) if !text.trim().is_empty() => vec![RawSegment {
                    start: 0.0,
                    end: 30.0,
                    text: text.trim().to_owned(),
                }],
                _ => Vec::new(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
