//! Engine error types and retry classification.
//!
//! [`ProviderError`] carries the machine classification the retry loop and
//! fallback decisions key off: retryable (transport resets, timeouts, DNS
//! failures, 429, ≥ 500) versus terminal (auth, quota, malformed requests).

use thiserror::Error;

use subforge_media::MediaError;

/// Errors from calls to the remote transcription/translation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure: connection reset, timeout, DNS.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 429 from the provider.
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// Non-2xx API response.
    #[error("provider error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },

    /// Usage quota exhausted — retrying cannot help.
    #[error("provider quota exhausted: {0}")]
    Quota(String),

    /// Authentication or authorization failure.
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// Circuit breaker is open; the provider was not contacted.
    #[error("service temporarily unavailable (circuit breaker open)")]
    CircuitOpen,

    /// The provider returned a body the client could not interpret.
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),

    /// Local filesystem failure while preparing the request.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Whether a retry with backoff may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure looks like connectivity trouble rather than a
    /// quota/auth problem — the trigger for the secondary transport path.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        self.is_retryable() && !matches!(self, Self::Quota(_) | Self::Auth(_))
    }

    /// Build from a transport error, preserving the timeout/connect detail.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("timeout: {err}"))
        } else if err.is_connect() {
            Self::Network(format!("connect: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Classify a non-2xx response by status and body text.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("quota") || lower.contains("insufficient credit") {
            return Self::Quota(message);
        }
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimited(message),
            _ => Self::Api { status, message },
        }
    }
}

/// Errors from the transcription/translation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Media toolkit or segmentation failure.
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Provider call failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// All attempts for an operation were exhausted.
    #[error("failed after {attempts} attempts: {message}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Last error message.
        message: String,
    },

    /// Translation stage failure.
    #[error("translation failed: {0}")]
    Translation(String),

    /// Local transcription binary failure.
    #[error("local transcription failed: {0}")]
    Local(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable_connectivity() {
        let err = ProviderError::Network("connection reset".into());
        assert!(err.is_retryable());
        assert!(err.is_connectivity());
    }

    #[test]
    fn rate_limit_is_retryable() {
        assert!(ProviderError::RateLimited("slow down".into()).is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = ProviderError::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_retryable());
        assert!(err.is_connectivity());
    }

    #[test]
    fn client_errors_are_terminal() {
        let err = ProviderError::Api {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!err.is_retryable());
        assert!(!err.is_connectivity());
    }

    #[test]
    fn auth_and_quota_are_terminal() {
        assert!(!ProviderError::Auth("nope".into()).is_retryable());
        assert!(!ProviderError::Quota("empty".into()).is_retryable());
        assert!(!ProviderError::Quota("empty".into()).is_connectivity());
    }

    #[test]
    fn circuit_open_is_not_retryable() {
        assert!(!ProviderError::CircuitOpen.is_retryable());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            ProviderError::from_status(401, "bad key".into()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, "too fast".into()),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "boom".into()),
            ProviderError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn quota_detected_from_body_regardless_of_status() {
        let err = ProviderError::from_status(429, "You exceeded your current quota".into());
        assert!(matches!(err, ProviderError::Quota(_)));
        assert!(!err.is_connectivity());
    }
}
