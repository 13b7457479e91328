//! Server configuration.
//!
//! Values come from environment variables with workable defaults; the
//! binary's CLI flags override host/port. Directories are created at
//! startup by the binary.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the subforge server process.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Where uploaded media lands.
    pub upload_dir: PathBuf,
    /// Scratch space for audio extracts and clips.
    pub temp_dir: PathBuf,
    /// Where finished caption files are served from.
    pub download_dir: PathBuf,
    /// Upload body cap in bytes (default 10 GB).
    pub max_upload_bytes: u64,
    /// How long finished/failed jobs stay queryable (default 2 h).
    pub job_retention: Duration,
    /// Cadence of the expired-job sweep (default 30 min).
    pub job_sweep_interval: Duration,
    /// Cadence of the admission-cache eviction sweep (default 10 min).
    pub admission_sweep_interval: Duration,
    /// Interval between SSE progress events (default 2 s).
    pub sse_interval: Duration,
    /// API key for the transcription/translation provider.
    pub provider_api_key: String,
    /// Override for the provider base URL (tests, proxies).
    pub provider_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            upload_dir: PathBuf::from("./uploads"),
            temp_dir: PathBuf::from("./temp"),
            download_dir: PathBuf::from("./downloads"),
            max_upload_bytes: 10 * 1024 * 1024 * 1024,
            job_retention: Duration::from_secs(2 * 60 * 60),
            job_sweep_interval: Duration::from_secs(30 * 60),
            admission_sweep_interval: Duration::from_secs(10 * 60),
            sse_interval: Duration::from_secs(2),
            provider_api_key: String::new(),
            provider_base_url: None,
        }
    }
}

impl ServerConfig {
    /// Build from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("SUBFORGE_HOST", defaults.host),
            port: env_parse("SUBFORGE_PORT", defaults.port),
            upload_dir: env_path("SUBFORGE_UPLOAD_DIR", defaults.upload_dir),
            temp_dir: env_path("SUBFORGE_TEMP_DIR", defaults.temp_dir),
            download_dir: env_path("SUBFORGE_DOWNLOAD_DIR", defaults.download_dir),
            max_upload_bytes: env_parse("SUBFORGE_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            provider_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            provider_base_url: std::env::var("SUBFORGE_PROVIDER_BASE_URL").ok(),
            ..defaults
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.job_retention, Duration::from_secs(7200));
        assert_eq!(config.sse_interval, Duration::from_secs(2));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024 * 1024);
    }
}
