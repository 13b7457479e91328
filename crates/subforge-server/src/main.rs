//! subforge — subtitle generation server.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use subforge_engine::classify::LexicalClassifier;
use subforge_engine::fallback::FallbackChain;
use subforge_engine::orchestrator::OrchestratorConfig;
use subforge_engine::provider::{TranscriptionProvider, TranslationProvider};
use subforge_engine::{
    CircuitBreaker, OpenAiConfig, OpenAiProvider, QualityFilter, TranscriptionOrchestrator,
    TranslateConfig, TranslationStage,
};
use subforge_media::{FfmpegToolkit, MediaToolkit, SegmenterConfig};
use subforge_server::sweeper::{spawn_admission_sweeper, spawn_job_sweeper};
use subforge_server::{
    AdmissionController, AppState, JobPipeline, JobStore, ServerConfig, router,
};

#[derive(Debug, Parser)]
#[command(name = "subforge", about = "Media-to-subtitles transcription server")]
struct Args {
    /// Bind host (overrides SUBFORGE_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides SUBFORGE_PORT).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    for dir in [&config.upload_dir, &config.temp_dir, &config.download_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    if config.provider_api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set — jobs will use the alternative transcription path");
    }
    if !FfmpegToolkit::is_available().await {
        warn!("ffmpeg not found on PATH — media extraction will fail");
    }

    let config = Arc::new(config);
    let state = build_state(config.clone());

    let cancel = CancellationToken::new();
    let sweepers = vec![
        spawn_job_sweeper(
            state.jobs.clone(),
            config.job_retention,
            config.job_sweep_interval,
            cancel.clone(),
        ),
        spawn_admission_sweeper(
            state.admission.clone(),
            config.admission_sweep_interval,
            cancel.clone(),
        ),
    ];

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %listener.local_addr()?, "subforge listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down");
    cancel.cancel();
    for sweeper in sweepers {
        let _ = sweeper.await;
    }
    drain_temp_dir(&config).await;
    Ok(())
}

fn build_state(config: Arc<ServerConfig>) -> AppState {
    let toolkit: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit);

    let mut provider_config = OpenAiConfig::new(config.provider_api_key.clone());
    if let Some(base_url) = &config.provider_base_url {
        provider_config.base_url = base_url.clone();
    }
    let provider = Arc::new(OpenAiProvider::new(provider_config));
    let transcriber: Arc<dyn TranscriptionProvider> = provider.clone();
    let translator: Arc<dyn TranslationProvider> = provider;

    let jobs = Arc::new(JobStore::new());
    let admission = Arc::new(AdmissionController::default());
    let breaker = Arc::new(CircuitBreaker::default());
    let filter = Arc::new(QualityFilter::with_defaults());

    let orchestrator = TranscriptionOrchestrator::new(
        transcriber,
        breaker,
        toolkit.clone(),
        filter,
        FallbackChain::new(toolkit.clone()),
        OrchestratorConfig::default(),
        SegmenterConfig::default(),
    );
    let translation = TranslationStage::new(translator, TranslateConfig::default());

    let pipeline = Arc::new(JobPipeline::new(
        toolkit,
        orchestrator,
        translation,
        Arc::new(LexicalClassifier::default()),
        jobs.clone(),
        config.clone(),
    ));

    AppState {
        config,
        jobs,
        admission,
        pipeline,
        started_at: Instant::now(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Scratch files from interrupted jobs have no owner after shutdown.
async fn drain_temp_dir(config: &ServerConfig) {
    let Ok(mut entries) = tokio::fs::read_dir(&config.temp_dir).await else {
        return;
    };
    let mut removed = 0usize;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if tokio::fs::remove_file(entry.path()).await.is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, "cleaned temp directory");
    }
}
