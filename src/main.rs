use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use docplan::{
    config::Config,
    llm::{ProviderOrchestrator, ProviderRegistry},
    middleware::apply_cors,
    queue::{ImportPipeline, ImportService},
    routes::create_router,
    settings::ConfigStorage,
    utils::init_logger,
    AppState,
};

#[derive(Parser, Debug)]
#[command(name = "docplan", version, about = "Document to project plan import service")]
struct Args {
    /// Path to the AI provider configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration: defaults < environment < CLI flags
    let mut config = Config::from_env()?;
    if let Some(path) = args.config {
        config.ai_config_path = path;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let loaded = ConfigStorage::new(&config.ai_config_path).load_or_create().await?;
    let ai_config = loaded.config;

    // Initialize tracing; the guard flushes the file sink on exit
    let _log_guard = init_logger(&ai_config.error_handling);
    info!(server = ?config.server, pipeline = ?config.pipeline, "Configuration loaded");
    if loaded.created {
        info!(path = %config.ai_config_path.display(), "Wrote default AI configuration");
    }
    for name in &loaded.unresolved {
        warn!(variable = %name, "AI config placeholder has no value, using empty string");
    }
    for warning in ai_config.validate()? {
        warn!("{warning}");
    }

    let registry = ProviderRegistry::builtin();
    let orchestrator = Arc::new(ProviderOrchestrator::from_config(&ai_config, &registry));
    if orchestrator.available().is_empty() {
        warn!("No usable LLM provider, every import job will fail until one is configured");
    }
    let pipeline = Arc::new(ImportPipeline::new(orchestrator, &ai_config));

    let shutdown = CancellationToken::new();
    let import = ImportService::start(
        &config.pipeline,
        pipeline,
        ai_config.error_handling.max_errors,
        shutdown.clone(),
    );

    // Create shared state and router
    let state = AppState {
        config: config.clone(),
        import: import.clone(),
    };
    let app = apply_cors(create_router(state), &config.server.cors_allowed_origins)
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(addr = %listener.local_addr()?, "Server listening");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            signal_token.cancel();
        })
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    import.shutdown().await;
    Ok(())
}
