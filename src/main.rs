use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use video_optimizer::config::AppConfig;
use video_optimizer::infrastructure::{staging, transcoders};
use video_optimizer::services::cleanup::CleanupScheduler;
use video_optimizer::{AppState, create_app};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for uploaded and optimized videos (overrides STAGING_DIR)
    #[arg(short, long)]
    staging_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_optimizer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Video Optimizer...");

    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.staging_dir {
        config.staging_dir = dir;
    }

    info!(
        "⚙️  Config: Max Upload={}MB, Cleanup Delay={}s, Concurrent Jobs={}",
        config.max_upload_size / 1024 / 1024,
        config.cleanup_delay.as_secs(),
        if config.is_bounded() {
            config.max_concurrent_jobs.to_string()
        } else {
            "unbounded".to_string()
        }
    );

    // Setup Infrastructure
    let staging_area = staging::setup_staging(&config).await?;
    let transcoder_set = transcoders::setup_transcoders(&config).await;

    // Setup Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Start Cleanup Worker
    let (cleanup, cleanup_worker) = CleanupScheduler::new(config.cleanup_delay, shutdown_rx);
    let worker_handle = tokio::spawn(cleanup_worker.run());

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, staging_area, transcoder_set, cleanup);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr.as_str()).await?;
    let addr = listener.local_addr()?;
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = worker_handle.await;
    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
