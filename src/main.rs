//! Handoff hub - shared bus and artifact store for delegating agents

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use handoff::artifact::SqliteArtifactBackend;
use handoff::bus::InMemoryBus;
use handoff::server::{self, AppState};
use handoff::SubstrateConfig;

#[derive(Parser)]
#[command(name = "handoff")]
#[command(about = "Hub serving the Handoff bus and artifact store over HTTP")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "HANDOFF_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// SQLite database holding artifacts
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:handoff.db?mode=rwc")]
    database_url: String,

    /// Largest artifact accepted in one upload
    #[arg(long, env = "HANDOFF_MAX_ARTIFACT_BYTES", default_value_t = 64 * 1024 * 1024)]
    max_artifact_bytes: usize,

    /// Delete artifacts older than this many seconds (kept forever when unset)
    #[arg(long, env = "HANDOFF_ARTIFACT_RETENTION_SECS")]
    artifact_retention_secs: Option<u64>,

    /// How often expired streams and artifacts are swept
    #[arg(long, env = "HANDOFF_SWEEP_INTERVAL_SECS", default_value_t = 30)]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handoff=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = SubstrateConfig::from_env()?;

    // Database connection
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let bus = Arc::new(InMemoryBus::from_config(&config));
    let artifacts = Arc::new(SqliteArtifactBackend::new(pool));

    spawn_sweeper(
        bus.clone(),
        artifacts.clone(),
        Duration::from_secs(args.sweep_interval_secs.max(1)),
        args.artifact_retention_secs.map(Duration::from_secs),
    );

    let state = AppState::new(bus, artifacts, args.max_artifact_bytes);

    // Build router
    let app = server::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!("Hub listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_sweeper(
    bus: Arc<InMemoryBus>,
    artifacts: Arc<SqliteArtifactBackend>,
    every: Duration,
    artifact_retention: Option<Duration>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;

            let purged = bus.purge_expired().await;
            if purged > 0 {
                tracing::debug!("Purged {} expired streams", purged);
            }

            let Some(retention) = artifact_retention else {
                continue;
            };
            let cutoff = match chrono::Duration::from_std(retention) {
                Ok(age) => chrono::Utc::now() - age,
                Err(e) => {
                    tracing::error!("Invalid artifact retention: {}", e);
                    continue;
                }
            };
            match artifacts.delete_older_than(cutoff).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Deleted {} expired artifacts", n),
                Err(e) => tracing::error!("Artifact sweep failed: {}", e),
            }
        }
    });
}
