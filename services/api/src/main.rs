//! MetGet request intake API.
//!
//! Receives build/check/status calls, authenticates API keys, accounts
//! credit, and publishes accepted requests onto the work queue. Long
//! running work never happens here; /build validates, debits, persists,
//! publishes, and returns.

mod handlers;
mod ratelimit;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use storage::{ApiKeys, Catalog, ObjectStorage, ObjectStorageConfig, RequestQueue, Requests};

use crate::ratelimit::RateLimitState;
use crate::state::{ApiConfig, AppState};

#[derive(Parser, Debug)]
#[command(name = "api")]
#[command(about = "MetGet request intake API")]
struct Args {
    /// Listen port
    #[arg(long, env = "METGET_API_PORT", default_value = "8080")]
    port: u16,

    /// Database DSN
    #[arg(long, env = "METGET_DATABASE_URL")]
    database_url: String,

    /// Queue URI
    #[arg(long, env = "METGET_QUEUE_URL", default_value = "redis://redis:6379")]
    queue_url: String,

    /// Refuse requests that exceed the key's credit limit
    #[arg(long, env = "METGET_ENFORCE_CREDIT_LIMITS", default_value = "true")]
    enforce_credit_limits: bool,

    /// Presigned result URL lifetime, hours
    #[arg(long, env = "METGET_REQUEST_URL_TTL_HOURS", default_value = "48")]
    request_url_ttl_hours: u64,

    /// Requests per minute allowed per API key
    #[arg(long, env = "METGET_RATE_LIMIT_PER_MINUTE", default_value = "120")]
    rate_limit_per_minute: u32,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting metget API");

    let catalog = Catalog::connect(&args.database_url)
        .await
        .context("Failed to connect to database")?;
    catalog.migrate().await.context("Migration failed")?;

    let requests = Requests::new(catalog.pool().clone());
    let apikeys = ApiKeys::new(catalog.pool().clone());

    let queue = RequestQueue::connect(&args.queue_url)
        .await
        .context("Failed to connect to queue")?;

    let uploads = ObjectStorage::new(&ObjectStorageConfig::from_env("METGET_S3_BUCKET_UPLOAD"))
        .context("Failed to create upload bucket client")?;

    let state = Arc::new(AppState {
        catalog,
        requests,
        apikeys,
        queue: Mutex::new(queue),
        uploads,
        ratelimit: RateLimitState::new(args.rate_limit_per_minute),
        config: ApiConfig {
            enforce_credit_limits: args.enforce_credit_limits,
            presign_ttl: Duration::from_secs(args.request_url_ttl_hours * 3600),
        },
    });

    let app = handlers::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!(port = args.port, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
