//! Build worker service.
//!
//! Consumes build request envelopes from the queue with manual
//! acknowledgement: completed and terminally-failed builds ack, transient
//! failures leave the envelope pending so the reclaim pass redelivers it
//! after the visibility timeout. Output paths are overwritten on re-runs,
//! so duplicate deliveries are harmless.

mod blob_cache;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use metbuild::ExternalRegridder;
use storage::{Catalog, ObjectStorage, ObjectStorageConfig, RequestQueue, Requests};

use crate::blob_cache::BlobCache;
use crate::worker::{Outcome, Worker};

#[derive(Parser, Debug)]
#[command(name = "build-worker")]
#[command(about = "Worker that materializes build requests")]
struct Args {
    /// Worker name (for the consumer group)
    #[arg(short, long, env = "WORKER_NAME")]
    name: Option<String>,

    /// Database DSN
    #[arg(long, env = "METGET_DATABASE_URL")]
    database_url: String,

    /// Queue URI
    #[arg(long, env = "METGET_QUEUE_URL", default_value = "redis://redis:6379")]
    queue_url: String,

    /// Maximum attempts before a request fails terminally
    #[arg(long, env = "METGET_MAX_TRIES", default_value = "3")]
    max_tries: i32,

    /// Seconds a silent run holds its claim before redelivery
    #[arg(long, env = "METGET_VISIBILITY_TIMEOUT", default_value = "1800")]
    visibility_timeout_secs: i64,

    /// Blob cache budget in megabytes
    #[arg(long, default_value = "512")]
    cache_mb: usize,

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
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let worker_name = args
        .name
        .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));

    info!(name = %worker_name, "Starting build worker");

    let catalog = Catalog::connect(&args.database_url)
        .await
        .context("Failed to connect to database")?;
    catalog.migrate().await.context("Migration failed")?;
    let requests = Requests::new(catalog.pool().clone());

    let fields = ObjectStorage::new(&ObjectStorageConfig::from_env("METGET_S3_BUCKET"))
        .context("Failed to create field bucket client")?;
    let uploads = ObjectStorage::new(&ObjectStorageConfig::from_env("METGET_S3_BUCKET_UPLOAD"))
        .context("Failed to create upload bucket client")?;

    let regridder =
        ExternalRegridder::from_env().context("Regrid kernel is not configured")?;

    let mut queue = RequestQueue::connect(&args.queue_url)
        .await
        .context("Failed to connect to queue")?;

    let mut worker = Worker {
        catalog,
        requests,
        fields,
        uploads,
        regridder: Box::new(regridder),
        cache: BlobCache::new(args.cache_mb * 1024 * 1024),
        max_tries: args.max_tries,
        visibility_timeout_secs: args.visibility_timeout_secs,
    };

    let visibility_ms = (args.visibility_timeout_secs * 1000) as usize;

    info!("Connected; entering work loop");

    loop {
        // Reclaimed envelopes (crashed or stalled peers) take priority.
        let delivery = match queue.reclaim(&worker_name, visibility_ms).await {
            Ok(mut reclaimed) if !reclaimed.is_empty() => Some(reclaimed.remove(0)),
            Ok(_) => match queue.claim(&worker_name, 5000).await {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, "Claim failed");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    None
                }
            },
            Err(e) => {
                error!(error = %e, "Reclaim failed");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                None
            }
        };

        let Some(delivery) = delivery else {
            continue;
        };

        info!(
            request_id = %delivery.envelope.request_id,
            entry_id = %delivery.entry_id,
            "Processing envelope"
        );

        let outcome = worker.process(&delivery).await;
        match outcome {
            Outcome::Completed | Outcome::Failed | Outcome::Duplicate => {
                if let Err(e) = queue.ack(&delivery.entry_id).await {
                    error!(error = %e, "Ack failed");
                }
            }
            Outcome::Retry => {
                // No ack: the envelope stays pending and comes back via
                // reclaim after the visibility timeout.
            }
        }
    }
}
