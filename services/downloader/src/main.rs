//! Meteorological data downloader service.
//!
//! One invocation drives a single source: discover candidate files
//! upstream, skip anything already catalogued, fetch the rest, store the
//! bytes, and index them. Per-candidate failures are logged and skipped;
//! nothing aborts the pass. Duplicate work between overlapping
//! invocations resolves through the catalog's uniqueness constraints.

mod retention;
mod run;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use metget_common::Service;
use storage::{Catalog, ObjectStorage, ObjectStorageConfig};

#[derive(Parser, Debug)]
#[command(name = "downloader")]
#[command(about = "Catalog ingestion for upstream forecast data")]
struct Args {
    /// Service to ingest (gfs-ncep, nam-ncep, hrrr-ncep, hrrr-alaska-ncep,
    /// gefs-ncep, wpc-ncep, hwrf, hafs-a, hafs-b, coamps-tc, ctcx, nhc)
    #[arg(short, long)]
    service: String,

    /// Run once and exit (vs continuous polling)
    #[arg(long)]
    once: bool,

    /// Seconds between polls in continuous mode
    #[arg(long, default_value = "900")]
    poll_interval_secs: u64,

    /// Hours of history to examine for new cycles
    #[arg(long, default_value = "48")]
    lookback_hours: i64,

    /// Run the retention sweep instead of ingestion
    #[arg(long)]
    retention_sweep: bool,

    /// Retention horizon in days for the sweep
    #[arg(long, default_value = "30")]
    retention_days: i64,

    /// Database DSN
    #[arg(long, env = "METGET_DATABASE_URL")]
    database_url: String,

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

    let service = Service::from_name(&args.service)
        .with_context(|| format!("Unknown service '{}'", args.service))?;

    info!(service = %service, "Starting downloader");

    let catalog = Catalog::connect(&args.database_url)
        .await
        .context("Failed to connect to database")?;
    catalog.migrate().await.context("Migration failed")?;

    let store = ObjectStorage::new(&ObjectStorageConfig::from_env("METGET_S3_BUCKET"))
        .context("Failed to create object store client")?;

    if args.retention_sweep {
        let removed =
            retention::sweep(&catalog, &store, service, args.retention_days).await?;
        info!(service = %service, removed = removed, "Retention sweep complete");
        return Ok(());
    }

    let ingest = run::Ingest {
        catalog,
        store,
        service,
        lookback_hours: args.lookback_hours,
    };

    if args.once {
        let stats = ingest.run_once().await?;
        info!(
            service = %service,
            discovered = stats.discovered,
            fetched = stats.fetched,
            skipped = stats.skipped,
            failed = stats.failed,
            "Ingestion pass complete"
        );
        return Ok(());
    }

    info!(
        interval_secs = args.poll_interval_secs,
        "Starting continuous polling"
    );
    loop {
        match ingest.run_once().await {
            Ok(stats) => info!(
                service = %service,
                discovered = stats.discovered,
                fetched = stats.fetched,
                skipped = stats.skipped,
                failed = stats.failed,
                "Ingestion pass complete"
            ),
            Err(e) => tracing::error!(service = %service, error = %e, "Ingestion pass failed"),
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(args.poll_interval_secs)) => {}
        }
    }

    Ok(())
}
