//! Standalone queue consumer.
//!
//! Runs a single worker loop against a shared database, competing
//! with the server's in-process workers and any other consumers in
//! the same group. Useful for scaling encoding out across processes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixerd_core::{
    Encode, HistoryLedger, MagickEncoder, SqliteKeyedStore, SqliteWorkQueue, TaskRegistry, Worker,
    WorkerConfig, WorkQueue, TASKS_PREFIX,
};

#[derive(Parser, Debug)]
#[command(name = "consume", about = "Run a standalone conversion worker")]
struct Args {
    /// SQLite database file shared with the server and producers
    #[arg(long, default_value = "pixerd.db")]
    db: PathBuf,

    /// Queue stream name
    #[arg(long, default_value = "jobs")]
    stream: String,

    /// Consumer group name
    #[arg(long, default_value = "workers")]
    group: String,

    /// Consumer name; must be unique within the group
    #[arg(long, default_value = "consumer-1")]
    consumer: String,

    /// Explicit ImageMagick binary; located on $PATH when unset
    #[arg(long)]
    magick: Option<PathBuf>,

    /// Encode timeout in seconds
    #[arg(long, default_value_t = 120)]
    encode_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let queue: Arc<dyn WorkQueue> = Arc::new(
        SqliteWorkQueue::new(&args.db, &args.stream, &args.group, &args.consumer)
            .context("Failed to open work queue")?,
    );
    let registry = Arc::new(TaskRegistry::new(Arc::new(
        SqliteKeyedStore::new(&args.db, TASKS_PREFIX).context("Failed to open task registry")?,
    )));
    let history =
        Arc::new(HistoryLedger::open_sqlite(&args.db).context("Failed to open history ledger")?);
    let encoder: Arc<dyn Encode> = Arc::new(
        MagickEncoder::new(
            args.magick.clone(),
            Duration::from_secs(args.encode_timeout_secs),
        )
        .context("Failed to create encoder")?,
    );

    let worker = Worker::new(WorkerConfig::default(), queue, registry, history, encoder);
    let handle = worker.start();
    info!(consumer = args.consumer, "Consumer running, Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;

    info!("Shutting down...");
    worker.stop();
    let _ = handle.await;

    Ok(())
}
