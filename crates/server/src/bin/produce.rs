//! Submit a conversion request from the command line.
//!
//! Reads a request JSON file, expands it into jobs and enqueues them
//! against the given input image, exactly as the HTTP intake does.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixerd_core::{
    ConversionRequest, Intake, SqliteKeyedStore, SqliteWorkQueue, TaskRegistry, WorkQueue,
    TASKS_PREFIX,
};

#[derive(Parser, Debug)]
#[command(name = "produce", about = "Enqueue conversion jobs for an input image")]
struct Args {
    /// Path to the conversion request JSON file
    request: PathBuf,

    /// Path of the source image the jobs will convert
    input: String,

    /// SQLite database file shared with the server and consumers
    #[arg(long, default_value = "pixerd.db")]
    db: PathBuf,

    /// Queue stream name
    #[arg(long, default_value = "jobs")]
    stream: String,

    /// Consumer group name
    #[arg(long, default_value = "workers")]
    group: String,
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

    let request = ConversionRequest::from_json_file(&args.request)
        .with_context(|| format!("Failed to read request from {:?}", args.request))?;

    let queue: Arc<dyn WorkQueue> = Arc::new(
        SqliteWorkQueue::new(&args.db, &args.stream, &args.group, "producer")
            .context("Failed to open work queue")?,
    );
    let registry = Arc::new(TaskRegistry::new(Arc::new(
        SqliteKeyedStore::new(&args.db, TASKS_PREFIX).context("Failed to open task registry")?,
    )));

    let intake = Intake::new(queue, registry);
    let submitted = intake
        .submit(&request, &args.input)
        .await
        .context("Failed to submit request")?;

    println!("Enqueued {} job(s) for {}", submitted.len(), args.input);
    for s in &submitted {
        println!(
            "  {}  {}  {}x{}  (message {})",
            s.job.id, s.job.kind, s.job.resolution.width, s.job.resolution.height, s.message_id
        );
    }

    Ok(())
}
