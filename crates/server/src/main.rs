use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixerd_core::{
    load_config, validate_config, Config, Encode, HistoryLedger, MagickEncoder, SqliteKeyedStore,
    SqliteWorkQueue, TaskRegistry, Worker, WorkQueue, TASKS_PREFIX,
};

use pixerd_server::{create_router, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PIXERD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration; a missing file means built-in defaults
    let config = if config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
        load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        info!("No config file at {:?}, using defaults", config_path);
        Config::default()
    };

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Database path: {:?}", config.database.path);
    info!("Uploads directory: {:?}", config.uploads.dir);

    // Create queue, registry and ledger, all on one SQLite file
    let queue: Arc<dyn WorkQueue> = Arc::new(
        SqliteWorkQueue::new(
            &config.database.path,
            &config.queue.stream,
            &config.queue.group,
            &config.queue.consumer,
        )
        .context("Failed to create work queue")?,
    );
    info!(
        stream = config.queue.stream,
        group = config.queue.group,
        "Work queue initialized"
    );

    let registry = Arc::new(TaskRegistry::new(Arc::new(
        SqliteKeyedStore::new(&config.database.path, TASKS_PREFIX)
            .context("Failed to create task registry store")?,
    )));
    info!("Task registry initialized");

    let history = Arc::new(
        HistoryLedger::open_sqlite(&config.database.path)
            .context("Failed to create history ledger")?,
    );
    info!("History ledger initialized");

    // Uploads directory must exist before the first request
    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .with_context(|| format!("Failed to create uploads dir {:?}", config.uploads.dir))?;

    // Start in-process workers if enabled
    let mut workers: Vec<Worker> = Vec::new();
    let mut worker_handles: Vec<tokio::task::JoinHandle<()>> = Vec::new();
    if config.worker.enabled {
        let encoder: Arc<dyn Encode> = Arc::new(
            MagickEncoder::new(
                config.encoder.binary.clone(),
                Duration::from_secs(config.encoder.timeout_secs),
            )
            .context("Failed to create encoder")?,
        );

        for i in 1..=config.worker.count {
            // Each worker is its own queue consumer so reclaimed
            // leases are attributable
            let consumer = if config.worker.count == 1 {
                config.queue.consumer.clone()
            } else {
                format!("{}-{}", config.queue.consumer, i)
            };
            let worker_queue: Arc<dyn WorkQueue> = Arc::new(
                SqliteWorkQueue::new(
                    &config.database.path,
                    &config.queue.stream,
                    &config.queue.group,
                    &consumer,
                )
                .with_context(|| format!("Failed to create queue for worker {}", consumer))?,
            );

            let worker = Worker::new(
                config.worker.loop_config.clone(),
                worker_queue,
                Arc::clone(&registry),
                Arc::clone(&history),
                Arc::clone(&encoder),
            );
            worker_handles.push(worker.start());
            workers.push(worker);
            info!(consumer, "Worker started");
        }
    } else {
        info!("In-process workers disabled in config");
    }

    // Create app state and router
    let state = Arc::new(AppState::new(
        config.clone(),
        queue,
        Arc::clone(&registry),
        Arc::clone(&history),
    ));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop workers and wait for their loops to drain
    info!("Server shutting down...");
    for worker in &workers {
        worker.stop();
    }
    for handle in worker_handles {
        let _ = handle.await;
    }
    info!("Workers stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
