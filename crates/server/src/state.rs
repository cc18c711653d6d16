use std::path::PathBuf;
use std::sync::Arc;

use pixerd_core::{Config, HistoryLedger, Intake, TaskRegistry, WorkQueue};

/// Shared application state
pub struct AppState {
    config: Config,
    intake: Intake,
    queue: Arc<dyn WorkQueue>,
    registry: Arc<TaskRegistry>,
    history: Arc<HistoryLedger>,
}

impl AppState {
    pub fn new(
        config: Config,
        queue: Arc<dyn WorkQueue>,
        registry: Arc<TaskRegistry>,
        history: Arc<HistoryLedger>,
    ) -> Self {
        Self {
            config,
            intake: Intake::new(Arc::clone(&queue), Arc::clone(&registry)),
            queue,
            registry,
            history,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn intake(&self) -> &Intake {
        &self.intake
    }

    #[allow(dead_code)]
    pub fn queue(&self) -> &dyn WorkQueue {
        self.queue.as_ref()
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.registry.as_ref()
    }

    pub fn history(&self) -> &HistoryLedger {
        self.history.as_ref()
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.config.uploads.dir.clone()
    }
}
