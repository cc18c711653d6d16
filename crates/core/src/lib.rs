pub mod config;
pub mod encoder;
pub mod history;
pub mod intake;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod request;
pub mod store;
pub mod testing;
pub mod worker;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use encoder::{Encode, EncoderError, MagickEncoder};
pub use history::{HistoryLedger, HistoryRecord, Outcome, FAILURE_PREFIX, SUCCESS_PREFIX};
pub use intake::{Intake, IntakeError, SubmittedJob};
pub use job::{expand, Job, JobKind, JobStatus};
pub use queue::{MessageId, QueueError, QueueMessage, SqliteWorkQueue, WorkQueue};
pub use registry::{RegistryError, TaskRegistry, TASKS_PREFIX};
pub use request::{ConversionRequest, RequestError};
pub use store::{KeyedStore, SqliteKeyedStore, StoreError};
pub use worker::{Worker, WorkerConfig};
