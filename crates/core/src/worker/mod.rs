//! Background worker: consumes jobs from the queue and encodes them.

mod config;
mod runner;

pub use config::WorkerConfig;
pub use runner::Worker;
