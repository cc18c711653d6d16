use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Queue names are non-empty
/// - Worker batch size and count are non-zero when workers run
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Queue validation
    if config.queue.stream.is_empty() {
        return Err(ConfigError::ValidationError(
            "queue.stream cannot be empty".to_string(),
        ));
    }
    if config.queue.group.is_empty() {
        return Err(ConfigError::ValidationError(
            "queue.group cannot be empty".to_string(),
        ));
    }
    if config.queue.consumer.is_empty() {
        return Err(ConfigError::ValidationError(
            "queue.consumer cannot be empty".to_string(),
        ));
    }

    // Worker validation
    if config.worker.enabled {
        if config.worker.count == 0 {
            return Err(ConfigError::ValidationError(
                "worker.count cannot be 0 when workers are enabled".to_string(),
            ));
        }
        if config.worker.loop_config.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "worker.batch_size cannot be 0".to_string(),
            ));
        }
    }

    if config.encoder.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "encoder.timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
