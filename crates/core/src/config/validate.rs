use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Search timeout, poll interval and request timeout are positive
/// - At least one subpage worker
/// - `max_results` is positive unless `disable_max` is set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let search = &config.search;
    if search.timeout_secs == 0 && !search.auto_timeout {
        return Err(ConfigError::ValidationError(
            "search.timeout_secs cannot be 0".to_string(),
        ));
    }
    if search.effective_timeout().is_zero() {
        return Err(ConfigError::ValidationError(
            "search.host_timeout_secs leaves no time for searching".to_string(),
        ));
    }
    if search.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "search.poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if search.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "search.request_timeout_secs cannot be 0".to_string(),
        ));
    }
    if search.subpage_workers == 0 {
        return Err(ConfigError::ValidationError(
            "search.subpage_workers cannot be 0".to_string(),
        ));
    }
    if search.max_results == 0 && !search.disable_max {
        return Err(ConfigError::ValidationError(
            "search.max_results cannot be 0 unless search.disable_max is set".to_string(),
        ));
    }

    Ok(())
}
