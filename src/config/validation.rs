use super::models::Settings;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum SettingsValidationError {
    #[error("dispatch.timeout must be positive")]
    ZeroTimeout,

    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,

    #[error("retry.multiplier must be a finite number >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("retry.initial_backoff ({initial}) exceeds retry.max_backoff ({max})")]
    BackoffOrder { initial: String, max: String },

    #[error("Invalid telemetry.log_filter '{filter}': {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

/// Validate the entire configuration
pub fn validate(settings: &Settings) -> Result<(), SettingsValidationError> {
    validate_dispatch(settings)?;
    validate_retry(settings)?;
    validate_telemetry(settings)?;
    Ok(())
}

fn validate_dispatch(settings: &Settings) -> Result<(), SettingsValidationError> {
    if settings.dispatch.timeout.0.is_zero() {
        return Err(SettingsValidationError::ZeroTimeout);
    }
    Ok(())
}

fn validate_retry(settings: &Settings) -> Result<(), SettingsValidationError> {
    let retry = &settings.retry;
    if retry.max_attempts == 0 {
        return Err(SettingsValidationError::NoAttempts);
    }

    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        return Err(SettingsValidationError::InvalidMultiplier(retry.multiplier));
    }

    if retry.initial_backoff > retry.max_backoff {
        return Err(SettingsValidationError::BackoffOrder {
            initial: retry.initial_backoff.to_string(),
            max: retry.max_backoff.to_string(),
        });
    }

    Ok(())
}

fn validate_telemetry(settings: &Settings) -> Result<(), SettingsValidationError> {
    let filter = &settings.telemetry.log_filter;
    EnvFilter::try_new(filter).map_err(|e| SettingsValidationError::InvalidLogFilter {
        filter: filter.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}
