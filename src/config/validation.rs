use super::models::{Config, RetryPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("At least one retry tier must be configured")]
    NoRetryTiers,

    #[error("Retry tier {index} is invalid: {reason}")]
    InvalidRetryTier { index: usize, reason: String },

    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("Invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_import(config)?;
    validate_retry_tiers(config)?;
    validate_wayback(config)?;
    validate_database(config)?;
    Ok(())
}

fn validate_import(config: &Config) -> Result<(), ValidationError> {
    if config.import.parallel == 0 {
        return Err(ValidationError::NotPositive {
            field: "import.parallel",
        });
    }

    if config.import.unplaybackable_ttl.as_duration().is_zero() {
        return Err(ValidationError::NotPositive {
            field: "import.unplaybackable_ttl",
        });
    }

    if config.worklist.page_chunk_size == 0 {
        return Err(ValidationError::NotPositive {
            field: "worklist.page_chunk_size",
        });
    }

    Ok(())
}

fn validate_retry_tiers(config: &Config) -> Result<(), ValidationError> {
    if config.retry.tiers.is_empty() {
        return Err(ValidationError::NoRetryTiers);
    }

    for (index, tier) in config.retry.tiers.iter().enumerate() {
        validate_policy(tier).map_err(|reason| ValidationError::InvalidRetryTier { index, reason })?;
    }

    Ok(())
}

fn validate_policy(policy: &RetryPolicy) -> Result<(), String> {
    if policy.timeout.as_duration().is_zero() {
        return Err("timeout must be positive".to_string());
    }
    if !policy.backoff_factor.is_finite() || policy.backoff_factor < 0.0 {
        return Err(format!(
            "backoff_factor must be a non-negative number, got {}",
            policy.backoff_factor
        ));
    }
    Ok(())
}

fn validate_wayback(config: &Config) -> Result<(), ValidationError> {
    if config.wayback.page_size == 0 {
        return Err(ValidationError::NotPositive {
            field: "wayback.page_size",
        });
    }

    for (field, value) in [
        ("wayback.cdx_url", &config.wayback.cdx_url),
        ("wayback.web_url", &config.wayback.web_url),
    ] {
        if url::Url::parse(value).is_err() {
            return Err(ValidationError::InvalidUrl {
                field,
                value: value.clone(),
            });
        }
    }

    validate_policy(&config.wayback.index_retry).map_err(|reason| {
        ValidationError::InvalidRetryTier {
            index: usize::MAX,
            reason: format!("wayback.index_retry: {}", reason),
        }
    })
}

fn validate_database(config: &Config) -> Result<(), ValidationError> {
    if config.database.import_batch_size == 0 {
        return Err(ValidationError::NotPositive {
            field: "database.import_batch_size",
        });
    }

    if url::Url::parse(&config.database.url).is_err() {
        return Err(ValidationError::InvalidUrl {
            field: "database.url",
            value: config.database.url.clone(),
        });
    }

    Ok(())
}
