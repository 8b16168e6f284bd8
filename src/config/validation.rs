//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (table bindings reference datasets with servers)
//! - Validate value ranges (timeouts > 0, lag thresholds > 0, min_tries > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FarmConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{FarmConfig, ServerConfig};

/// One semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("servers[{index}]: {field} must not be empty")]
    EmptyField { index: usize, field: &'static str },

    #[error("servers[{index}]: connect_timeout_ms must be greater than 0")]
    ZeroTimeout { index: usize },

    #[error("servers[{index}]: lag_threshold_secs must be a positive number, got {value}")]
    InvalidLagThreshold { index: usize, value: f64 },

    #[error("router.default_connect_timeout_ms must be greater than 0")]
    ZeroDefaultTimeout,

    #[error("router.default_lag_threshold_secs must be a positive number, got {0}")]
    InvalidDefaultLagThreshold(f64),

    #[error("router.min_tries must be at least 1")]
    ZeroMinTries,

    #[error("table '{table}' is bound to dataset '{dataset}', which has no servers")]
    UnknownDataset { table: String, dataset: String },
}

fn valid_threshold(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn validate_server(index: usize, server: &ServerConfig, errors: &mut Vec<ValidationError>) {
    for (field, value) in [
        ("dataset", &server.dataset),
        ("host", &server.host),
        ("user", &server.user),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::EmptyField { index, field });
        }
    }

    if server.connect_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroTimeout { index });
    }

    if let Some(value) = server.lag_threshold_secs.filter(|v| !valid_threshold(*v)) {
        errors.push(ValidationError::InvalidLagThreshold { index, value });
    }
}

/// Check a parsed config.
pub fn validate_config(config: &FarmConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.router.default_connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroDefaultTimeout);
    }
    if let Some(value) = config
        .router
        .default_lag_threshold_secs
        .filter(|v| !valid_threshold(*v))
    {
        errors.push(ValidationError::InvalidDefaultLagThreshold(value));
    }
    if config.router.min_tries == 0 {
        errors.push(ValidationError::ZeroMinTries);
    }

    for (index, server) in config.servers.iter().enumerate() {
        validate_server(index, server, &mut errors);
    }

    let datasets: HashSet<&str> = config.servers.iter().map(|s| s.dataset.as_str()).collect();
    for (table, dataset) in &config.tables {
        if !datasets.contains(dataset.as_str()) {
            errors.push(ValidationError::UnknownDataset {
                table: table.clone(),
                dataset: dataset.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
