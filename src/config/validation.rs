use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.upstream_response_timeout_secs == 0 {
        return Err(validation_err(
            "server.upstream_response_timeout_secs must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let url = upstream.url.trim();
    if url.is_empty() {
        return Err(validation_err(format!(
            "Upstream '{}': url cannot be empty (set upstream.url or CHAT2API_UPSTREAM_URL)",
            upstream.name
        )));
    }
    let parsed = url::Url::parse(url).map_err(|err| {
        validation_err(format!(
            "Upstream '{}': url is not a valid URL: {err}",
            upstream.name
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "Upstream '{}': url must start with http:// or https://",
            upstream.name
        )));
    }

    if upstream.models.is_empty() {
        return Err(validation_err(format!(
            "Upstream '{}' must have at least one model",
            upstream.name
        )));
    }
    let mut seen = HashSet::new();
    for model in &upstream.models {
        if model.trim().is_empty() {
            return Err(validation_err(format!(
                "Upstream '{}': model name cannot be empty",
                upstream.name
            )));
        }
        if !seen.insert(model.as_str()) {
            return Err(validation_err(format!(
                "Upstream '{}': duplicate model entry '{model}'",
                upstream.name
            )));
        }
    }
    if upstream.default_model.trim().is_empty() {
        return Err(validation_err(format!(
            "Upstream '{}': default_model cannot be empty",
            upstream.name
        )));
    }

    for name in upstream.headers.keys() {
        if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(validation_err(format!(
                "Upstream '{}': invalid header name '{name}'",
                upstream.name
            )));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
