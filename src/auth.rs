use http::header::AUTHORIZATION;

use crate::config::AppConfig;
use crate::error::RelayError;

/// Pre-formatted client key used on the request hot path.
#[derive(Debug, Clone)]
pub enum ClientKey {
    /// No key configured: every request is accepted.
    Disabled,
    /// Full expected header value, `Bearer <key>`.
    Bearer(Box<str>),
}

impl ClientKey {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let key = config.client_authentication.api_key.trim();
        if key.is_empty() {
            ClientKey::Disabled
        } else {
            ClientKey::Bearer(format!("Bearer {key}").into_boxed_str())
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, ClientKey::Bearer(_))
    }
}

/// Authenticate an incoming request against the configured key.
///
/// The header must equal `Bearer <key>` exactly.
///
/// # Errors
///
/// Returns `RelayError::Unauthorized` when the header is missing and
/// `RelayError::Forbidden` when it does not match.
pub fn authenticate(headers: &http::HeaderMap, key: &ClientKey) -> Result<(), RelayError> {
    let ClientKey::Bearer(bearer) = key else {
        return Ok(());
    };
    match headers.get(AUTHORIZATION) {
        Some(value) if value.as_bytes() == bearer.as_bytes() => Ok(()),
        Some(_) => Err(RelayError::Forbidden("Invalid API key".to_string())),
        None => Err(RelayError::Unauthorized("Missing API key".to_string())),
    }
}
