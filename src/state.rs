mod request_id;

use bytes::Bytes;

use crate::auth::{authenticate, ClientKey};
use crate::config::{AppConfig, ConfigError};
use crate::error::RelayError;
use crate::protocol::openai_chat::OpenAiModelList;
use crate::transport::HttpTransport;
use crate::upstream::PreparedUpstream;
use crate::util::unix_now_secs;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers. Immutable after startup.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub upstream: PreparedUpstream,
    client_key: ClientKey,
    models_response_body: Bytes,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: HttpTransport,
        upstream: PreparedUpstream,
        client_key: ClientKey,
    ) -> Self {
        let models_response_body = build_models_response_body(&config);
        Self {
            config,
            transport,
            upstream,
            client_key,
            models_response_body,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build every component from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the upstream cannot be prepared.
    pub fn from_config(config: AppConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(&config.server);
        let upstream = PreparedUpstream::new(&config.upstream)?;
        let client_key = ClientKey::from_config(&config);
        Ok(Self::new(config, transport, upstream, client_key))
    }

    /// Authenticate a `/v1/*` request against the configured key.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Unauthorized` / `RelayError::Forbidden` on a
    /// missing or wrong key.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), RelayError> {
        authenticate(headers, &self.client_key)
    }

    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        self.client_key.is_enabled()
    }

    /// Next `chatcmpl-<uuid>` id; unique per request.
    #[must_use]
    pub fn next_request_id(&self) -> String {
        self.request_ids.next_id("chatcmpl-")
    }

    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }
}

fn build_models_response_body(config: &AppConfig) -> Bytes {
    let list = OpenAiModelList::new(
        config.upstream.models.iter().map(String::as_str),
        unix_now_secs(),
        &config.upstream.owned_by,
    );
    match serde_json::to_vec(&list) {
        Ok(body) => Bytes::from(body),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode models list");
            Bytes::from_static(b"{\"object\":\"list\",\"data\":[]}")
        }
    }
}
