//! Upstream payload builders and the prepared upstream used on the hot path.

mod ai_sdk;
mod openai;
mod token;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};

pub use ai_sdk::AiSdkPayloadBuilder;
pub use openai::OpenAiPayloadBuilder;
pub use token::TokenPayloadBuilder;

use crate::config::{ConfigError, UpstreamConfig};
use crate::error::RelayError;
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::protocol::{FrameDecoder, UpstreamKind};
use crate::stream::FramePrefix;

/// A fully built upstream HTTP request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: url::Url,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

/// Translates an inbound chat request into the upstream's JSON body.
pub trait UpstreamRequestBuilder: Send + Sync {
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] when the payload cannot be serialized.
    fn build_body(&self, request: &OpenAiChatRequest, model: &str) -> Result<Bytes, RelayError>;
}

pub(crate) fn to_json_bytes<T: serde::Serialize>(payload: &T) -> Result<Bytes, RelayError> {
    serde_json::to_vec(payload)
        .map(Bytes::from)
        .map_err(|e| RelayError::Internal(format!("Failed to encode upstream payload: {e}")))
}

/// Upstream metadata resolved once at startup: parsed URL, header set,
/// builder, decoder and frame prefix.
pub struct PreparedUpstream {
    name: String,
    kind: UpstreamKind,
    url: url::Url,
    headers: http::HeaderMap,
    builder: Box<dyn UpstreamRequestBuilder>,
    prefix: FramePrefix,
}

impl std::fmt::Debug for PreparedUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedUpstream")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.url.as_str())
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PreparedUpstream {
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the URL or a header does not parse.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, ConfigError> {
        let url = url::Url::parse(upstream.url.trim()).map_err(|e| {
            ConfigError::Validation(format!("Upstream '{}': invalid url: {e}", upstream.name))
        })?;
        let builder: Box<dyn UpstreamRequestBuilder> = match upstream.kind {
            UpstreamKind::AiSdk => Box::new(AiSdkPayloadBuilder::new(upstream.web_search)),
            UpstreamKind::Token => Box::new(TokenPayloadBuilder),
            UpstreamKind::OpenAi => Box::new(OpenAiPayloadBuilder),
        };
        let prefix = if upstream.ndjson {
            FramePrefix::None
        } else {
            FramePrefix::Data
        };

        Ok(Self {
            name: upstream.name.clone(),
            kind: upstream.kind,
            url,
            headers: build_static_headers(upstream)?,
            builder,
            prefix,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> UpstreamKind {
        self.kind
    }

    #[must_use]
    pub fn decoder(&self) -> &'static dyn FrameDecoder {
        self.kind.decoder()
    }

    #[must_use]
    pub fn frame_prefix(&self) -> FramePrefix {
        self.prefix
    }

    /// # Errors
    ///
    /// Propagates builder serialization failures.
    pub fn build_request(
        &self,
        request: &OpenAiChatRequest,
        model: &str,
    ) -> Result<UpstreamRequest, RelayError> {
        Ok(UpstreamRequest {
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.builder.build_body(request, model)?,
        })
    }
}

fn build_static_headers(upstream: &UpstreamConfig) -> Result<http::HeaderMap, ConfigError> {
    let mut headers = http::HeaderMap::with_capacity(upstream.headers.len() + 1);
    for (name, value) in &upstream.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ConfigError::Validation(format!("Upstream '{}': header '{name}': {e}", upstream.name))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("Upstream '{}': header '{name}': {e}", upstream.name))
        })?;
        headers.insert(name, value);
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}
