use std::time::Duration;

use futures_util::StreamExt;

use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::upstream::UpstreamRequest;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
    use_env_proxy: bool,
) -> Result<reqwest::Client, RelayError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout);

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Boxed upstream body stream as handed to the stream consumers.
pub type UpstreamBody =
    futures_util::stream::BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>;

/// HTTP transport client for sending requests to the chat upstream.
pub struct HttpTransport {
    client: reqwest::Client,
    response_timeout: Duration,
}

impl HttpTransport {
    /// Create a new transport with connection pooling and timeouts from the given server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        let client = match build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(config.timeout),
            config.http_use_env_proxy,
        ) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        };

        Self {
            client,
            response_timeout: Duration::from_secs(config.upstream_response_timeout_secs.max(1)),
        }
    }

    /// Bound on waiting for response headers and for each body read.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// POST a prepared request and wait for the response headers.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Timeout`] when headers do not arrive within the
    /// response timeout and [`RelayError::Transport`] when the request fails.
    pub async fn send(&self, request: UpstreamRequest) -> Result<reqwest::Response, RelayError> {
        let UpstreamRequest { url, headers, body } = request;
        let pending = self
            .client
            .post(url)
            .headers(headers)
            .body(reqwest::Body::from(body))
            .send();

        match tokio::time::timeout(self.response_timeout, pending).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(map_reqwest_error(&err)),
            Err(_) => Err(RelayError::Timeout(format!(
                "no response headers within {}s",
                self.response_timeout.as_secs()
            ))),
        }
    }
}

/// Turn a response into a boxed byte stream.
#[must_use]
pub fn into_body_stream(response: reqwest::Response) -> UpstreamBody {
    response.bytes_stream().boxed()
}

/// Read the next body chunk, bounded by `timeout`. `Ok(None)` is end of body.
///
/// # Errors
///
/// Returns [`RelayError::Timeout`] when the upstream stalls and
/// [`RelayError::Transport`] when the connection fails mid-body.
pub async fn next_chunk(
    body: &mut UpstreamBody,
    timeout: Duration,
) -> Result<Option<bytes::Bytes>, RelayError> {
    match tokio::time::timeout(timeout, body.next()).await {
        Ok(Some(Ok(chunk))) => Ok(Some(chunk)),
        Ok(Some(Err(err))) => Err(map_reqwest_error(&err)),
        Ok(None) => Ok(None),
        Err(_) => Err(RelayError::Timeout(format!(
            "upstream stalled for {}s",
            timeout.as_secs()
        ))),
    }
}

fn map_reqwest_error(err: &reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout(err.to_string())
    } else {
        RelayError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_timeout_from_config() {
        let transport = HttpTransport::new(&ServerConfig {
            upstream_response_timeout_secs: 7,
            ..ServerConfig::default()
        });
        assert_eq!(transport.response_timeout(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_next_chunk_times_out_on_stalled_body() {
        let mut body: UpstreamBody = futures_util::stream::pending().boxed();
        let err = next_chunk(&mut body, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_next_chunk_end_of_body() {
        let mut body: UpstreamBody = futures_util::stream::iter(vec![Ok(bytes::Bytes::from_static(
            b"data: x\n",
        ))])
        .boxed();
        let first = next_chunk(&mut body, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.as_deref(), Some(&b"data: x\n"[..]));
        assert!(next_chunk(&mut body, Duration::from_secs(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_send_to_closed_port_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(&ServerConfig::default());
        let err = transport
            .send(UpstreamRequest {
                url: url::Url::parse(&format!("http://{addr}/api/chat")).unwrap(),
                headers: http::HeaderMap::new(),
                body: bytes::Bytes::from_static(b"{}"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
