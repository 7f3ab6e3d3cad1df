//! `POST /v1/chat/completions`: the per-request orchestrator.
//!
//! Builds the upstream request, dispatches it, then answers either with an
//! SSE stream of `chat.completion.chunk` records or with one
//! `chat.completion` JSON body, depending on the caller's `stream` flag and
//! on what the upstream actually returned.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::RelayError;
use crate::observability::{log_request_complete, DeliveryMode};
use crate::protocol::openai_chat::{OpenAiChatRequest, OpenAiChatResponse};
use crate::protocol::{FrameDecoder, FramePayload};
use crate::state::AppState;
use crate::stream::accumulator::Emissions;
use crate::stream::{
    Aggregator, DeltaAccumulator, FrameLexer, FramePrefix, StreamSession, UpstreamFrame,
};
use crate::transport::{into_body_stream, next_chunk, UpstreamBody};
use crate::util::{truncate_for_log, unix_now_secs};

const STREAM_CHANNEL_CAPACITY: usize = 32;
const LOG_BODY_PREVIEW_BYTES: usize = 512;

/// Chat completions handler. Errors are rendered as JSON error bodies.
pub async fn handler(state: Arc<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    match handle_chat(state, &headers, &body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle_chat(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, RelayError> {
    let start = Instant::now();
    state.authenticate(headers)?;

    let request: OpenAiChatRequest = serde_json::from_slice(body)
        .map_err(|e| RelayError::Internal(format!("Invalid request body: {e}")))?;
    let model = request
        .resolved_model(&state.config.upstream.default_model)
        .to_owned();
    let wants_stream = request.wants_stream();
    let request_id = state.next_request_id();

    tracing::info!(
        request_id = %request_id,
        model = %model,
        stream = wants_stream,
        messages = request.messages.len(),
        upstream = state.upstream.name(),
        "chat request"
    );

    let upstream_request = state.upstream.build_request(&request, &model)?;
    let response = state
        .transport
        .send(upstream_request)
        .await
        .inspect_err(|err| {
            tracing::warn!(request_id = %request_id, model = %model, error = %err, "upstream request failed");
        })?;

    let status = response.status();
    tracing::debug!(request_id = %request_id, status = status.as_u16(), "upstream responded");
    if !status.is_success() {
        let message = read_error_body(response, state.transport.response_timeout()).await;
        tracing::warn!(
            request_id = %request_id,
            model = %model,
            status = status.as_u16(),
            body = truncate_for_log(&message, LOG_BODY_PREVIEW_BYTES),
            "upstream returned error status"
        );
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    let framed = is_framed_content_type(response.headers(), state.upstream.frame_prefix());
    let session = StreamSession::new(request_id, model, unix_now_secs());
    let decoder = state.upstream.decoder();
    let prefix = state.upstream.frame_prefix();
    let read_timeout = state.transport.response_timeout();
    let body = into_body_stream(response);

    if wants_stream && framed {
        tracing::debug!(request_id = %session.request_id, "relaying upstream stream");
        let relay = StreamRelay {
            body,
            lexer: FrameLexer::new(prefix),
            decoder,
            accumulator: DeltaAccumulator::new(session),
            read_timeout,
            start,
        };
        return Ok(spawn_stream_relay(relay));
    }

    if wants_stream {
        tracing::debug!(
            request_id = %session.request_id,
            "upstream did not return an event stream, answering with a single completion"
        );
    }
    aggregate_response(body, session, decoder, prefix, framed, read_timeout, start).await
}

/// Whether the upstream body is line-framed: SSE, or NDJSON when the
/// upstream is configured for bare lines.
fn is_framed_content_type(headers: &HeaderMap, prefix: FramePrefix) -> bool {
    let Some(content_type) = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/event-stream")
        || (prefix == FramePrefix::None && content_type.contains("ndjson"))
}

async fn read_error_body(response: reqwest::Response, timeout: Duration) -> String {
    match tokio::time::timeout(timeout, response.text()).await {
        Ok(Ok(text)) if !text.is_empty() => text,
        Ok(Ok(_)) => "empty upstream error body".to_string(),
        Ok(Err(err)) => format!("failed to read upstream error body: {err}"),
        Err(_) => "timed out reading upstream error body".to_string(),
    }
}

struct StreamRelay {
    body: UpstreamBody,
    lexer: FrameLexer,
    decoder: &'static dyn FrameDecoder,
    accumulator: DeltaAccumulator,
    read_timeout: Duration,
    start: Instant,
}

fn spawn_stream_relay(relay: StreamRelay) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(relay.run(tx));
    sse_ok_response(Body::from_stream(ReceiverStream::new(rx)))
}

impl StreamRelay {
    async fn run(mut self, tx: mpsc::Sender<Result<Bytes, Infallible>>) {
        let mut frames = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                () = tx.closed() => {
                    tracing::debug!(
                        request_id = %self.accumulator.session().request_id,
                        "client disconnected, dropping upstream stream"
                    );
                    return;
                }
                next = next_chunk(&mut self.body, self.read_timeout) => next,
            };

            let emissions = match next {
                Ok(Some(chunk)) => {
                    self.lexer.feed_into(&chunk, &mut frames);
                    let mut out = Emissions::new();
                    for frame in frames.drain(..) {
                        out.extend(self.accumulator.push(self.decoder.decode(&frame)));
                    }
                    out
                }
                Ok(None) => {
                    let mut out = Emissions::new();
                    if let Some(frame) = self.lexer.flush() {
                        out.extend(self.accumulator.push(self.decoder.decode(&frame)));
                    }
                    out.extend(self.accumulator.finish());
                    out
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = %self.accumulator.session().request_id,
                        error = %err,
                        "upstream stream failed"
                    );
                    self.accumulator.fail(&err.to_string())
                }
            };

            for emission in emissions {
                if tx.send(Ok(emission.into_bytes())).await.is_err() {
                    return;
                }
            }
            if self.accumulator.session().is_terminated() {
                break;
            }
        }

        let session = self.accumulator.into_session();
        log_request_complete(
            &session.request_id,
            &session.model,
            DeliveryMode::Stream,
            session.emitted_chars(),
            self.start,
        );
    }
}

#[inline]
fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

async fn aggregate_response(
    mut body: UpstreamBody,
    session: StreamSession,
    decoder: &'static dyn FrameDecoder,
    prefix: FramePrefix,
    framed: bool,
    read_timeout: Duration,
    start: Instant,
) -> Result<Response, RelayError> {
    let text = if framed {
        aggregate_frames(&mut body, decoder, prefix, read_timeout).await
    } else {
        aggregate_whole_body(&mut body, decoder, prefix, read_timeout).await
    }
    .inspect_err(|err| {
        tracing::warn!(request_id = %session.request_id, error = %err, "aggregation failed");
    })?;

    log_request_complete(
        &session.request_id,
        &session.model,
        DeliveryMode::Aggregate,
        text.chars().count(),
        start,
    );
    let StreamSession {
        request_id,
        model,
        created,
        ..
    } = session;
    Ok(Json(OpenAiChatResponse::from_text(request_id, model, created, text)).into_response())
}

/// Fold a line-framed body into text, stopping at the first terminal event.
async fn aggregate_frames(
    body: &mut UpstreamBody,
    decoder: &dyn FrameDecoder,
    prefix: FramePrefix,
    read_timeout: Duration,
) -> Result<String, RelayError> {
    let mut lexer = FrameLexer::new(prefix);
    let mut aggregator = Aggregator::new();
    let mut frames = Vec::new();

    while let Some(chunk) = next_chunk(body, read_timeout).await? {
        lexer.feed_into(&chunk, &mut frames);
        for frame in frames.drain(..) {
            aggregator.push(decoder.decode(&frame))?;
        }
        if aggregator.is_finished() {
            return Ok(aggregator.into_text());
        }
    }
    if let Some(frame) = lexer.flush() {
        aggregator.push(decoder.decode(&frame))?;
    }
    Ok(aggregator.into_text())
}

/// Non-event-stream body: one JSON document if it parses as one, otherwise
/// lexed like a stream.
async fn aggregate_whole_body(
    body: &mut UpstreamBody,
    decoder: &dyn FrameDecoder,
    prefix: FramePrefix,
    read_timeout: Duration,
) -> Result<String, RelayError> {
    let mut collected = Vec::new();
    while let Some(chunk) = next_chunk(body, read_timeout).await? {
        collected.extend_from_slice(&chunk);
    }

    let whole = UpstreamFrame::new(String::from_utf8_lossy(&collected));
    if let FramePayload::Json(value) = FramePayload::parse(&whole) {
        let mut aggregator = Aggregator::new();
        aggregator.push(decoder.decode_value(&value))?;
        return Ok(aggregator.into_text());
    }

    let mut lexer = FrameLexer::new(prefix);
    let mut frames = lexer.feed(&collected);
    frames.extend(lexer.flush());
    crate::stream::aggregate(frames, decoder)
}
