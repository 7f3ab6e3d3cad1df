use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};

use crate::api::{chat, health, models};
use crate::error::RelayError;
use crate::routing::cors::{preflight_response, with_cors};
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch {
    Preflight,
    Health,
    Models,
    ChatCompletions,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// Every response, including errors, carries the CORS header set.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());

    let response = match route {
        RouteMatch::Preflight => return Ok(preflight_response()),
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::Models => models::handler(&state, &parts.headers),
        RouteMatch::ChatCompletions => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(err) => return Ok(err.into_response()),
            };
            chat::handler(state, parts.headers, body_bytes).await
        }
        RouteMatch::MethodNotAllowed => RelayError::MethodNotAllowed.into_response(),
        RouteMatch::NotFound => {
            RelayError::NotFound(format!("Path not found: {}", parts.uri.path())).into_response()
        }
    };

    Ok(with_cors(response))
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, RelayError> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| RelayError::PayloadTooLarge(DEFAULT_BODY_LIMIT_BYTES))
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    if method == Method::OPTIONS {
        return RouteMatch::Preflight;
    }
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    let (route, allowed) = match path {
        "/" => (RouteMatch::Health, Method::GET),
        "/v1/models" => (RouteMatch::Models, Method::GET),
        "/v1/chat/completions" => (RouteMatch::ChatCompletions, Method::POST),
        _ => return RouteMatch::NotFound,
    };
    if method == allowed {
        route
    } else {
        RouteMatch::MethodNotAllowed
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_known_routes() {
        assert_eq!(match_route(&Method::GET, "/", ""), RouteMatch::Health);
        assert_eq!(
            match_route(&Method::GET, "/v1/models", ""),
            RouteMatch::Models
        );
        assert_eq!(
            match_route(&Method::POST, "/v1/chat/completions", ""),
            RouteMatch::ChatCompletions
        );
    }

    #[test]
    fn test_wrong_method_and_unknown_path() {
        assert_eq!(
            match_route(&Method::GET, "/v1/chat/completions", ""),
            RouteMatch::MethodNotAllowed
        );
        assert_eq!(
            match_route(&Method::POST, "/v1/embeddings", ""),
            RouteMatch::NotFound
        );
    }

    #[test]
    fn test_options_is_preflight_everywhere() {
        assert_eq!(
            match_route(&Method::OPTIONS, "/anything", "/api"),
            RouteMatch::Preflight
        );
    }

    #[test]
    fn test_base_path_handling() {
        assert_eq!(normalize_base_path(" api/ "), "/api");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(
            match_route(&Method::GET, "/api/v1/models", "/api"),
            RouteMatch::Models
        );
        assert_eq!(match_route(&Method::GET, "/api", "/api"), RouteMatch::Health);
        assert_eq!(
            match_route(&Method::GET, "/apiv1/models", "/api"),
            RouteMatch::NotFound
        );
    }
}
