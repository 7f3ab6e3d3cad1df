use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a config summary.
pub fn health_handler(state: &AppState) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "chat2api-rs is running",
        "version": env!("CARGO_PKG_VERSION"),
        "config": {
            "upstream": config.upstream.name,
            "upstream_kind": state.upstream.kind().as_str(),
            "models_count": config.upstream.models.len(),
            "default_model": config.upstream.default_model,
            "auth_enabled": state.auth_enabled(),
            "features": {
                "log_level": config.features.log_level,
            }
        }
    }))
}
