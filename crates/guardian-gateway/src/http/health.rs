use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use guardian_agent::pipeline::MessageContext;

use crate::app::AppState;

/// GET /health: liveness plus the state of the classifier and the backend.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let conversations = state.conversations();
    let backend = conversations.backend();

    let moderation = match state.moderation() {
        Some(pipeline) => json!({
            "enabled": true,
            "classifier": pipeline.classifier_name(),
            "threshold": pipeline.policy().threshold(),
            "watched_labels": pipeline.policy().watched_labels(),
            "stats": pipeline.stats(),
        }),
        None => json!({ "enabled": false }),
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("GUARDIAN_GIT_SHA"),
        "moderation": moderation,
        "backend": {
            "name": backend.name(),
            "model": conversations.model(),
            "available": backend.is_available().await,
        },
        "conversations": conversations.store().len(),
    }))
}
