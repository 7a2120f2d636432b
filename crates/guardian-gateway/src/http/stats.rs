use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use guardian_agent::pipeline::MessageContext;
use guardian_core::types::ConversationId;

use crate::app::AppState;

/// GET /conversations/{id}/stats: context usage for one conversation.
///
/// Unknown ids report an empty context rather than 404.
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    let conversations = state.conversations();
    let id = ConversationId::from(id);
    let stats = conversations.stats(&id).await;

    Json(json!({
        "conversation_id": id,
        "limit": conversations.overflow_policy().limit(),
        "stats": stats,
    }))
}
