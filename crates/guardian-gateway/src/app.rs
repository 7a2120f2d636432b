use axum::{routing::get, Router};
use std::sync::Arc;

use guardian_agent::pipeline::MessageContext;
use guardian_agent::ConversationService;
use guardian_core::config::GuardianConfig;
use guardian_moderation::ModerationPipeline;

/// Central shared state: passed as `Arc<AppState>` to Axum handlers and to
/// the Telegram adapter.
pub struct AppState {
    pub config: GuardianConfig,
    /// `None` when `moderation.enabled` is false.
    pub moderation: Option<ModerationPipeline>,
    pub conversations: ConversationService,
}

impl AppState {
    pub fn new(
        config: GuardianConfig,
        moderation: Option<ModerationPipeline>,
        conversations: ConversationService,
    ) -> Self {
        Self {
            config,
            moderation,
            conversations,
        }
    }
}

impl MessageContext for AppState {
    fn moderation(&self) -> Option<&ModerationPipeline> {
        self.moderation.as_ref()
    }

    fn conversations(&self) -> &ConversationService {
        &self.conversations
    }

    fn config(&self) -> &GuardianConfig {
        &self.config
    }
}

/// Assemble the status router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/conversations/{id}/stats",
            get(crate::http::stats::stats_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
