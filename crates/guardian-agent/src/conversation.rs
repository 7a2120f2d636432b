//! Per-conversation turn service.
//!
//! `ConversationService::respond` runs one full turn while holding the
//! conversation's lock: overflow check → (reset + single retry) → append user
//! turn → render → generate → append assistant turn.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use guardian_core::types::ConversationId;
use guardian_sessions::{
    prompt, ConversationContext, ConversationStats, ConversationStore, OverflowPolicy,
};

use crate::provider::{GenerateRequest, GenerationBackend, ProviderError, SamplingOptions};

/// Notice sent when the history was cleared before answering.
pub const CONTEXT_CLEARED_NOTICE: &str =
    "Context limit reached, conversation history cleared.";

/// Answer for one user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// The history was cleared before this answer was generated.
    pub context_cleared: bool,
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Backend(#[from] ProviderError),

    /// A freshly reset context still reported overflow, or the store refused
    /// a turn. Indicates a programming defect.
    #[error("conversation invariant violated: {0}")]
    InvariantViolation(String),
}

impl ConversationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConversationError::Backend(e) => e.user_message(),
            ConversationError::InvariantViolation(_) => {
                "Error: the conversation had to be reset. Please send your message again."
            }
        }
    }
}

/// Result of one attempt against the current context.
enum TurnOutcome {
    ContextCleared,
    Generated(String),
}

pub struct ConversationService {
    store: Arc<ConversationStore>,
    overflow: OverflowPolicy,
    backend: Arc<dyn GenerationBackend>,
    model: String,
    options: SamplingOptions,
}

impl ConversationService {
    pub fn new(
        store: Arc<ConversationStore>,
        overflow: OverflowPolicy,
        backend: Arc<dyn GenerationBackend>,
        model: String,
        options: SamplingOptions,
    ) -> Self {
        Self {
            store,
            overflow,
            backend,
            model,
            options,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn backend(&self) -> &dyn GenerationBackend {
        self.backend.as_ref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    pub async fn stats(&self, id: &ConversationId) -> ConversationStats {
        self.store.stats(id, self.overflow.limit()).await
    }

    pub async fn reset(&self, id: &ConversationId) {
        self.store.reset(id).await;
    }

    /// Answer `input` in conversation `id`.
    ///
    /// On overflow the context is cleared and the same input is retried once
    /// against the empty context. A failed generation leaves the user turn
    /// in the history without a matching assistant turn.
    #[instrument(skip(self, input), fields(conversation = %id, model = %self.model))]
    pub async fn respond(&self, id: &ConversationId, input: &str) -> Result<Reply, ConversationError> {
        if let Err(e) = self.backend.ensure_model(&self.model).await {
            warn!(error = %e, "model check failed, attempting generation anyway");
        }

        let mut guard = self.store.lock(id).await;

        if let TurnOutcome::Generated(text) = self.attempt(&mut guard, input).await? {
            return Ok(Reply {
                text,
                context_cleared: false,
            });
        }

        match self.attempt(&mut guard, input).await? {
            TurnOutcome::Generated(text) => Ok(Reply {
                text,
                context_cleared: true,
            }),
            TurnOutcome::ContextCleared => {
                error!(
                    user_turns = guard.user_turn_count(),
                    limit = self.overflow.limit(),
                    "context still overflowing right after a reset"
                );
                guard.clear();
                Err(ConversationError::InvariantViolation(format!(
                    "context overflowing after reset (limit {})",
                    self.overflow.limit()
                )))
            }
        }
    }

    async fn attempt(
        &self,
        context: &mut ConversationContext,
        input: &str,
    ) -> Result<TurnOutcome, ConversationError> {
        if self.overflow.is_overflowing(context) {
            info!(
                user_turns = context.user_turn_count(),
                limit = self.overflow.limit(),
                "context limit reached, clearing history"
            );
            context.clear();
            return Ok(TurnOutcome::ContextCleared);
        }

        context.push_user(input);

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt::render(context),
            options: self.options,
        };

        let resp = self.backend.generate(&request).await.map_err(|e| {
            warn!(error = %e, backend = self.backend.name(), "generation failed");
            e
        })?;

        info!(
            tokens_in = resp.tokens_in,
            tokens_out = resp.tokens_out,
            model = %resp.model,
            "generation complete"
        );

        context
            .push_assistant(resp.content.as_str())
            .map_err(|e| ConversationError::InvariantViolation(e.to_string()))?;

        Ok(TurnOutcome::Generated(resp.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::provider::GenerateResponse;

    /// Records every prompt; fails with the queued error if any.
    #[derive(Default)]
    struct ScriptedBackend {
        prompts: Mutex<Vec<String>>,
        failures: Mutex<Vec<ProviderError>>,
    }

    impl ScriptedBackend {
        fn fail_next(&self, e: ProviderError) {
            self.failures.lock().unwrap().push(e);
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
            self.prompts.lock().unwrap().push(req.prompt.clone());
            if let Some(e) = self.failures.lock().unwrap().pop() {
                return Err(e);
            }
            let n = self.prompts.lock().unwrap().len();
            Ok(GenerateResponse {
                content: format!("answer {n}"),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }

        async fn ensure_model(&self, _model: &str) -> Result<(), ProviderError> {
            Err(ProviderError::Unavailable("pull endpoint down".into()))
        }
    }

    fn service(limit: u32) -> (ConversationService, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::default());
        let svc = ConversationService::new(
            Arc::new(ConversationStore::new()),
            OverflowPolicy::new(limit),
            Arc::clone(&backend) as Arc<dyn GenerationBackend>,
            "llama3.2".to_string(),
            SamplingOptions::default(),
        );
        (svc, backend)
    }

    #[tokio::test]
    async fn answer_is_appended_after_user_turn() {
        let (svc, backend) = service(60);
        let c1 = ConversationId::from("c1");

        let reply = svc.respond(&c1, "hello").await.expect("respond");
        assert_eq!(reply.text, "answer 1");
        assert!(!reply.context_cleared);

        let reply = svc.respond(&c1, "again").await.expect("respond");
        assert_eq!(reply.text, "answer 2");
        assert_eq!(
            backend.prompts()[1],
            "User: hello\nAssistant: answer 1\nUser: again\n"
        );

        let stats = svc.stats(&c1).await;
        assert_eq!(stats.user_turns, 2);
        assert_eq!(stats.total_turns, 4);
        assert_eq!(stats.turns_remaining, 58);
    }

    #[tokio::test]
    async fn timeout_keeps_only_the_user_turn() {
        let (svc, backend) = service(60);
        let c1 = ConversationId::from("c1");
        svc.respond(&c1, "first").await.expect("respond");

        backend.fail_next(ProviderError::Timeout { secs: 30 });
        let err = svc.respond(&c1, "second").await.unwrap_err();
        assert!(matches!(
            err,
            ConversationError::Backend(ProviderError::Timeout { .. })
        ));
        assert_eq!(
            err.user_message(),
            ProviderError::Timeout { secs: 30 }.user_message()
        );

        let ctx = svc.store().get(&c1).await;
        assert_eq!(ctx.history().len(), 3);
        assert_eq!(ctx.history().last().map(|t| t.content.as_str()), Some("second"));

        let stats = svc.stats(&c1).await;
        assert_eq!(stats.user_turns, 2);
        assert_eq!(stats.total_turns, 3);

        // the retry replays the unanswered user turn in the prompt
        svc.respond(&c1, "third").await.expect("respond");
        assert!(backend
            .prompts()
            .last()
            .expect("prompt")
            .ends_with("User: second\nUser: third\n"));
    }

    #[tokio::test]
    async fn sixty_first_message_runs_against_empty_context() {
        let (svc, backend) = service(60);
        let c1 = ConversationId::from("C1");

        for i in 1..=60 {
            let reply = svc
                .respond(&c1, &format!("message {i}"))
                .await
                .expect("respond");
            assert!(!reply.context_cleared);
        }
        assert_eq!(svc.stats(&c1).await.user_turns, 60);

        let reply = svc.respond(&c1, "message 61").await.expect("respond");
        assert!(reply.context_cleared);

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 61);
        assert_eq!(prompts[60], "User: message 61\n");

        let ctx = svc.store().get(&c1).await;
        assert_eq!(ctx.user_turn_count(), 1);
        assert_eq!(ctx.history().len(), 2);
    }

    #[tokio::test]
    async fn overflow_after_reset_is_an_invariant_violation() {
        // a zero limit overflows even on an empty context
        let (svc, backend) = service(0);
        let c1 = ConversationId::from("c1");

        let err = svc.respond(&c1, "hi").await.unwrap_err();
        assert!(matches!(err, ConversationError::InvariantViolation(_)));
        assert!(backend.prompts().is_empty());
        assert!(svc.store().get(&c1).await.is_empty());
    }

    #[tokio::test]
    async fn failure_in_one_conversation_leaves_others_alone() {
        let (svc, backend) = service(60);
        let a = ConversationId::from("a");
        let b = ConversationId::from("b");
        svc.respond(&b, "hello").await.expect("respond");

        backend.fail_next(ProviderError::Unavailable("refused".into()));
        assert!(svc.respond(&a, "hi").await.is_err());

        let ctx_b = svc.store().get(&b).await;
        assert_eq!(ctx_b.history().len(), 2);
    }
}
