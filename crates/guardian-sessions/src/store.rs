use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

use guardian_core::types::ConversationId;

use crate::error::Result;
use crate::types::{ConversationContext, ConversationStats};

/// Exclusive access to one conversation for the duration of a turn.
pub type ConversationGuard = OwnedMutexGuard<ConversationContext>;

/// In-memory store of conversation contexts, keyed by conversation id.
///
/// Each conversation sits behind its own async mutex, so every operation on
/// one id is linearized while different ids never wait on each other. The
/// map lock is only held long enough to clone the slot handle.
///
/// Lives from process start to process exit; nothing is persisted.
#[derive(Default)]
pub struct ConversationStore {
    slots: DashMap<ConversationId, Arc<Mutex<ConversationContext>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations seen since startup.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, id: &ConversationId) -> Arc<Mutex<ConversationContext>> {
        if let Some(slot) = self.slots.get(id) {
            return Arc::clone(slot.value());
        }
        let slot = self
            .slots
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(conversation = %id, "conversation created");
                Arc::new(Mutex::new(ConversationContext::new(id.clone())))
            });
        Arc::clone(slot.value())
    }

    /// Lock one conversation, creating it on first use.
    ///
    /// Hold the guard across the whole check → append → generate sequence so
    /// no concurrent reset or append can interleave.
    pub async fn lock(&self, id: &ConversationId) -> ConversationGuard {
        self.slot(id).lock_owned().await
    }

    /// Snapshot of the context (creates on miss).
    pub async fn get(&self, id: &ConversationId) -> ConversationContext {
        self.lock(id).await.clone()
    }

    #[instrument(skip(self, content), fields(conversation = %id))]
    pub async fn append_user_turn(&self, id: &ConversationId, content: &str) {
        self.lock(id).await.push_user(content);
    }

    #[instrument(skip(self, content), fields(conversation = %id))]
    pub async fn append_assistant_turn(&self, id: &ConversationId, content: &str) -> Result<()> {
        self.lock(id).await.push_assistant(content)
    }

    /// Replace the context with an empty one under the same id.
    #[instrument(skip(self), fields(conversation = %id))]
    pub async fn reset(&self, id: &ConversationId) {
        self.lock(id).await.clear();
        info!("conversation context cleared");
    }

    /// Stats without creating a context for unseen ids.
    pub async fn stats(&self, id: &ConversationId, limit: u32) -> ConversationStats {
        let slot = self.slots.get(id).map(|s| Arc::clone(s.value()));
        match slot {
            Some(slot) => ConversationStats::of(&*slot.lock().await, limit),
            None => ConversationStats::empty(limit),
        }
    }
}
