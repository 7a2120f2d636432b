//! Inbound message handling: moderation first, then chat commands.

use tracing::{debug, error, info, warn};

use guardian_core::types::InboundMessage;
use guardian_moderation::{ModerationOutcome, ModerationVerdict, VerdictReason};

use crate::conversation::CONTEXT_CLEARED_NOTICE;

use super::commands::{help_text, Command};
use super::context::{ChatTransport, MessageContext, TransportError};

const STICKER_ERROR: &str = "Error creating sticker.";
const RESET_DONE: &str = "Conversation history cleared.";

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// Sent by the bot itself.
    Ignored,
    /// Moderation removed the message. `deleted` is false when the
    /// transport refused the deletion.
    Removed {
        verdict: ModerationVerdict,
        deleted: bool,
    },
    /// A chat command was handled.
    Command(Command),
    /// Kept; nothing to answer.
    Passed,
}

/// Handle one inbound message end to end.
///
/// Moderation runs before commands so removed media is never answered or
/// turned into a sticker. Moderation errors are logged and the message kept.
pub async fn handle_inbound<C, T>(ctx: &C, transport: &T, msg: &InboundMessage) -> InboundOutcome
where
    C: MessageContext + ?Sized,
    T: ChatTransport + ?Sized,
{
    if msg.from_me {
        return InboundOutcome::Ignored;
    }

    if let Some(verdict) = moderate(ctx, transport, msg).await {
        let deleted = remove(ctx, transport, msg, &verdict).await;
        return InboundOutcome::Removed { verdict, deleted };
    }

    let Some(command) = Command::parse(&msg.body) else {
        return InboundOutcome::Passed;
    };

    debug!(
        channel = transport.name(),
        conversation = %msg.conversation_id,
        ?command,
        "dispatching command"
    );
    run_command(ctx, transport, msg, &command).await;
    InboundOutcome::Command(command)
}

/// `Some(verdict)` when the message must be removed.
async fn moderate<C, T>(ctx: &C, transport: &T, msg: &InboundMessage) -> Option<ModerationVerdict>
where
    C: MessageContext + ?Sized,
    T: ChatTransport + ?Sized,
{
    if !msg.has_media {
        return None;
    }
    let pipeline = ctx.moderation()?;

    let fetch = || async move {
        match transport.download_media(msg).await {
            Ok(payload) => payload.map(|p| p.data),
            Err(e) => {
                warn!(channel = transport.name(), error = %e, "media download failed");
                None
            }
        }
    };

    match pipeline.moderate_message(msg, fetch).await {
        Ok(ModerationOutcome::Verdict(verdict)) if verdict.is_remove() => Some(verdict),
        Ok(ModerationOutcome::Verdict(_)) => None,
        Ok(ModerationOutcome::Skipped(reason)) => {
            debug!(?reason, message_id = %msg.message_id, "moderation skipped");
            None
        }
        Err(e) => {
            warn!(
                error = %e,
                message_id = %msg.message_id,
                "moderation failed, keeping message"
            );
            None
        }
    }
}

async fn remove<C, T>(
    ctx: &C,
    transport: &T,
    msg: &InboundMessage,
    verdict: &ModerationVerdict,
) -> bool
where
    C: MessageContext + ?Sized,
    T: ChatTransport + ?Sized,
{
    info!(
        channel = transport.name(),
        conversation = %msg.conversation_id,
        sender = %msg.sender_id,
        reason = %verdict.reason,
        "removing message"
    );

    if let Err(e) = transport.delete_message(msg, true).await {
        error!(error = %e, message_id = %msg.message_id, "failed to delete message");
        return false;
    }

    // view-once media disappears silently
    if verdict.reason != VerdictReason::ViewOnce {
        let notice = &ctx.config().moderation.removal_notice;
        log_send(transport.send_text(&msg.conversation_id, notice).await);
    }
    true
}

async fn run_command<C, T>(ctx: &C, transport: &T, msg: &InboundMessage, command: &Command)
where
    C: MessageContext + ?Sized,
    T: ChatTransport + ?Sized,
{
    let conversations = ctx.conversations();
    let conversation = &msg.conversation_id;

    match command {
        Command::Ask(question) => {
            transport.start_typing(conversation).await;
            let result = conversations.respond(conversation, question).await;
            transport.stop_typing(conversation).await;

            match result {
                Ok(reply) => {
                    if reply.context_cleared {
                        log_send(transport.send_text(conversation, CONTEXT_CLEARED_NOTICE).await);
                    }
                    log_send(transport.reply(msg, &reply.text).await);
                }
                Err(e) => {
                    warn!(error = %e, conversation = %conversation, "conversation turn failed");
                    log_send(transport.reply(msg, e.user_message()).await);
                }
            }
        }
        Command::Stats => {
            let stats = conversations.stats(conversation).await;
            let text = format!(
                "Context: {}/{} messages used, {} remaining ({} turns stored).",
                stats.user_turns,
                conversations.overflow_policy().limit(),
                stats.turns_remaining,
                stats.total_turns,
            );
            log_send(transport.reply(msg, &text).await);
        }
        Command::Reset => {
            conversations.reset(conversation).await;
            log_send(transport.reply(msg, RESET_DONE).await);
        }
        Command::Sticker => {
            if !msg.has_media {
                return;
            }
            let sent = match transport.download_media(msg).await {
                Ok(Some(media)) => transport.send_sticker(conversation, &media).await,
                Ok(None) => Err(TransportError::Failed {
                    channel: transport.name().to_string(),
                    reason: "media no longer available".to_string(),
                }),
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                warn!(error = %e, "sticker creation failed");
                log_send(transport.reply(msg, STICKER_ERROR).await);
            }
        }
        Command::Help => {
            let text = help_text(ctx.config().conversation.message_limit);
            log_send(transport.reply(msg, &text).await);
        }
    }
}

fn log_send(result: Result<(), TransportError>) {
    if let Err(e) = result {
        warn!(error = %e, "failed to send message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use image::{ImageFormat, RgbImage};

    use guardian_core::config::GuardianConfig;
    use guardian_core::types::{ConversationId, MediaKind, MediaPayload};
    use guardian_moderation::{
        ClassificationResult, ClassifierError, ImageClassifier, ModerationPipeline,
        ModerationPolicy, PixelGrid,
    };
    use guardian_sessions::{ConversationStore, OverflowPolicy};

    use crate::conversation::ConversationService;
    use crate::provider::{
        GenerateRequest, GenerateResponse, GenerationBackend, ProviderError, SamplingOptions,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Text(String),
        Reply(String),
        Sticker(usize),
        Deleted { message_id: String, for_everyone: bool },
        TypingOn,
        TypingOff,
    }

    #[derive(Default)]
    struct FakeTransport {
        media: Option<Vec<u8>>,
        events: Mutex<Vec<Event>>,
        downloads: AtomicUsize,
    }

    impl FakeTransport {
        fn with_media(bytes: Vec<u8>) -> Self {
            Self {
                media: Some(bytes),
                ..Self::default()
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, e: Event) {
            self.events.lock().unwrap().push(e);
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send_text(&self, _to: &ConversationId, text: &str) -> Result<(), TransportError> {
            self.push(Event::Text(text.to_string()));
            Ok(())
        }

        async fn reply(&self, _msg: &InboundMessage, text: &str) -> Result<(), TransportError> {
            self.push(Event::Reply(text.to_string()));
            Ok(())
        }

        async fn send_sticker(
            &self,
            _to: &ConversationId,
            media: &MediaPayload,
        ) -> Result<(), TransportError> {
            self.push(Event::Sticker(media.data.len()));
            Ok(())
        }

        async fn delete_message(
            &self,
            msg: &InboundMessage,
            for_everyone: bool,
        ) -> Result<(), TransportError> {
            self.push(Event::Deleted {
                message_id: msg.message_id.clone(),
                for_everyone,
            });
            Ok(())
        }

        async fn start_typing(&self, _to: &ConversationId) {
            self.push(Event::TypingOn);
        }

        async fn stop_typing(&self, _to: &ConversationId) {
            self.push(Event::TypingOff);
        }

        async fn download_media(
            &self,
            _msg: &InboundMessage,
        ) -> Result<Option<MediaPayload>, TransportError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(self.media.clone().map(|data| MediaPayload {
                mime_type: "image/jpeg".to_string(),
                data,
            }))
        }
    }

    struct FixedClassifier {
        labels: Vec<String>,
        porn: f32,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageClassifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        async fn classify(&self, _pixels: &PixelGrid) -> Result<ClassificationResult, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ClassificationResult::from_pairs([
                ("Porn", self.porn),
                ("Hentai", 0.01),
                ("Neutral", 1.0 - self.porn - 0.01),
            ]))
        }
    }

    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
            if req.prompt.contains("slow") {
                return Err(ProviderError::Timeout { secs: 30 });
            }
            Ok(GenerateResponse {
                content: format!("answered {} bytes", req.prompt.len()),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }
    }

    struct TestContext {
        config: GuardianConfig,
        moderation: ModerationPipeline,
        conversations: ConversationService,
        classifier: Arc<FixedClassifier>,
    }

    impl MessageContext for TestContext {
        fn moderation(&self) -> Option<&ModerationPipeline> {
            Some(&self.moderation)
        }

        fn conversations(&self) -> &ConversationService {
            &self.conversations
        }

        fn config(&self) -> &GuardianConfig {
            &self.config
        }
    }

    fn context(porn: f32, limit: u32) -> TestContext {
        let config = GuardianConfig::default();
        let classifier = Arc::new(FixedClassifier {
            labels: vec!["Porn".into(), "Hentai".into(), "Neutral".into()],
            porn,
            calls: AtomicUsize::new(0),
        });
        let policy = ModerationPolicy::new(0.6, vec!["Porn".into(), "Hentai".into()])
            .expect("policy");
        let moderation =
            ModerationPipeline::new(Arc::clone(&classifier) as Arc<dyn ImageClassifier>, policy)
                .expect("pipeline");
        let conversations = ConversationService::new(
            Arc::new(ConversationStore::new()),
            OverflowPolicy::new(limit),
            Arc::new(EchoBackend),
            "llama3.2".to_string(),
            SamplingOptions::default(),
        );
        TestContext {
            config,
            moderation,
            conversations,
            classifier,
        }
    }

    fn jpeg() -> Vec<u8> {
        let img = RgbImage::from_fn(16, 16, |x, y| image::Rgb([(x * 8) as u8, (y * 8) as u8, 90]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .expect("encode");
        buf
    }

    fn image_msg(body: &str) -> InboundMessage {
        InboundMessage::text("chat-1", "alice", "m1", body).with_media(MediaKind::Image)
    }

    #[tokio::test]
    async fn own_messages_are_ignored() {
        let ctx = context(0.9, 60);
        let transport = FakeTransport::with_media(jpeg());
        let mut msg = image_msg("!ia hi");
        msg.from_me = true;

        assert_eq!(handle_inbound(&ctx, &transport, &msg).await, InboundOutcome::Ignored);
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn explicit_image_is_deleted_for_everyone_with_notice() {
        let ctx = context(0.61, 60);
        let transport = FakeTransport::with_media(jpeg());

        let outcome = handle_inbound(&ctx, &transport, &image_msg("")).await;
        let InboundOutcome::Removed { verdict, deleted } = outcome else {
            panic!("expected removal, got {outcome:?}");
        };
        assert!(deleted);
        assert_eq!(verdict.exceeded_labels(), vec!["Porn"]);

        assert_eq!(
            transport.events(),
            vec![
                Event::Deleted {
                    message_id: "m1".into(),
                    for_everyone: true
                },
                Event::Text(ctx.config.moderation.removal_notice.clone()),
            ]
        );
    }

    #[tokio::test]
    async fn image_at_threshold_is_kept() {
        let ctx = context(0.60, 60);
        let transport = FakeTransport::with_media(jpeg());

        let outcome = handle_inbound(&ctx, &transport, &image_msg("nice pic")).await;
        assert_eq!(outcome, InboundOutcome::Passed);
        assert_eq!(ctx.classifier.calls.load(Ordering::SeqCst), 1);
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn view_once_is_removed_without_classification() {
        let ctx = context(0.0, 60);
        let transport = FakeTransport::with_media(jpeg());
        let mut msg = image_msg("");
        msg.view_once = true;

        let outcome = handle_inbound(&ctx, &transport, &msg).await;
        assert!(matches!(outcome, InboundOutcome::Removed { deleted: true, .. }));
        assert_eq!(ctx.classifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 0);
        assert_eq!(
            transport.events(),
            vec![Event::Deleted {
                message_id: "m1".into(),
                for_everyone: true
            }]
        );
    }

    #[tokio::test]
    async fn undecodable_image_is_kept() {
        let ctx = context(0.99, 60);
        let transport = FakeTransport::with_media(b"\x89PNG not really".to_vec());

        let outcome = handle_inbound(&ctx, &transport, &image_msg("")).await;
        assert_eq!(outcome, InboundOutcome::Passed);
        assert_eq!(ctx.classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ask_replies_inside_typing_indicator() {
        let ctx = context(0.0, 60);
        let transport = FakeTransport::default();
        let msg = InboundMessage::text("chat-1", "alice", "m1", "!ia hello");

        let outcome = handle_inbound(&ctx, &transport, &msg).await;
        assert_eq!(outcome, InboundOutcome::Command(Command::Ask("hello".into())));
        // "User: hello\n" is 12 bytes
        assert_eq!(
            transport.events(),
            vec![
                Event::TypingOn,
                Event::TypingOff,
                Event::Reply("answered 12 bytes".into()),
            ]
        );
    }

    #[tokio::test]
    async fn cleared_context_is_announced_before_the_answer() {
        let ctx = context(0.0, 1);
        let transport = FakeTransport::default();
        let first = InboundMessage::text("chat-1", "alice", "m1", "!ia one");
        let second = InboundMessage::text("chat-1", "alice", "m2", "!ia two");

        handle_inbound(&ctx, &transport, &first).await;
        handle_inbound(&ctx, &transport, &second).await;

        let events = transport.events();
        assert_eq!(events[events.len() - 2], Event::Text(CONTEXT_CLEARED_NOTICE.into()));
        assert_eq!(events[events.len() - 1], Event::Reply("answered 10 bytes".into()));
    }

    #[tokio::test]
    async fn generation_failure_replies_with_user_message() {
        let ctx = context(0.0, 60);
        let transport = FakeTransport::default();
        let msg = InboundMessage::text("chat-1", "alice", "m1", "!ia slow question");

        handle_inbound(&ctx, &transport, &msg).await;
        let expected = ProviderError::Timeout { secs: 30 }.user_message();
        assert_eq!(transport.events().last(), Some(&Event::Reply(expected.into())));

        let stats = ctx.conversations.stats(&msg.conversation_id).await;
        assert_eq!(stats.user_turns, 1);
        assert_eq!(stats.total_turns, 1);
    }

    #[tokio::test]
    async fn stats_and_reset() {
        let ctx = context(0.0, 60);
        let transport = FakeTransport::default();
        let ask = InboundMessage::text("chat-1", "alice", "m1", "!ia hi");
        let stats = InboundMessage::text("chat-1", "alice", "m2", "!stats");
        let reset = InboundMessage::text("chat-1", "alice", "m3", "!reset");

        handle_inbound(&ctx, &transport, &ask).await;
        handle_inbound(&ctx, &transport, &stats).await;
        assert_eq!(
            transport.events().last(),
            Some(&Event::Reply(
                "Context: 1/60 messages used, 59 remaining (2 turns stored).".into()
            ))
        );

        handle_inbound(&ctx, &transport, &reset).await;
        assert_eq!(transport.events().last(), Some(&Event::Reply(RESET_DONE.into())));
        assert!(ctx
            .conversations
            .store()
            .get(&ask.conversation_id)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn sticker_is_sent_back_for_clean_image() {
        let ctx = context(0.1, 60);
        let bytes = jpeg();
        let len = bytes.len();
        let transport = FakeTransport::with_media(bytes);

        let outcome = handle_inbound(&ctx, &transport, &image_msg("!sticker")).await;
        assert_eq!(outcome, InboundOutcome::Command(Command::Sticker));
        assert_eq!(transport.events(), vec![Event::Sticker(len)]);
    }

    #[tokio::test]
    async fn sticker_without_payload_reports_error() {
        let ctx = context(0.1, 60);
        let transport = FakeTransport::default();
        let msg = InboundMessage::text("chat-1", "alice", "m1", "!sticker")
            .with_media(MediaKind::Video);

        handle_inbound(&ctx, &transport, &msg).await;
        assert_eq!(transport.events(), vec![Event::Reply(STICKER_ERROR.into())]);
    }

    #[tokio::test]
    async fn plain_text_passes_silently() {
        let ctx = context(0.0, 60);
        let transport = FakeTransport::default();
        let msg = InboundMessage::text("chat-1", "alice", "m1", "just chatting");

        assert_eq!(handle_inbound(&ctx, &transport, &msg).await, InboundOutcome::Passed);
        assert!(transport.events().is_empty());
    }
}
