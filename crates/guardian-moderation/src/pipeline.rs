//! Moderation pipeline: view-once short-circuit → decode → classify → policy.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use guardian_core::types::InboundMessage;

use crate::classifier::ImageClassifier;
use crate::decode::{decode, DecodeError, DecodeOutcome};
use crate::error::{ModerationError, PolicyConfigError};
use crate::policy::{ModerationPolicy, ModerationVerdict};

/// Why a message went through without a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Not an image (video, audio, sticker, …).
    NotAnImage,
    /// The transport could not produce the media bytes.
    NoPayload,
    /// Decoding failed; the image is let through unmoderated.
    Decode(DecodeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModerationOutcome {
    Verdict(ModerationVerdict),
    Skipped(SkipReason),
}

impl ModerationOutcome {
    pub fn is_remove(&self) -> bool {
        matches!(self, ModerationOutcome::Verdict(v) if v.is_remove())
    }
}

/// Running counters, exposed by the health endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ModerationStats {
    pub classified: u64,
    pub removed: u64,
    pub view_once_removed: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    classified: AtomicU64,
    removed: AtomicU64,
    view_once_removed: AtomicU64,
    skipped: AtomicU64,
}

/// Shared moderation pipeline. Built once at startup with a loaded classifier.
pub struct ModerationPipeline {
    classifier: Arc<dyn ImageClassifier>,
    policy: ModerationPolicy,
    counters: Counters,
}

impl ModerationPipeline {
    /// Fails when the classifier vocabulary lacks a watched label.
    pub fn new(
        classifier: Arc<dyn ImageClassifier>,
        policy: ModerationPolicy,
    ) -> Result<Self, PolicyConfigError> {
        policy.validate_vocabulary(classifier.labels())?;
        Ok(Self {
            classifier,
            policy,
            counters: Counters::default(),
        })
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn policy(&self) -> &ModerationPolicy {
        &self.policy
    }

    pub fn stats(&self) -> ModerationStats {
        ModerationStats {
            classified: self.counters.classified.load(Ordering::Relaxed),
            removed: self.counters.removed.load(Ordering::Relaxed),
            view_once_removed: self.counters.view_once_removed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// Moderate one inbound message.
    ///
    /// `fetch_media` is only awaited for images that are not view-once; a
    /// view-once message is removed without downloading or classifying.
    #[instrument(skip_all, fields(conversation = %msg.conversation_id, message = %msg.message_id))]
    pub async fn moderate_message<F, Fut>(
        &self,
        msg: &InboundMessage,
        fetch_media: F,
    ) -> Result<ModerationOutcome, ModerationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Vec<u8>>>,
    {
        if msg.view_once {
            info!(sender = %msg.sender_id, "view-once media detected");
            self.counters
                .view_once_removed
                .fetch_add(1, Ordering::Relaxed);
            return Ok(ModerationOutcome::Verdict(ModerationVerdict::view_once()));
        }

        if !msg.is_image() {
            return Ok(ModerationOutcome::Skipped(SkipReason::NotAnImage));
        }

        match fetch_media().await {
            Some(bytes) => self.moderate_image(&bytes).await,
            None => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                debug!("media payload unavailable, skipping");
                Ok(ModerationOutcome::Skipped(SkipReason::NoPayload))
            }
        }
    }

    /// Decode, classify and judge one encoded image.
    pub async fn moderate_image(&self, bytes: &[u8]) -> Result<ModerationOutcome, ModerationError> {
        // The pixel grid lives only for this block.
        let result = {
            let pixels = match decode(bytes) {
                DecodeOutcome::Decoded(pixels) => pixels,
                DecodeOutcome::Skipped(reason) => {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!(%reason, "image not decodable, left unmoderated");
                    return Ok(ModerationOutcome::Skipped(SkipReason::Decode(reason)));
                }
            };
            self.classifier.classify(&pixels).await?
        };
        self.counters.classified.fetch_add(1, Ordering::Relaxed);

        debug!(
            probabilities = ?result.iter().collect::<Vec<_>>(),
            "image classified"
        );

        let verdict = self.policy.decide(&result)?;
        if verdict.is_remove() {
            self.counters.removed.fetch_add(1, Ordering::Relaxed);
            info!(reason = %verdict.reason, "image flagged for removal");
        }
        Ok(ModerationOutcome::Verdict(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use async_trait::async_trait;
    use guardian_core::types::MediaKind;
    use image::ImageFormat;

    use crate::classifier::ClassificationResult;
    use crate::decode::tests::encode;
    use crate::decode::PixelGrid;
    use crate::error::ClassifierError;
    use crate::policy::ModerationAction;

    struct FixedClassifier {
        labels: Vec<String>,
        result: ClassificationResult,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(porn: f32, hentai: f32) -> Self {
            Self {
                labels: ["Drawing", "Hentai", "Neutral", "Porn", "Sexy"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                result: ClassificationResult::from_pairs([
                    ("Drawing", 0.0),
                    ("Hentai", hentai),
                    ("Neutral", 0.0),
                    ("Porn", porn),
                    ("Sexy", 0.0),
                ]),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageClassifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }
        fn labels(&self) -> &[String] {
            &self.labels
        }
        async fn classify(
            &self,
            _pixels: &PixelGrid,
        ) -> Result<ClassificationResult, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn pipeline(classifier: Arc<FixedClassifier>) -> ModerationPipeline {
        let policy = ModerationPolicy::new(0.6, vec!["Porn".into(), "Hentai".into()])
            .expect("policy");
        ModerationPipeline::new(classifier, policy).expect("pipeline")
    }

    fn image_msg() -> InboundMessage {
        InboundMessage::text("c1", "u1", "m1", "").with_media(MediaKind::Image)
    }

    #[tokio::test]
    async fn view_once_removes_without_classifying() {
        let classifier = Arc::new(FixedClassifier::new(0.0, 0.0));
        let pipeline = pipeline(Arc::clone(&classifier));

        let mut msg = image_msg();
        msg.view_once = true;
        let fetched = AtomicBool::new(false);
        let outcome = pipeline
            .moderate_message(&msg, || async {
                fetched.store(true, Ordering::SeqCst);
                None
            })
            .await
            .expect("moderate");

        assert!(outcome.is_remove());
        assert_eq!(
            outcome,
            ModerationOutcome::Verdict(ModerationVerdict::view_once())
        );
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert!(!fetched.load(Ordering::SeqCst));
        assert_eq!(pipeline.stats().view_once_removed, 1);
    }

    #[tokio::test]
    async fn explicit_jpeg_is_removed() {
        let classifier = Arc::new(FixedClassifier::new(0.61, 0.0));
        let pipeline = pipeline(Arc::clone(&classifier));
        let jpeg = encode(8, 8, ImageFormat::Jpeg);

        let outcome = pipeline
            .moderate_message(&image_msg(), || async move { Some(jpeg) })
            .await
            .expect("moderate");

        match outcome {
            ModerationOutcome::Verdict(v) => {
                assert_eq!(v.action, ModerationAction::Remove);
                assert_eq!(v.exceeded_labels(), vec!["Porn"]);
            }
            other => panic!("expected verdict, got {other:?}"),
        }
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.stats().removed, 1);
    }

    #[tokio::test]
    async fn clean_jpeg_is_allowed() {
        let classifier = Arc::new(FixedClassifier::new(0.2, 0.1));
        let pipeline = pipeline(classifier);
        let outcome = pipeline
            .moderate_image(&encode(8, 8, ImageFormat::Jpeg))
            .await
            .expect("moderate");
        assert_eq!(
            outcome,
            ModerationOutcome::Verdict(ModerationVerdict::allow())
        );
    }

    #[tokio::test]
    async fn png_fails_open() {
        let classifier = Arc::new(FixedClassifier::new(0.99, 0.99));
        let pipeline = pipeline(Arc::clone(&classifier));
        let outcome = pipeline
            .moderate_image(&encode(4, 4, ImageFormat::Png))
            .await
            .expect("moderate");

        assert!(matches!(
            outcome,
            ModerationOutcome::Skipped(SkipReason::Decode(DecodeError::UnsupportedFormat(_)))
        ));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.stats().skipped, 1);
    }

    #[tokio::test]
    async fn non_image_media_is_not_fetched() {
        let classifier = Arc::new(FixedClassifier::new(0.99, 0.99));
        let pipeline = pipeline(classifier);
        let msg = InboundMessage::text("c1", "u1", "m1", "").with_media(MediaKind::Sticker);
        let fetched = AtomicBool::new(false);
        let outcome = pipeline
            .moderate_message(&msg, || async {
                fetched.store(true, Ordering::SeqCst);
                None
            })
            .await
            .expect("moderate");
        assert_eq!(outcome, ModerationOutcome::Skipped(SkipReason::NotAnImage));
        assert!(!fetched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn missing_payload_is_skipped() {
        let pipeline = pipeline(Arc::new(FixedClassifier::new(0.0, 0.0)));
        let outcome = pipeline
            .moderate_message(&image_msg(), || async { None })
            .await
            .expect("moderate");
        assert_eq!(outcome, ModerationOutcome::Skipped(SkipReason::NoPayload));
    }

    #[test]
    fn vocabulary_mismatch_rejected_at_construction() {
        let mut classifier = FixedClassifier::new(0.0, 0.0);
        classifier.labels.retain(|l| l != "Hentai");
        let policy = ModerationPolicy::new(0.6, vec!["Porn".into(), "Hentai".into()])
            .expect("policy");
        let err = ModerationPipeline::new(Arc::new(classifier), policy).err();
        assert!(matches!(err, Some(PolicyConfigError::MissingLabel { .. })));
    }
}
