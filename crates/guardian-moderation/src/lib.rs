//! Image moderation: decode → classify → policy verdict.
//!
//! The pipeline never deletes anything itself; the messaging layer acts on
//! the returned [`ModerationOutcome`].

pub mod classifier;
pub mod decode;
pub mod error;
pub mod pipeline;
pub mod policy;

pub use classifier::{ClassificationResult, ImageClassifier, RemoteClassifier};
pub use decode::{decode, DecodeError, DecodeOutcome, PixelGrid};
pub use error::{ClassifierError, ModerationError, PolicyConfigError};
pub use pipeline::{ModerationOutcome, ModerationPipeline, ModerationStats, SkipReason};
pub use policy::{LabelHit, ModerationAction, ModerationPolicy, ModerationVerdict, VerdictReason};
