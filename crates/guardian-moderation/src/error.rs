use thiserror::Error;

/// Failures of the classifier adapter.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier unreachable: {0}")]
    Unavailable(String),

    #[error("classifier timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("classifier API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("classifier response parse error: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// The classifier output does not match what the policy was configured for.
///
/// This is a deployment bug, never a moderation non-event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyConfigError {
    #[error("label `{label}` missing from classifier output (available: {available:?})")]
    MissingLabel {
        label: String,
        available: Vec<String>,
    },

    #[error("label `{label}` has probability {value} outside [0, 1]")]
    InvalidProbability { label: String, value: f32 },

    #[error("no watched labels configured")]
    NoWatchedLabels,
}

/// Errors that abort moderation of one message. The caller logs and skips.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    PolicyConfig(#[from] PolicyConfigError),
}
