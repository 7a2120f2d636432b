use async_trait::async_trait;
use serde::Serialize;

use guardian_core::config::OllamaConfig;

/// Sampling options forwarded verbatim to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

impl SamplingOptions {
    pub fn from_config(config: &OllamaConfig) -> Self {
        Self {
            temperature: config.temperature,
            num_predict: config.num_predict,
        }
    }
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_predict: 500,
        }
    }
}

/// Single-shot completion request: one rendered prompt, no streaming.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub options: SamplingOptions,
}

/// Response from a generation backend.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Common interface for text-generation backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name for logging and error messages.
    fn name(&self) -> &str;

    /// Run one completion, bounded by the backend's generation timeout.
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;

    /// Make sure `model` is present at the backend, pulling it if needed.
    /// Backends without model management return `Ok(())`.
    async fn ensure_model(&self, _model: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Cheap reachability probe for the health surface.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Coarse failure class, one user-facing message each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unavailable,
    Timeout,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("backend unreachable: {0}")]
    Unavailable(String),

    #[error("backend timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    /// Classify a transport error from `reqwest`.
    pub fn from_send(e: reqwest::Error, timeout_secs: u64) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout { secs: timeout_secs }
        } else if e.is_connect() {
            ProviderError::Unavailable(e.to_string())
        } else {
            ProviderError::Http(e)
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Unavailable(_) => FailureKind::Unavailable,
            ProviderError::Timeout { .. } => FailureKind::Timeout,
            ProviderError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            ProviderError::Http(e) if e.is_connect() => FailureKind::Unavailable,
            _ => FailureKind::Other,
        }
    }

    /// Chat reply shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            FailureKind::Unavailable => {
                "Error: can't reach the AI service. Please try again later."
            }
            FailureKind::Timeout => {
                "Error: the AI service took too long to respond. Please try again later."
            }
            FailureKind::Other => {
                "Error: there was a problem processing your message. Please try again."
            }
        }
    }
}
