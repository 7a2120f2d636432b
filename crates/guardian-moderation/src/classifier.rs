//! Classifier adapter for a pretrained multi-label NSFW model.
//!
//! The model itself runs in a model-serving sidecar; `RemoteClassifier`
//! resolves its vocabulary once at startup and then only posts pixel grids.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use guardian_core::config::ClassifierConfig;

use crate::decode::PixelGrid;
use crate::error::ClassifierError;

/// Per-label confidence, independent per label (need not sum to 1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
    label_probabilities: BTreeMap<String, f32>,
}

impl ClassificationResult {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        Self {
            label_probabilities: pairs.into_iter().map(|(l, p)| (l.into(), p)).collect(),
        }
    }

    pub fn probability(&self, label: &str) -> Option<f32> {
        self.label_probabilities.get(label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.label_probabilities
            .iter()
            .map(|(l, p)| (l.as_str(), *p))
    }
}

/// Common interface for image classifiers.
///
/// Implementations must be loaded before the first call and are shared
/// across all in-flight messages.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Model name for logging and the health endpoint.
    fn name(&self) -> &str;

    /// Label vocabulary the model produces.
    fn labels(&self) -> &[String];

    /// Classify one pixel grid. Must not mutate or retain the input.
    async fn classify(&self, pixels: &PixelGrid) -> Result<ClassificationResult, ClassifierError>;
}

/// Classifier backed by an HTTP model-serving sidecar.
pub struct RemoteClassifier {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    labels: Vec<String>,
    input_size: u32,
    timeout: Duration,
}

impl RemoteClassifier {
    /// Resolve the model behind `config.base_url` and return a ready adapter.
    ///
    /// Called exactly once at process start; the returned value is reused for
    /// the process lifetime.
    pub async fn load(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::new();
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let timeout = Duration::from_secs(config.timeout_secs);
        let url = format!("{}/v1/model", base_url);

        debug!(url = %url, "loading classifier model info");

        let resp = client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, config.timeout_secs))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status,
                message: text,
            });
        }

        let info: ModelInfo = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;

        if info.labels.is_empty() {
            return Err(ClassifierError::Parse(
                "model reports an empty label vocabulary".to_string(),
            ));
        }

        let input_size = info.input_size.unwrap_or(config.input_size);
        if input_size == 0 {
            return Err(ClassifierError::Parse(
                "model reports a zero input size".to_string(),
            ));
        }
        if input_size != config.input_size {
            warn!(
                configured = config.input_size,
                reported = input_size,
                "classifier reports a different input size, using the reported one"
            );
        }

        info!(model = %info.name, labels = ?info.labels, input_size, "classifier loaded");

        Ok(Self {
            client,
            base_url,
            model_name: info.name,
            labels: info.labels,
            input_size,
            timeout,
        })
    }
}

#[async_trait]
impl ImageClassifier for RemoteClassifier {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    async fn classify(&self, pixels: &PixelGrid) -> Result<ClassificationResult, ClassifierError> {
        let body = {
            let input = pixels.resized(self.input_size);
            ClassifyRequest {
                width: input.width(),
                height: input.height(),
                channels: input.channels(),
                pixels: base64::engine::general_purpose::STANDARD.encode(input.as_bytes()),
            }
        };
        let url = format!("{}/v1/classify", self.base_url);

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout.as_secs()))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "classifier API error");
            return Err(ClassifierError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ClassifyResponse = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;

        Ok(ClassificationResult::from_pairs(
            api_resp
                .predictions
                .into_iter()
                .map(|p| (p.class_name, p.probability)),
        ))
    }
}

fn map_send_error(e: reqwest::Error, secs: u64) -> ClassifierError {
    if e.is_timeout() {
        ClassifierError::Timeout { secs }
    } else if e.is_connect() {
        ClassifierError::Unavailable(e.to_string())
    } else {
        ClassifierError::Http(e)
    }
}

// Sidecar wire types

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
    labels: Vec<String>,
    #[serde(default)]
    input_size: Option<u32>,
}

#[derive(Serialize)]
struct ClassifyRequest {
    width: u32,
    height: u32,
    channels: u8,
    pixels: String,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    #[serde(rename = "className")]
    class_name: String,
    probability: f32,
}
