use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use serde::Deserialize;
use tracing::{debug, info, warn};

use guardian_core::config::OllamaConfig;

use crate::provider::{GenerateRequest, GenerateResponse, GenerationBackend, ProviderError};

/// Ollama completion backend (`/api/generate`, `/api/tags`, `/api/pull`).
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    generate_timeout: Duration,
    pull_timeout: Duration,
    probe_timeout: Duration,
    /// Models confirmed present at the backend; checked before every generation.
    ready_models: DashSet<String>,
}

impl OllamaBackend {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            generate_timeout: Duration::from_secs(config.generate_timeout_secs),
            pull_timeout: Duration::from_secs(config.pull_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            ready_models: DashSet::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_models(&self, timeout: Duration) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_send(e, timeout.as_secs()))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull(&self, model: &str) -> Result<(), ProviderError> {
        let url = format!("{}/api/pull", self.base_url);
        let body = serde_json::json!({
            "name": model,
            "stream": false,
        });

        let resp = self
            .client
            .post(&url)
            .timeout(self.pull_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_send(e, self.pull_timeout.as_secs()))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let body = build_request_body(req);
        let url = format!("{}/api/generate", self.base_url);

        debug!(model = %req.model, prompt_len = req.prompt.len(), "sending request to Ollama");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .timeout(self.generate_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_send(e, self.generate_timeout.as_secs()))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        // The body is read under the same deadline as the headers.
        let api_resp: ApiResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    secs: self.generate_timeout.as_secs(),
                }
            } else {
                ProviderError::Parse(e.to_string())
            }
        })?;

        Ok(GenerateResponse {
            content: api_resp.response,
            model: api_resp.model,
            tokens_in: api_resp.prompt_eval_count.unwrap_or(0),
            tokens_out: api_resp.eval_count.unwrap_or(0),
        })
    }

    async fn ensure_model(&self, model: &str) -> Result<(), ProviderError> {
        if self.ready_models.contains(model) {
            return Ok(());
        }

        let installed = self.list_models(self.pull_timeout).await?;
        if !installed.iter().any(|name| name.contains(model)) {
            info!(model, "model not present at backend, pulling");
            self.pull(model).await?;
            info!(model, "model pulled");
        }

        self.ready_models.insert(model.to_string());
        Ok(())
    }

    async fn is_available(&self) -> bool {
        match self.list_models(self.probe_timeout).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Ollama is not available");
                false
            }
        }
    }
}

fn build_request_body(req: &GenerateRequest) -> serde_json::Value {
    serde_json::json!({
        "model": req.model,
        "prompt": req.prompt,
        "stream": false,
        "options": {
            "temperature": req.options.temperature,
            "num_predict": req.options.num_predict,
        },
    })
}

// Ollama wire types, deserialization only

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    response: String,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}
