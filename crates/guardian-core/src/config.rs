use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MESSAGE_LIMIT: u32 = 60;
pub const DEFAULT_THRESHOLD: f32 = 0.60;
pub const DEFAULT_GENERATE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PULL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CLASSIFIER_INPUT_SIZE: u32 = 224; // NSFW model input is 224x224
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 20 * 1024 * 1024; // Bot API download cap

/// Top-level config (guardian.toml + GUARDIAN_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardianConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// HTTP status surface (health + conversation stats).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Master switch for media moderation.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// A watched label must be strictly above this value to trigger removal.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Labels that gate removal. Each must exist in the classifier vocabulary.
    #[serde(default = "default_watched_labels")]
    pub watched_labels: Vec<String>,
    /// Reply posted after an image is removed for its content.
    #[serde(default = "default_removal_notice")]
    pub removal_notice: String,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            watched_labels: default_watched_labels(),
            removal_notice: default_removal_notice(),
        }
    }
}

/// Model-serving sidecar hosting the image classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    /// Square edge the pixel grid is resized to before upload.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_base_url(),
            input_size: DEFAULT_CLASSIFIER_INPUT_SIZE,
            timeout_secs: default_classifier_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// User turns kept before the history is cleared.
    #[serde(default = "default_message_limit")]
    pub message_limit: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
    #[serde(default = "default_pull_timeout_secs")]
    pub pull_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_model(),
            generate_timeout_secs: DEFAULT_GENERATE_TIMEOUT_SECS,
            pull_timeout_secs: DEFAULT_PULL_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            temperature: default_temperature(),
            num_predict: default_num_predict(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Media larger than this is neither moderated nor stickered.
    #[serde(default = "default_max_media_bytes")]
    pub max_media_bytes: u64,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}
fn default_watched_labels() -> Vec<String> {
    vec!["Porn".to_string(), "Hentai".to_string()]
}
fn default_removal_notice() -> String {
    "⚠️ Image removed for inappropriate content.".to_string()
}
fn default_classifier_base_url() -> String {
    "http://localhost:8501".to_string()
}
fn default_input_size() -> u32 {
    DEFAULT_CLASSIFIER_INPUT_SIZE
}
fn default_classifier_timeout_secs() -> u64 {
    10
}
fn default_message_limit() -> u32 {
    DEFAULT_MESSAGE_LIMIT
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.2".to_string()
}
fn default_generate_timeout_secs() -> u64 {
    DEFAULT_GENERATE_TIMEOUT_SECS
}
fn default_pull_timeout_secs() -> u64 {
    DEFAULT_PULL_TIMEOUT_SECS
}
fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}
fn default_temperature() -> f32 {
    0.7
}
fn default_num_predict() -> u32 {
    500
}
fn default_max_media_bytes() -> u64 {
    DEFAULT_MAX_MEDIA_BYTES
}

impl GuardianConfig {
    /// Load config from a TOML file with GUARDIAN_* env var overrides.
    ///
    /// Nested keys use a double underscore: `GUARDIAN_OLLAMA__BASE_URL`.
    /// Path resolution: explicit argument, then `~/.guardian/guardian.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::GuardianError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("GUARDIAN_").split("__"))
    }

    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::GuardianError;

        if !(0.0..=1.0).contains(&self.moderation.threshold) {
            return Err(GuardianError::Config(format!(
                "moderation.threshold must be within [0, 1], got {}",
                self.moderation.threshold
            )));
        }
        if self.moderation.watched_labels.is_empty() {
            return Err(GuardianError::Config(
                "moderation.watched_labels must not be empty".to_string(),
            ));
        }
        if self.conversation.message_limit == 0 {
            return Err(GuardianError::Config(
                "conversation.message_limit must be at least 1".to_string(),
            ));
        }
        if self.classifier.input_size == 0 {
            return Err(GuardianError::Config(
                "classifier.input_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.guardian/guardian.toml", home)
}
