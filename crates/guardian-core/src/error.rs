use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Classifier startup failed: {0}")]
    ClassifierStartup(String),
}

pub type Result<T> = std::result::Result<T, GuardianError>;
