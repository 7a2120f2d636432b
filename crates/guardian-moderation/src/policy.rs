//! Threshold policy over classifier output. Pure, no I/O.

use std::fmt;

use serde::Serialize;

use guardian_core::config::ModerationConfig;

use crate::classifier::ClassificationResult;
use crate::error::PolicyConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModerationAction {
    Allow,
    Remove,
}

/// A watched label that crossed the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelHit {
    pub label: String,
    pub probability: f32,
}

/// Why a verdict was reached, kept for auditability.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VerdictReason {
    /// No watched label exceeded the threshold.
    BelowThreshold,
    /// One or more watched labels exceeded the threshold.
    LabelsExceeded { hits: Vec<LabelHit> },
    /// Ephemeral content, removed for its transport property.
    ViewOnce,
}

impl fmt::Display for VerdictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictReason::BelowThreshold => write!(f, "below threshold"),
            VerdictReason::ViewOnce => write!(f, "view-once media"),
            VerdictReason::LabelsExceeded { hits } => {
                let parts: Vec<String> = hits
                    .iter()
                    .map(|h| format!("{} {:.1}%", h.label, h.probability * 100.0))
                    .collect();
                write!(f, "{}", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationVerdict {
    pub action: ModerationAction,
    pub reason: VerdictReason,
}

impl ModerationVerdict {
    pub fn allow() -> Self {
        Self {
            action: ModerationAction::Allow,
            reason: VerdictReason::BelowThreshold,
        }
    }

    pub fn view_once() -> Self {
        Self {
            action: ModerationAction::Remove,
            reason: VerdictReason::ViewOnce,
        }
    }

    pub fn is_remove(&self) -> bool {
        self.action == ModerationAction::Remove
    }

    /// Labels cited by the verdict; empty unless labels were exceeded.
    pub fn exceeded_labels(&self) -> Vec<&str> {
        match &self.reason {
            VerdictReason::LabelsExceeded { hits } => {
                hits.iter().map(|h| h.label.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Removal policy: any watched label strictly above `threshold` removes.
#[derive(Debug, Clone)]
pub struct ModerationPolicy {
    threshold: f32,
    watched_labels: Vec<String>,
}

impl ModerationPolicy {
    pub fn new(threshold: f32, watched_labels: Vec<String>) -> Result<Self, PolicyConfigError> {
        if watched_labels.is_empty() {
            return Err(PolicyConfigError::NoWatchedLabels);
        }
        Ok(Self {
            threshold,
            watched_labels,
        })
    }

    pub fn from_config(config: &ModerationConfig) -> Result<Self, PolicyConfigError> {
        Self::new(config.threshold, config.watched_labels.clone())
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn watched_labels(&self) -> &[String] {
        &self.watched_labels
    }

    /// Startup check: every watched label must be in the classifier vocabulary.
    pub fn validate_vocabulary(&self, vocabulary: &[String]) -> Result<(), PolicyConfigError> {
        for label in &self.watched_labels {
            if !vocabulary.iter().any(|v| v == label) {
                return Err(PolicyConfigError::MissingLabel {
                    label: label.clone(),
                    available: vocabulary.to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Turn classifier output into a verdict.
    ///
    /// All watched labels are evaluated, so simultaneous hits are all cited.
    pub fn decide(
        &self,
        result: &ClassificationResult,
    ) -> Result<ModerationVerdict, PolicyConfigError> {
        let mut hits = Vec::new();

        for label in &self.watched_labels {
            let probability =
                result
                    .probability(label)
                    .ok_or_else(|| PolicyConfigError::MissingLabel {
                        label: label.clone(),
                        available: result.iter().map(|(l, _)| String::from(l)).collect(),
                    })?;

            if !(0.0..=1.0).contains(&probability) {
                return Err(PolicyConfigError::InvalidProbability {
                    label: label.clone(),
                    value: probability,
                });
            }

            if probability > self.threshold {
                hits.push(LabelHit {
                    label: label.clone(),
                    probability,
                });
            }
        }

        if hits.is_empty() {
            Ok(ModerationVerdict::allow())
        } else {
            Ok(ModerationVerdict {
                action: ModerationAction::Remove,
                reason: VerdictReason::LabelsExceeded { hits },
            })
        }
    }
}
