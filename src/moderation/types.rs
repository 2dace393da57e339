//! Analyzer outputs and moderation decisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::template::ModerationStatus;

/// Version stamped into every decision so stored rationales can be traced
/// back to the policy that produced them.
pub const MODERATION_VERSION: &str = concat!("moderation-", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToxicityLabel {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentiment {
    pub label: String,
    /// Confidence that the text is negative, 0.0 to 1.0
    pub negative_score: f64,
}

/// What an analyzer found in a piece of text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(default)]
    pub toxicity_labels: Vec<ToxicityLabel>,

    #[serde(default)]
    pub sentiment: Option<Sentiment>,

    /// Detected sensitive entity categories (e.g. "SSN")
    #[serde(default)]
    pub sensitive_entities: Vec<String>,

    /// Heuristic findings that warrant a human look
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Structured rationale stored next to the moderation status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationDetails {
    /// Analyzer that produced the report ("heuristic", "remote")
    pub method: String,

    pub version: String,

    pub analyzed_at: DateTime<Utc>,

    /// Fingerprint of the content that was analyzed
    pub fingerprint: String,

    #[serde(default)]
    pub toxicity_labels: Vec<ToxicityLabel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,

    #[serde(default)]
    pub sensitive_entities: Vec<String>,

    #[serde(default)]
    pub reasons: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Analyzer calls made for this decision, retries included
    #[serde(default)]
    pub attempts: u32,
}

/// Outcome of moderating one version of a template's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationDecision {
    pub status: ModerationStatus,
    pub details: ModerationDetails,
}

impl ModerationDecision {
    pub fn fingerprint(&self) -> &str {
        &self.details.fingerprint
    }
}
