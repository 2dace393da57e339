//! Moderation engine: text preparation, analyzer invocation and the
//! decision policy.
//!
//! `moderate()` never fails. Timeouts and unavailability are retried with
//! backoff up to `analyzer_max_attempts` calls. Whatever error remains turns
//! into a `Review` decision with the failure recorded in the details, so a
//! broken analyzer can never lead to a silent approval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::analyzer::{AnalyzerError, TextAnalyzer};
use super::types::{AnalysisReport, ModerationDecision, ModerationDetails, MODERATION_VERSION};
use crate::config::ModerationConfig;
use crate::metrics::ModerationMetrics;
use crate::resilience::{BackoffConfig, ExponentialBackoff};
use crate::template::{strip_markup, ModerationStatus};

pub const REASON_HIGH_TOXICITY: &str = "high toxicity";
pub const REASON_SENSITIVE_INFO: &str = "sensitive personal information";
pub const REASON_MANUAL_REVIEW: &str = "requires manual review";
pub const REASON_ANALYZER_FAILURE: &str = "analyzer failure";

/// Thresholds and entity set used to turn an analysis into a status.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    pub reject_threshold: f64,
    pub review_threshold: f64,
    pub negative_sentiment_threshold: f64,
    pub sensitive_entities: HashSet<String>,
}

impl DecisionPolicy {
    pub fn from_config(config: &ModerationConfig) -> Self {
        Self {
            reject_threshold: config.reject_threshold,
            review_threshold: config.review_threshold,
            negative_sentiment_threshold: config.negative_sentiment_threshold,
            sensitive_entities: config
                .sensitive_entities
                .iter()
                .map(|e| e.trim().to_uppercase())
                .collect(),
        }
    }

    /// Evaluate the rules in priority order; the first match wins.
    pub fn decide(&self, report: &AnalysisReport) -> (ModerationStatus, Vec<String>) {
        let toxic: Vec<String> = report
            .toxicity_labels
            .iter()
            .filter(|l| l.score > self.reject_threshold)
            .map(|l| format!("{} scored {:.2}", l.name, l.score))
            .collect();
        if !toxic.is_empty() {
            let mut reasons = vec![REASON_HIGH_TOXICITY.to_string()];
            reasons.extend(toxic);
            return (ModerationStatus::Rejected, reasons);
        }

        let sensitive: Vec<String> = report
            .sensitive_entities
            .iter()
            .filter(|e| self.sensitive_entities.contains(&e.trim().to_uppercase()))
            .map(|e| format!("detected {}", e))
            .collect();
        if !sensitive.is_empty() {
            let mut reasons = vec![REASON_SENSITIVE_INFO.to_string()];
            reasons.extend(sensitive);
            return (ModerationStatus::Rejected, reasons);
        }

        let mut review: Vec<String> = report
            .toxicity_labels
            .iter()
            .filter(|l| l.score > self.review_threshold && l.score <= self.reject_threshold)
            .map(|l| format!("{} scored {:.2}", l.name, l.score))
            .collect();
        if let Some(sentiment) = &report.sentiment {
            if sentiment.negative_score > self.negative_sentiment_threshold {
                review.push(format!(
                    "negative sentiment {:.2}",
                    sentiment.negative_score
                ));
            }
        }
        review.extend(report.flags.iter().cloned());
        if !review.is_empty() {
            let mut reasons = vec![REASON_MANUAL_REVIEW.to_string()];
            reasons.extend(review);
            return (ModerationStatus::Review, reasons);
        }

        (ModerationStatus::Approved, Vec::new())
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from_config(&ModerationConfig::default())
    }
}

pub struct ModerationEngine {
    analyzer: Arc<dyn TextAnalyzer>,
    policy: DecisionPolicy,
    timeout: Duration,
    max_text_length: usize,
    max_attempts: u32,
    backoff: BackoffConfig,
}

impl ModerationEngine {
    pub fn new(analyzer: Arc<dyn TextAnalyzer>, config: &ModerationConfig) -> Self {
        Self {
            analyzer,
            policy: DecisionPolicy::from_config(config),
            timeout: Duration::from_millis(config.analyzer_timeout_ms),
            max_text_length: config.max_text_length,
            max_attempts: config.analyzer_max_attempts.max(1),
            backoff: BackoffConfig::from(config),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn method(&self) -> &'static str {
        self.analyzer.method()
    }

    /// Title plus markup-free body, truncated to the analyzer's limit
    pub fn prepare_text(&self, title: &str, body: &str) -> String {
        let combined = format!("{} {}", title.trim(), strip_markup(body));
        let combined = combined.trim();
        if combined.chars().count() <= self.max_text_length {
            return combined.to_string();
        }
        combined.chars().take(self.max_text_length).collect()
    }

    #[tracing::instrument(
        name = "moderation.moderate",
        skip(self, title, body),
        fields(id = %id, fingerprint = %fingerprint, method = self.analyzer.method())
    )]
    pub async fn moderate(
        &self,
        id: &str,
        title: &str,
        body: &str,
        fingerprint: &str,
    ) -> ModerationDecision {
        let text = self.prepare_text(title, body);
        let method = self.analyzer.method();
        let (result, attempts) = self.analyze(id, &text).await;

        let decision = match result {
            Ok(report) => {
                let (status, reasons) = self.policy.decide(&report);
                ModerationDecision {
                    status,
                    details: ModerationDetails {
                        method: method.to_string(),
                        version: MODERATION_VERSION.to_string(),
                        analyzed_at: Utc::now(),
                        fingerprint: fingerprint.to_string(),
                        toxicity_labels: report.toxicity_labels,
                        sentiment: report.sentiment,
                        sensitive_entities: report.sensitive_entities,
                        reasons,
                        error: None,
                        attempts,
                    },
                }
            }
            Err(e) => {
                tracing::warn!(id = %id, attempts, error = %e, "Analyzer failed, routing to manual review");
                ModerationMetrics::record_analyzer_failure(e.kind());
                ModerationDecision {
                    status: ModerationStatus::Review,
                    details: ModerationDetails {
                        method: method.to_string(),
                        version: MODERATION_VERSION.to_string(),
                        analyzed_at: Utc::now(),
                        fingerprint: fingerprint.to_string(),
                        toxicity_labels: Vec::new(),
                        sentiment: None,
                        sensitive_entities: Vec::new(),
                        reasons: vec![
                            REASON_MANUAL_REVIEW.to_string(),
                            REASON_ANALYZER_FAILURE.to_string(),
                        ],
                        error: Some(e.to_string()),
                        attempts,
                    },
                }
            }
        };

        ModerationMetrics::record_decision(decision.status.as_str());
        tracing::debug!(
            id = %id,
            status = decision.status.as_str(),
            reasons = ?decision.details.reasons,
            "Moderation decision"
        );

        decision
    }

    /// Call the analyzer under the timeout, retrying transient failures.
    /// Returns the last result and the number of calls made.
    async fn analyze(&self, id: &str, text: &str) -> (Result<AnalysisReport, AnalyzerError>, u32) {
        let method = self.analyzer.method();
        let mut backoff = ExponentialBackoff::with_config(self.backoff.clone());
        let mut attempt = 1;

        loop {
            let start = Instant::now();
            let result = match tokio::time::timeout(self.timeout, self.analyzer.analyze(text)).await {
                Ok(result) => result,
                Err(_) => Err(AnalyzerError::Timeout(self.timeout)),
            };
            ModerationMetrics::observe_analyzer_latency(method, start.elapsed().as_secs_f64());

            match result {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        id = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Analyzer call failed transiently, retrying"
                    );
                    ModerationMetrics::record_analyzer_failure(e.kind());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return (result, attempt),
            }
        }
    }
}
