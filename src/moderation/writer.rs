//! Idempotent persistence of moderation decisions.
//!
//! The write is conditional on the content fingerprint, so redelivered
//! events and racing workers collapse into one applied write. A failed
//! condition is an expected outcome, not an error.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::types::ModerationDecision;
use crate::config::DispatcherConfig;
use crate::metrics::ModerationMetrics;
use crate::resilience::{BackoffConfig, ExponentialBackoff};
use crate::store::{ConditionalWriteResult, ContentStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CommitOutcome {
    Applied,
    /// The fingerprint was already moderated
    AlreadyApplied,
    /// The content changed after analysis; a newer event will moderate it
    Superseded,
    /// The template was deleted before the write
    NotFound,
    /// Transient store failure, still failing after the last attempt
    ConflictRetryable(String),
    /// Non-transient store failure
    Failed(String),
}

impl CommitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitOutcome::Applied => "applied",
            CommitOutcome::AlreadyApplied => "already_applied",
            CommitOutcome::Superseded => "superseded",
            CommitOutcome::NotFound => "not_found",
            CommitOutcome::ConflictRetryable(_) => "conflict_retryable",
            CommitOutcome::Failed(_) => "failed",
        }
    }

    /// The store is in a consistent state for this fingerprint
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            CommitOutcome::ConflictRetryable(_) | CommitOutcome::Failed(_)
        )
    }
}

pub struct ModerationWriter {
    store: Arc<dyn ContentStore>,
    backoff: BackoffConfig,
    max_attempts: u32,
}

impl ModerationWriter {
    pub fn new(store: Arc<dyn ContentStore>, config: &DispatcherConfig) -> Self {
        Self {
            store,
            backoff: BackoffConfig::from(config),
            max_attempts: config.retry_max_attempts.max(1),
        }
    }

    /// Single conditional write attempt
    pub async fn try_commit(
        &self,
        id: &str,
        fingerprint: &str,
        decision: &ModerationDecision,
    ) -> CommitOutcome {
        match self
            .store
            .conditional_moderation_update(id, fingerprint, decision, Utc::now())
            .await
        {
            Ok(ConditionalWriteResult::Applied(_)) => CommitOutcome::Applied,
            Ok(ConditionalWriteResult::FingerprintMatched) => CommitOutcome::AlreadyApplied,
            Ok(ConditionalWriteResult::Superseded) => CommitOutcome::Superseded,
            Ok(ConditionalWriteResult::NotFound) => CommitOutcome::NotFound,
            Err(e) if e.is_transient() => CommitOutcome::ConflictRetryable(e.to_string()),
            Err(e) => CommitOutcome::Failed(e.to_string()),
        }
    }

    /// Commit a decision, retrying transient failures with exponential backoff
    #[tracing::instrument(
        name = "moderation.commit",
        skip(self, decision),
        fields(id = %id, fingerprint = %fingerprint, status = decision.status.as_str())
    )]
    pub async fn commit(
        &self,
        id: &str,
        fingerprint: &str,
        decision: &ModerationDecision,
    ) -> CommitOutcome {
        let mut backoff = ExponentialBackoff::with_config(self.backoff.clone());

        let mut attempt = 1;
        let outcome = loop {
            let outcome = self.try_commit(id, fingerprint, decision).await;
            match &outcome {
                CommitOutcome::ConflictRetryable(reason) if attempt < self.max_attempts => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        id = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Moderation commit failed transiently, retrying"
                    );
                    ModerationMetrics::record_retry();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => break outcome,
            }
        };

        match &outcome {
            CommitOutcome::Applied => {
                tracing::info!(id = %id, status = decision.status.as_str(), "Moderation decision applied");
            }
            CommitOutcome::AlreadyApplied | CommitOutcome::Superseded | CommitOutcome::NotFound => {
                tracing::debug!(id = %id, outcome = outcome.as_str(), "Moderation commit was a no-op");
            }
            CommitOutcome::ConflictRetryable(reason) | CommitOutcome::Failed(reason) => {
                tracing::error!(id = %id, attempts = attempt, reason = %reason, "Moderation commit failed");
            }
        }
        ModerationMetrics::record_commit(outcome.as_str());

        outcome
    }
}
