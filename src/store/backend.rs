//! Content store trait definition.
//!
//! The store is the single source of truth for templates. Every mutation is
//! published on the store's change feed, which drives moderation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::change::ChangeFeed;
use crate::moderation::ModerationDecision;
use crate::redis::PoolError;
use crate::template::{Template, TemplateError, UpdateTemplateRequest};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Invalid(#[from] TemplateError),

    #[error("Concurrent modification of {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] PoolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Worth retrying with backoff (throttling, outages, lost CAS races)
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Conflict(_) | StoreError::Unavailable(_) => true,
            StoreError::Redis(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result of a conditional moderation write-back
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalWriteResult {
    /// Decision stored; carries the updated record
    Applied(Template),
    /// This fingerprint was already moderated; nothing written
    FingerprintMatched,
    /// Content changed since the decision was made; nothing written
    Superseded,
    /// Template no longer exists
    NotFound,
}

/// Storage for templates with conditional writes and a change feed.
///
/// Implementations must be thread-safe and publish a `ChangeEvent` for
/// every successful mutation, in order per template id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend_name(&self) -> &'static str;

    async fn get(&self, id: &str) -> Result<Option<Template>, StoreError>;

    /// Create a new template (fails if the id is taken)
    async fn put(&self, template: Template) -> Result<Template, StoreError>;

    /// Apply an author edit
    async fn update_content(
        &self,
        id: &str,
        update: UpdateTemplateRequest,
    ) -> Result<Template, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// All templates; search filters this candidate set per query
    async fn list(&self) -> Result<Vec<Template>, StoreError>;

    /// Store a moderation decision for `fingerprint`.
    ///
    /// Applies only when the recorded fingerprint is absent or different
    /// AND the current content still hashes to `fingerprint`. The check and
    /// the write are atomic.
    async fn conditional_moderation_update(
        &self,
        id: &str,
        fingerprint: &str,
        decision: &ModerationDecision,
        moderated_at: DateTime<Utc>,
    ) -> Result<ConditionalWriteResult, StoreError>;

    /// Increment the use counter
    async fn record_use(&self, id: &str) -> Result<Template, StoreError>;

    /// Increment the view counter
    async fn record_view(&self, id: &str) -> Result<Template, StoreError>;

    /// Subscribe to change events published after this call
    fn subscribe(&self) -> ChangeFeed;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Write a decision onto a template snapshot
pub(crate) fn apply_decision(
    template: &mut Template,
    fingerprint: &str,
    decision: &ModerationDecision,
    moderated_at: DateTime<Utc>,
) {
    template.moderation_status = decision.status;
    template.moderation_details = Some(decision.details.clone());
    template.content_fingerprint = Some(fingerprint.to_string());
    template.moderated_at = Some(moderated_at);
}
