//! In-memory content store using DashMap.
//!
//! Records live in memory and are lost on restart. Each mutation holds the
//! entry's shard lock while it publishes its change event, so events for one
//! template are emitted in mutation order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::backend::{apply_decision, ConditionalWriteResult, ContentStore, StoreError};
use super::change::{ChangeEvent, ChangeFeed};
use crate::metrics::ChangeFeedMetrics;
use crate::moderation::ModerationDecision;
use crate::template::{Template, UpdateTemplateRequest};

const DEFAULT_FEED_CAPACITY: usize = 1024;

pub struct MemoryContentStore {
    templates: DashMap<String, Template>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            templates: DashMap::new(),
            changes,
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine
        let _ = self.changes.send(event);
    }

    /// Mutate one record under its entry lock and publish a modify event
    fn modify<F>(&self, id: &str, mutate: F) -> Result<Template, StoreError>
    where
        F: FnOnce(&mut Template),
    {
        let mut entry = self
            .templates
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let before = entry.clone();
        mutate(entry.value_mut());
        let after = entry.clone();
        self.publish(ChangeEvent::modify(before, after.clone()));

        Ok(after)
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &str) -> Result<Option<Template>, StoreError> {
        Ok(self.templates.get(id).map(|t| t.clone()))
    }

    async fn put(&self, mut template: Template) -> Result<Template, StoreError> {
        template.normalize();
        template.validate()?;

        match self.templates.entry(template.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(template.id)),
            Entry::Vacant(slot) => {
                let stored = slot.insert(template);
                let created = stored.clone();
                self.publish(ChangeEvent::insert(created.clone()));
                tracing::debug!(id = %created.id, "Template created");
                Ok(created)
            }
        }
    }

    async fn update_content(
        &self,
        id: &str,
        update: UpdateTemplateRequest,
    ) -> Result<Template, StoreError> {
        let mut entry = self
            .templates
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let before = entry.clone();
        let mut after = before.clone();
        let content_changed = update.apply_to(&mut after);
        after.validate()?;

        *entry.value_mut() = after.clone();
        self.publish(ChangeEvent::modify(before, after.clone()));

        tracing::debug!(id = %id, content_changed, "Template updated");
        Ok(after)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        // remove() holds the shard lock until it returns; publish right after
        match self.templates.remove(id) {
            Some((_, before)) => {
                self.publish(ChangeEvent::remove(before));
                tracing::debug!(id = %id, "Template deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<Template>, StoreError> {
        Ok(self.templates.iter().map(|t| t.value().clone()).collect())
    }

    async fn conditional_moderation_update(
        &self,
        id: &str,
        fingerprint: &str,
        decision: &ModerationDecision,
        moderated_at: DateTime<Utc>,
    ) -> Result<ConditionalWriteResult, StoreError> {
        let Some(mut entry) = self.templates.get_mut(id) else {
            return Ok(ConditionalWriteResult::NotFound);
        };

        if entry.content_fingerprint.as_deref() == Some(fingerprint) {
            return Ok(ConditionalWriteResult::FingerprintMatched);
        }
        if entry.fingerprint() != fingerprint {
            return Ok(ConditionalWriteResult::Superseded);
        }

        let before = entry.clone();
        apply_decision(entry.value_mut(), fingerprint, decision, moderated_at);
        let after = entry.clone();
        self.publish(ChangeEvent::modify(before, after.clone()));

        Ok(ConditionalWriteResult::Applied(after))
    }

    async fn record_use(&self, id: &str) -> Result<Template, StoreError> {
        self.modify(id, |t| t.use_count = t.use_count.saturating_add(1))
    }

    async fn record_view(&self, id: &str) -> Result<Template, StoreError> {
        self.modify(id, |t| t.view_count = t.view_count.saturating_add(1))
    }

    fn subscribe(&self) -> ChangeFeed {
        let receiver = self.changes.subscribe();
        BroadcastStream::new(receiver)
            .filter_map(|result| async move {
                match result {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Change feed subscriber lagged, events dropped");
                        ChangeFeedMetrics::record_lagged(skipped);
                        None
                    }
                }
            })
            .boxed()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
