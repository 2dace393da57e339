//! Redis-backed content store.
//!
//! Each template is a hash under `{prefix}:tpl:{id}`:
//!
//! | field          | content                                    |
//! |----------------|--------------------------------------------|
//! | `data`         | template JSON                              |
//! | `content_fp`   | fingerprint of the current title and body  |
//! | `moderated_fp` | fingerprint of the last moderated content  |
//! | `revision`     | incremented on every write                 |
//!
//! Writes are Lua scripts that compare `revision`, write the hash and
//! PUBLISH the change event in one step, so the feed sees mutations in
//! commit order. The change feed is a pub/sub subscription; events
//! published while a subscriber is reconnecting are not replayed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use lazy_static::lazy_static;
use redis::Script;

use super::backend::{apply_decision, ConditionalWriteResult, ContentStore, StoreError};
use super::change::{ChangeEvent, ChangeFeed};
use crate::metrics::StoreMetrics;
use crate::moderation::ModerationDecision;
use crate::redis::RedisPool;
use crate::resilience::{BackoffConfig, ExponentialBackoff};
use crate::template::{Template, UpdateTemplateRequest};

/// Optimistic retries before a write gives up with `Conflict`
const MAX_CAS_ATTEMPTS: usize = 5;

const CODE_MISSING: i64 = -1;
const CODE_REVISION_CHANGED: i64 = 0;
const CODE_APPLIED: i64 = 1;
const CODE_FINGERPRINT_MATCHED: i64 = 2;
const CODE_SUPERSEDED: i64 = 3;

lazy_static! {
    // KEYS: record, index. ARGV: id, data, content_fp, moderated_fp ('' for none), channel, event
    static ref CREATE_SCRIPT: Script = Script::new(
        r#"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return 0
        end
        redis.call('HSET', KEYS[1], 'data', ARGV[2], 'content_fp', ARGV[3], 'revision', '1')
        if ARGV[4] ~= '' then
            redis.call('HSET', KEYS[1], 'moderated_fp', ARGV[4])
        end
        redis.call('SADD', KEYS[2], ARGV[1])
        redis.call('PUBLISH', ARGV[5], ARGV[6])
        return 1
        "#,
    );

    // KEYS: record. ARGV: revision, data, content_fp, moderated_fp ('' clears), channel, event
    static ref REPLACE_SCRIPT: Script = Script::new(
        r#"
        local current = redis.call('HGET', KEYS[1], 'revision')
        if not current then
            return -1
        end
        if current ~= ARGV[1] then
            return 0
        end
        redis.call('HSET', KEYS[1], 'data', ARGV[2], 'content_fp', ARGV[3],
            'revision', tostring(tonumber(current) + 1))
        if ARGV[4] == '' then
            redis.call('HDEL', KEYS[1], 'moderated_fp')
        else
            redis.call('HSET', KEYS[1], 'moderated_fp', ARGV[4])
        end
        redis.call('PUBLISH', ARGV[5], ARGV[6])
        return 1
        "#,
    );

    // KEYS: record. ARGV: fingerprint, revision, data, channel, event
    static ref MODERATE_SCRIPT: Script = Script::new(
        r#"
        local fields = redis.call('HMGET', KEYS[1], 'revision', 'content_fp', 'moderated_fp')
        if not fields[1] then
            return -1
        end
        if fields[3] == ARGV[1] then
            return 2
        end
        if fields[2] ~= ARGV[1] then
            return 3
        end
        if fields[1] ~= ARGV[2] then
            return 0
        end
        redis.call('HSET', KEYS[1], 'data', ARGV[3], 'moderated_fp', ARGV[1],
            'revision', tostring(tonumber(fields[1]) + 1))
        redis.call('PUBLISH', ARGV[4], ARGV[5])
        return 1
        "#,
    );

    // KEYS: record, index. ARGV: revision, id, channel, event
    static ref DELETE_SCRIPT: Script = Script::new(
        r#"
        local current = redis.call('HGET', KEYS[1], 'revision')
        if not current then
            return -1
        end
        if current ~= ARGV[1] then
            return 0
        end
        redis.call('DEL', KEYS[1])
        redis.call('SREM', KEYS[2], ARGV[2])
        redis.call('PUBLISH', ARGV[3], ARGV[4])
        return 1
        "#,
    );
}

/// A template together with its hash bookkeeping
struct StoredRecord {
    template: Template,
    revision: String,
}

pub struct RedisContentStore {
    pool: Arc<RedisPool>,
    key_prefix: String,
    channel: String,
}

impl RedisContentStore {
    pub fn new(pool: Arc<RedisPool>, key_prefix: &str, channel: &str) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.to_string(),
            channel: channel.to_string(),
        }
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}:tpl:{}", self.key_prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:index", self.key_prefix)
    }

    async fn read_record(&self, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let key = self.record_key(id);
        let (data, revision): (Option<String>, Option<String>) = self
            .pool
            .execute(move |mut conn| async move {
                redis::cmd("HMGET")
                    .arg(&key)
                    .arg("data")
                    .arg("revision")
                    .query_async(&mut conn)
                    .await
            })
            .await
            .inspect_err(|_| StoreMetrics::record_error("read"))?;

        match (data, revision) {
            (Some(data), Some(revision)) => Ok(Some(StoredRecord {
                template: serde_json::from_str(&data)?,
                revision,
            })),
            _ => Ok(None),
        }
    }

    /// Read-modify-write with revision check, retried on lost races
    async fn replace_with<F>(&self, id: &str, mut mutate: F) -> Result<Template, StoreError>
    where
        F: FnMut(&mut Template) -> Result<(), StoreError> + Send,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let record = self
                .read_record(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

            let before = record.template;
            let mut after = before.clone();
            mutate(&mut after)?;

            let data = serde_json::to_string(&after)?;
            let event = serde_json::to_string(&ChangeEvent::modify(before, after.clone()))?;
            let key = self.record_key(id);
            let content_fp = after.fingerprint();
            let moderated_fp = after.content_fingerprint.clone().unwrap_or_default();
            let channel = self.channel.clone();
            let revision = record.revision;

            let code: i64 = self
                .pool
                .execute(move |mut conn| async move {
                    REPLACE_SCRIPT
                        .key(key)
                        .arg(revision)
                        .arg(data)
                        .arg(content_fp)
                        .arg(moderated_fp)
                        .arg(channel)
                        .arg(event)
                        .invoke_async(&mut conn)
                        .await
                })
                .await
                .inspect_err(|_| StoreMetrics::record_error("replace"))?;

            match code {
                CODE_APPLIED => return Ok(after),
                CODE_MISSING => return Err(StoreError::NotFound(id.to_string())),
                _ => {
                    tracing::debug!(id = %id, attempt, "Revision changed during write, retrying");
                }
            }
        }

        Err(StoreError::Conflict(id.to_string()))
    }
}

#[async_trait]
impl ContentStore for RedisContentStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, id: &str) -> Result<Option<Template>, StoreError> {
        Ok(self.read_record(id).await?.map(|r| r.template))
    }

    async fn put(&self, mut template: Template) -> Result<Template, StoreError> {
        template.normalize();
        template.validate()?;

        let data = serde_json::to_string(&template)?;
        let event = serde_json::to_string(&ChangeEvent::insert(template.clone()))?;
        let key = self.record_key(&template.id);
        let index = self.index_key();
        let id = template.id.clone();
        let content_fp = template.fingerprint();
        let moderated_fp = template.content_fingerprint.clone().unwrap_or_default();
        let channel = self.channel.clone();

        let code: i64 = self
            .pool
            .execute(move |mut conn| async move {
                CREATE_SCRIPT
                    .key(key)
                    .key(index)
                    .arg(id)
                    .arg(data)
                    .arg(content_fp)
                    .arg(moderated_fp)
                    .arg(channel)
                    .arg(event)
                    .invoke_async(&mut conn)
                    .await
            })
            .await
            .inspect_err(|_| StoreMetrics::record_error("create"))?;

        if code != CODE_APPLIED {
            return Err(StoreError::AlreadyExists(template.id));
        }

        tracing::debug!(id = %template.id, "Template created");
        Ok(template)
    }

    async fn update_content(
        &self,
        id: &str,
        update: UpdateTemplateRequest,
    ) -> Result<Template, StoreError> {
        self.replace_with(id, |template| {
            update.clone().apply_to(template);
            template.validate()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let record = self
                .read_record(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

            let event = serde_json::to_string(&ChangeEvent::remove(record.template))?;
            let key = self.record_key(id);
            let index = self.index_key();
            let id_arg = id.to_string();
            let channel = self.channel.clone();
            let revision = record.revision;

            let code: i64 = self
                .pool
                .execute(move |mut conn| async move {
                    DELETE_SCRIPT
                        .key(key)
                        .key(index)
                        .arg(revision)
                        .arg(id_arg)
                        .arg(channel)
                        .arg(event)
                        .invoke_async(&mut conn)
                        .await
                })
                .await
                .inspect_err(|_| StoreMetrics::record_error("delete"))?;

            match code {
                CODE_APPLIED => {
                    tracing::debug!(id = %id, "Template deleted");
                    return Ok(());
                }
                CODE_MISSING => return Err(StoreError::NotFound(id.to_string())),
                _ => {
                    tracing::debug!(id = %id, attempt, "Revision changed during delete, retrying");
                }
            }
        }

        Err(StoreError::Conflict(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Template>, StoreError> {
        let index = self.index_key();
        let ids: Vec<String> = self
            .pool
            .execute(move |mut conn| async move {
                redis::cmd("SMEMBERS").arg(&index).query_async(&mut conn).await
            })
            .await
            .inspect_err(|_| StoreMetrics::record_error("list"))?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.record_key(id)).collect();
        let payloads: Vec<Option<String>> = self
            .pool
            .execute(move |mut conn| async move {
                let mut pipe = redis::pipe();
                for key in &keys {
                    pipe.hget(key, "data");
                }
                pipe.query_async(&mut conn).await
            })
            .await
            .inspect_err(|_| StoreMetrics::record_error("list"))?;

        let mut templates = Vec::with_capacity(payloads.len());
        for (id, payload) in ids.iter().zip(payloads) {
            let Some(payload) = payload else {
                // Deleted between SMEMBERS and HGET
                continue;
            };
            match serde_json::from_str::<Template>(&payload) {
                Ok(template) => templates.push(template),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Skipping unreadable template record");
                }
            }
        }

        Ok(templates)
    }

    async fn conditional_moderation_update(
        &self,
        id: &str,
        fingerprint: &str,
        decision: &ModerationDecision,
        moderated_at: DateTime<Utc>,
    ) -> Result<ConditionalWriteResult, StoreError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let Some(record) = self.read_record(id).await? else {
                return Ok(ConditionalWriteResult::NotFound);
            };

            if record.template.content_fingerprint.as_deref() == Some(fingerprint) {
                return Ok(ConditionalWriteResult::FingerprintMatched);
            }
            if record.template.fingerprint() != fingerprint {
                return Ok(ConditionalWriteResult::Superseded);
            }

            let before = record.template;
            let mut after = before.clone();
            apply_decision(&mut after, fingerprint, decision, moderated_at);

            let data = serde_json::to_string(&after)?;
            let event = serde_json::to_string(&ChangeEvent::modify(before, after.clone()))?;
            let key = self.record_key(id);
            let fp = fingerprint.to_string();
            let channel = self.channel.clone();
            let revision = record.revision;

            let code: i64 = self
                .pool
                .execute(move |mut conn| async move {
                    MODERATE_SCRIPT
                        .key(key)
                        .arg(fp)
                        .arg(revision)
                        .arg(data)
                        .arg(channel)
                        .arg(event)
                        .invoke_async(&mut conn)
                        .await
                })
                .await
                .inspect_err(|_| StoreMetrics::record_error("moderate"))?;

            match code {
                CODE_APPLIED => return Ok(ConditionalWriteResult::Applied(after)),
                CODE_FINGERPRINT_MATCHED => return Ok(ConditionalWriteResult::FingerprintMatched),
                CODE_SUPERSEDED => return Ok(ConditionalWriteResult::Superseded),
                CODE_MISSING => return Ok(ConditionalWriteResult::NotFound),
                CODE_REVISION_CHANGED => {
                    tracing::debug!(id = %id, attempt, "Revision changed during moderation write, retrying");
                }
                other => {
                    return Err(StoreError::Unavailable(format!(
                        "unexpected script result {}",
                        other
                    )));
                }
            }
        }

        Err(StoreError::Conflict(id.to_string()))
    }

    async fn record_use(&self, id: &str) -> Result<Template, StoreError> {
        self.replace_with(id, |t| {
            t.use_count = t.use_count.saturating_add(1);
            Ok(())
        })
        .await
    }

    async fn record_view(&self, id: &str) -> Result<Template, StoreError> {
        self.replace_with(id, |t| {
            t.view_count = t.view_count.saturating_add(1);
            Ok(())
        })
        .await
    }

    fn subscribe(&self) -> ChangeFeed {
        let client = self.pool.client().clone();
        let channel = self.channel.clone();

        Box::pin(async_stream::stream! {
            let mut backoff = ExponentialBackoff::with_config(BackoffConfig::reconnect());

            loop {
                match client.get_async_pubsub().await {
                    Ok(mut pubsub) => match pubsub.subscribe(&channel).await {
                        Ok(()) => {
                            backoff.reset();
                            tracing::info!(channel = %channel, "Subscribed to change feed");

                            let mut messages = pubsub.on_message();
                            while let Some(msg) = messages.next().await {
                                let payload: String = match msg.get_payload() {
                                    Ok(p) => p,
                                    Err(e) => {
                                        tracing::warn!(error = %e, "Failed to read change feed payload");
                                        continue;
                                    }
                                };

                                match serde_json::from_str::<ChangeEvent>(&payload) {
                                    Ok(event) => yield event,
                                    Err(e) => {
                                        tracing::warn!(error = %e, "Dropping malformed change event");
                                    }
                                }
                            }

                            tracing::warn!(channel = %channel, "Change feed subscription ended");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, channel = %channel, "Failed to subscribe to change feed");
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to open change feed connection");
                    }
                }

                StoreMetrics::record_feed_reconnect();
                let delay = backoff.next_delay();
                tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnecting change feed");
                tokio::time::sleep(delay).await;
            }
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let result = self.pool.ping().await;
        StoreMetrics::set_circuit_state(self.pool.circuit_state());
        result.map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
