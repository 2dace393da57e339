//! Change event dispatcher.
//!
//! Decides for every change event whether the template needs moderation and
//! runs the moderation pipeline for those that do. Events are independent:
//! a failing event is recorded in the report and the rest of the batch
//! carries on.
//!
//! An event is forwarded only when all of these hold:
//! 1. it is not a removal and the template is public
//! 2. it is not a modify whose content was already moderated with a
//!    terminal status
//! 3. it is not the echo of the pipeline's own write-back

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use super::report::{EventDisposition, EventOutcome, IgnoreReason, ProcessingReport};
use crate::config::{DispatcherConfig, ModerationConfig};
use crate::metrics::{ChangeFeedMetrics, ModerationMetrics};
use crate::moderation::{ModerationCandidate, ModerationPipeline};
use crate::store::{ChangeEvent, ChangeKind};
use crate::template::content_fingerprint;

/// Dispatcher-level decision for one event
#[derive(Debug, Clone)]
pub enum Classification {
    Ignore(IgnoreReason),
    Malformed(String),
    SkipUnchanged,
    SkipSelfWrite,
    Moderate(ModerationCandidate),
}

/// Cumulative dispatcher counters
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub batches: AtomicU64,
    pub events_received: AtomicU64,
    pub ignored: AtomicU64,
    pub skipped: AtomicU64,
    pub processed: AtomicU64,
    pub applied: AtomicU64,
    pub failed: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn add(&self, report: &ProcessingReport) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.events_received
            .fetch_add(report.received as u64, Ordering::Relaxed);
        self.ignored.fetch_add(
            (report.ignored + report.malformed) as u64,
            Ordering::Relaxed,
        );
        self.skipped.fetch_add(
            (report.skipped_unchanged + report.skipped_self_write) as u64,
            Ordering::Relaxed,
        );
        self.processed
            .fetch_add(report.processed as u64, Ordering::Relaxed);
        self.applied.fetch_add(report.applied as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub batches: u64,
    pub events_received: u64,
    pub ignored: u64,
    pub skipped: u64,
    pub processed: u64,
    pub applied: u64,
    pub failed: u64,
}

pub struct ChangeEventDispatcher {
    pipeline: Arc<ModerationPipeline>,
    concurrency: usize,
    self_write_window: Duration,
    stats: DispatcherStats,
}

impl ChangeEventDispatcher {
    pub fn new(
        pipeline: Arc<ModerationPipeline>,
        dispatcher: &DispatcherConfig,
        moderation: &ModerationConfig,
    ) -> Self {
        Self {
            pipeline,
            concurrency: dispatcher.concurrency.max(1),
            self_write_window: Duration::seconds(moderation.self_write_window_seconds),
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Analyzer behind the moderation pipeline
    pub fn analyzer_method(&self) -> &'static str {
        self.pipeline.engine().method()
    }

    /// Decide what to do with one event; `now` anchors the self-write window
    pub fn classify(&self, event: &ChangeEvent, now: DateTime<Utc>) -> Classification {
        if event.kind == ChangeKind::Remove {
            return Classification::Ignore(IgnoreReason::Removed);
        }

        let Some(after) = event.after.as_ref() else {
            return Classification::Malformed(format!(
                "{} event without an after snapshot",
                event.kind.as_str()
            ));
        };
        if after.id.is_empty() {
            return Classification::Malformed("after snapshot has an empty id".to_string());
        }

        if !after.is_public() {
            return Classification::Ignore(IgnoreReason::NotPublic);
        }

        let fingerprint = content_fingerprint(&after.title, &after.body);

        if let (ChangeKind::Modify, Some(before)) = (event.kind, event.before.as_ref()) {
            if before.content_fingerprint.as_deref() == Some(fingerprint.as_str())
                && after.moderation_status.is_terminal()
            {
                return Classification::SkipUnchanged;
            }

            if let Some(moderated_at) = after.moderated_at {
                if before.moderated_at != Some(moderated_at) {
                    let recent = now.signed_duration_since(moderated_at) <= self.self_write_window;
                    let stamped = after.content_fingerprint.as_deref() == Some(fingerprint.as_str());
                    if recent || stamped {
                        return Classification::SkipSelfWrite;
                    }
                }
            }
        }

        Classification::Moderate(ModerationCandidate {
            id: after.id.clone(),
            title: after.title.clone(),
            body: after.body.clone(),
            fingerprint,
        })
    }

    /// Process a batch to completion
    pub async fn handle(&self, events: Vec<ChangeEvent>) -> ProcessingReport {
        self.dispatch(events, None).await
    }

    /// Process a batch, starting no new events once `shutdown` fires.
    ///
    /// Events already handed to the pipeline run to completion; the rest are
    /// reported as aborted.
    pub async fn handle_until_shutdown(
        &self,
        events: Vec<ChangeEvent>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> ProcessingReport {
        self.dispatch(events, Some(shutdown)).await
    }

    #[tracing::instrument(
        name = "changefeed.dispatch",
        skip(self, events, shutdown),
        fields(batch_size = events.len())
    )]
    async fn dispatch(
        &self,
        events: Vec<ChangeEvent>,
        mut shutdown: Option<&mut broadcast::Receiver<()>>,
    ) -> ProcessingReport {
        let now = Utc::now();
        let mut report = ProcessingReport::new(events.len());
        let mut in_flight = FuturesUnordered::new();
        ChangeFeedMetrics::record_received(events.len() as u64);

        for (index, event) in events.into_iter().enumerate() {
            let id = event.template_id().map(str::to_string);

            if !report.interrupted {
                if let Some(rx) = shutdown.as_deref_mut() {
                    if shutdown_requested(rx) {
                        tracing::info!(index, "Shutdown requested, aborting remaining events");
                        report.interrupted = true;
                    }
                }
            }
            if report.interrupted {
                record(&mut report, index, id, EventDisposition::Aborted);
                continue;
            }

            let disposition = match self.classify(&event, now) {
                Classification::Moderate(candidate) => {
                    let pipeline = self.pipeline.clone();
                    in_flight.push(async move {
                        ModerationMetrics::in_flight_inc();
                        let handle = tokio::spawn(async move { pipeline.run(&candidate).await });
                        let result = handle.await;
                        ModerationMetrics::in_flight_dec();
                        (index, id, result)
                    });

                    while in_flight.len() >= self.concurrency {
                        if let Some((index, id, result)) = in_flight.next().await {
                            record(&mut report, index, id, joined(result));
                        }
                    }
                    continue;
                }
                Classification::Ignore(reason) => EventDisposition::Ignored { reason },
                Classification::Malformed(error) => {
                    tracing::warn!(index, error = %error, "Skipping malformed change event");
                    EventDisposition::Malformed { error }
                }
                Classification::SkipUnchanged => EventDisposition::SkippedUnchanged,
                Classification::SkipSelfWrite => EventDisposition::SkippedSelfWrite,
            };
            tracing::debug!(index, id = ?id, disposition = disposition.label(), "Change event not forwarded");
            record(&mut report, index, id, disposition);
        }

        while let Some((index, id, result)) = in_flight.next().await {
            record(&mut report, index, id, joined(result));
        }

        report.outcomes.sort_by_key(|o| o.index);
        self.stats.add(&report);

        tracing::info!(
            received = report.received,
            processed = report.processed,
            applied = report.applied,
            skipped = report.skipped_unchanged + report.skipped_self_write,
            ignored = report.ignored,
            failed = report.failed,
            aborted = report.aborted,
            "Change batch dispatched"
        );

        report
    }
}

fn record(report: &mut ProcessingReport, index: usize, id: Option<String>, disposition: EventDisposition) {
    ChangeFeedMetrics::record_disposition(disposition.label());
    report.record(EventOutcome {
        index,
        id,
        disposition,
    });
}

fn joined(
    result: Result<crate::moderation::PipelineOutcome, tokio::task::JoinError>,
) -> EventDisposition {
    match result {
        Ok(outcome) => EventDisposition::Processed {
            status: outcome.status,
            commit: outcome.commit,
        },
        Err(e) => {
            tracing::error!(error = %e, "Moderation task failed");
            EventDisposition::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Non-blocking check of the shutdown channel; a closed or lagged channel counts as a signal
fn shutdown_requested(rx: &mut broadcast::Receiver<()>) -> bool {
    !matches!(rx.try_recv(), Err(TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{HeuristicAnalyzer, ModerationEngine, ModerationWriter};
    use crate::store::MemoryContentStore;
    use crate::template::{CreateTemplateRequest, ModerationStatus, Template, Visibility};

    fn dispatcher() -> ChangeEventDispatcher {
        let store = Arc::new(MemoryContentStore::new());
        let moderation = ModerationConfig::default();
        let config = DispatcherConfig::default();
        let pipeline = ModerationPipeline::new(
            ModerationEngine::new(Arc::new(HeuristicAnalyzer::new()), &moderation),
            ModerationWriter::new(store, &config),
        );
        ChangeEventDispatcher::new(Arc::new(pipeline), &config, &moderation)
    }

    fn template(visibility: Visibility) -> Template {
        CreateTemplateRequest {
            id: Some("t1".to_string()),
            title: "Welcome Email".to_string(),
            body: "Hi [[name]], welcome aboard".to_string(),
            tags: vec![],
            variables: None,
            category: None,
            visibility,
            author_id: "author-1".to_string(),
            author_email: None,
        }
        .into()
    }

    fn approved(mut t: Template, moderated_at: DateTime<Utc>) -> Template {
        t.moderation_status = ModerationStatus::Approved;
        t.content_fingerprint = Some(t.fingerprint());
        t.moderated_at = Some(moderated_at);
        t
    }

    #[test]
    fn test_remove_is_ignored() {
        let event = ChangeEvent::remove(template(Visibility::Public));
        assert!(matches!(
            dispatcher().classify(&event, Utc::now()),
            Classification::Ignore(IgnoreReason::Removed)
        ));
    }

    #[test]
    fn test_private_is_ignored() {
        let event = ChangeEvent::insert(template(Visibility::Private));
        assert!(matches!(
            dispatcher().classify(&event, Utc::now()),
            Classification::Ignore(IgnoreReason::NotPublic)
        ));
    }

    #[test]
    fn test_missing_after_is_malformed() {
        let event = ChangeEvent {
            kind: ChangeKind::Modify,
            before: Some(template(Visibility::Public)),
            after: None,
        };
        assert!(matches!(
            dispatcher().classify(&event, Utc::now()),
            Classification::Malformed(_)
        ));
    }

    #[test]
    fn test_insert_is_moderated() {
        let t = template(Visibility::Public);
        let expected = t.fingerprint();
        match dispatcher().classify(&ChangeEvent::insert(t), Utc::now()) {
            Classification::Moderate(candidate) => {
                assert_eq!(candidate.id, "t1");
                assert_eq!(candidate.fingerprint, expected);
            }
            other => panic!("expected moderation, got {:?}", other),
        }
    }

    #[test]
    fn test_unchanged_terminal_modify_is_skipped() {
        let moderated_at = Utc::now() - Duration::hours(1);
        let before = approved(template(Visibility::Public), moderated_at);
        let mut after = before.clone();
        after.use_count += 1;

        assert!(matches!(
            dispatcher().classify(&ChangeEvent::modify(before, after), Utc::now()),
            Classification::SkipUnchanged
        ));
    }

    #[test]
    fn test_own_write_is_skipped() {
        let before = template(Visibility::Public);
        let after = approved(before.clone(), Utc::now());

        assert!(matches!(
            dispatcher().classify(&ChangeEvent::modify(before, after), Utc::now()),
            Classification::SkipSelfWrite
        ));
    }

    #[test]
    fn test_late_echo_of_own_write_is_skipped() {
        let before = template(Visibility::Public);
        let after = approved(before.clone(), Utc::now() - Duration::minutes(10));

        assert!(matches!(
            dispatcher().classify(&ChangeEvent::modify(before, after), Utc::now()),
            Classification::SkipSelfWrite
        ));
    }

    #[test]
    fn test_content_edit_after_approval_is_moderated() {
        let before = approved(template(Visibility::Public), Utc::now() - Duration::hours(1));
        let mut after = before.clone();
        after.body = "Completely new text".to_string();
        after.moderation_status = ModerationStatus::Pending;
        after.content_fingerprint = None;

        assert!(matches!(
            dispatcher().classify(&ChangeEvent::modify(before, after), Utc::now()),
            Classification::Moderate(_)
        ));
    }

    #[test]
    fn test_shutdown_requested() {
        let (tx, mut rx) = broadcast::channel(1);
        assert!(!shutdown_requested(&mut rx));
        tx.send(()).unwrap();
        assert!(shutdown_requested(&mut rx));
    }
}
