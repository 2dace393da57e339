//! End-to-end moderation tests against the in-memory content store.
//!
//! Run with: cargo test --test pipeline_integration

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_test::assert_ok;

use prompt_template_service::changefeed::{
    ChangeEventDispatcher, ChangeFeedConsumer, EventDisposition,
};
use prompt_template_service::config::{DispatcherConfig, ModerationConfig};
use prompt_template_service::moderation::{
    AnalysisReport, AnalyzerError, CommitOutcome, HeuristicAnalyzer, ModerationCandidate,
    ModerationEngine, ModerationPipeline, ModerationWriter, TextAnalyzer, ToxicityLabel,
};
use prompt_template_service::store::{ChangeEvent, ContentStore, MemoryContentStore};
use prompt_template_service::template::{
    CreateTemplateRequest, ModerationStatus, Template, UpdateTemplateRequest, Visibility,
};

// ============================================================================
// Test analyzers
// ============================================================================

/// Counts calls and reports whatever it was built with
struct CountingAnalyzer {
    calls: AtomicUsize,
    report: AnalysisReport,
    delay: Duration,
}

impl CountingAnalyzer {
    fn clean() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            report: AnalysisReport::default(),
            delay: Duration::ZERO,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextAnalyzer for CountingAnalyzer {
    fn method(&self) -> &'static str {
        "counting"
    }

    async fn analyze(&self, _text: &str) -> Result<AnalysisReport, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.report.clone())
    }
}

/// Unavailable on the first call, clean afterwards
struct RecoveringAnalyzer {
    calls: AtomicUsize,
}

#[async_trait]
impl TextAnalyzer for RecoveringAnalyzer {
    fn method(&self) -> &'static str {
        "recovering"
    }

    async fn analyze(&self, _text: &str) -> Result<AnalysisReport, AnalyzerError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(AnalyzerError::Unavailable("analyzer returned 429".to_string()));
        }
        Ok(AnalysisReport::default())
    }
}

struct BrokenAnalyzer;

#[async_trait]
impl TextAnalyzer for BrokenAnalyzer {
    fn method(&self) -> &'static str {
        "broken"
    }

    async fn analyze(&self, _text: &str) -> Result<AnalysisReport, AnalyzerError> {
        Err(AnalyzerError::Unavailable("analyzer returned 503".to_string()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn dispatcher_config() -> DispatcherConfig {
    DispatcherConfig {
        concurrency: 4,
        batch_wait_ms: 10,
        retry_max_attempts: 3,
        backoff_initial_ms: 1,
        backoff_max_ms: 5,
        backoff_jitter: 0.0,
        ..Default::default()
    }
}

fn request(id: &str, title: &str, body: &str) -> CreateTemplateRequest {
    CreateTemplateRequest {
        id: Some(id.to_string()),
        title: title.to_string(),
        body: body.to_string(),
        tags: vec!["sales".to_string()],
        variables: None,
        category: None,
        visibility: Visibility::Public,
        author_id: "author-1".to_string(),
        author_email: Some("author@example.com".to_string()),
    }
}

fn template(id: &str) -> Template {
    request(id, "Cold Outreach Email", "Hi [[name]], quick question about your team").into()
}

struct Harness {
    store: Arc<MemoryContentStore>,
    pipeline: Arc<ModerationPipeline>,
    dispatcher: Arc<ChangeEventDispatcher>,
}

fn harness(analyzer: Arc<dyn TextAnalyzer>, config: DispatcherConfig) -> Harness {
    let store = Arc::new(MemoryContentStore::new());
    let moderation = ModerationConfig {
        analyzer_backoff_initial_ms: 1,
        analyzer_backoff_max_ms: 5,
        ..Default::default()
    };
    let pipeline = Arc::new(ModerationPipeline::new(
        ModerationEngine::new(analyzer, &moderation),
        ModerationWriter::new(store.clone(), &config),
    ));
    let dispatcher = Arc::new(ChangeEventDispatcher::new(
        pipeline.clone(),
        &config,
        &moderation,
    ));
    Harness {
        store,
        pipeline,
        dispatcher,
    }
}

fn candidate(t: &Template) -> ModerationCandidate {
    ModerationCandidate {
        id: t.id.clone(),
        title: t.title.clone(),
        body: t.body.clone(),
        fingerprint: t.fingerprint(),
    }
}

async fn wait_for_status(store: &MemoryContentStore, id: &str, status: ModerationStatus) -> Template {
    for _ in 0..200 {
        if let Ok(Some(t)) = store.get(id).await {
            if t.moderation_status == status {
                return t;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("template {} never reached {:?}", id, status);
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_commit_twice_leaves_same_state() {
    let h = harness(Arc::new(CountingAnalyzer::clean()), dispatcher_config());
    let created = assert_ok!(h.store.put(template("t1")).await);

    let first = h.pipeline.run(&candidate(&created)).await;
    assert_eq!(first.status, ModerationStatus::Approved);
    assert_eq!(first.commit, CommitOutcome::Applied);
    let after_first = h.store.get("t1").await.unwrap().unwrap();

    let second = h.pipeline.run(&candidate(&created)).await;
    assert_eq!(second.commit, CommitOutcome::AlreadyApplied);
    let after_second = h.store.get("t1").await.unwrap().unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.content_fingerprint, Some(created.fingerprint()));
}

#[tokio::test]
async fn test_analyzer_failure_is_never_approved() {
    let h = harness(Arc::new(BrokenAnalyzer), dispatcher_config());
    let created = h.store.put(template("t1")).await.unwrap();

    let outcome = h.pipeline.run(&candidate(&created)).await;
    assert_eq!(outcome.status, ModerationStatus::Review);

    let stored = h.store.get("t1").await.unwrap().unwrap();
    assert_eq!(stored.moderation_status, ModerationStatus::Review);
    let details = stored.moderation_details.unwrap();
    assert!(details.error.is_some());
    assert_eq!(details.method, "broken");
}

#[tokio::test]
async fn test_transient_analyzer_failure_is_retried() {
    let analyzer = Arc::new(RecoveringAnalyzer {
        calls: AtomicUsize::new(0),
    });
    let h = harness(analyzer.clone(), dispatcher_config());
    let created = h.store.put(template("t1")).await.unwrap();

    let outcome = h.pipeline.run(&candidate(&created)).await;
    assert_eq!(outcome.status, ModerationStatus::Approved);
    assert_eq!(outcome.commit, CommitOutcome::Applied);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);

    let details = h.store.get("t1").await.unwrap().unwrap().moderation_details.unwrap();
    assert_eq!(details.attempts, 2);
    assert!(details.error.is_none());
}

#[tokio::test]
async fn test_concurrent_runs_commit_once() {
    let analyzer = Arc::new(CountingAnalyzer {
        delay: Duration::from_millis(20),
        ..CountingAnalyzer::clean()
    });
    let h = harness(analyzer, dispatcher_config());
    let created = h.store.put(template("t1")).await.unwrap();
    let work = candidate(&created);

    let (a, b) = tokio::join!(h.pipeline.run(&work), h.pipeline.run(&work));
    let mut commits = vec![a.commit, b.commit];
    commits.sort_by_key(|c| c.as_str());

    assert_eq!(commits, vec![CommitOutcome::AlreadyApplied, CommitOutcome::Applied]);
}

#[tokio::test]
async fn test_duplicate_deliveries_in_one_batch() {
    let analyzer = Arc::new(CountingAnalyzer {
        delay: Duration::from_millis(20),
        ..CountingAnalyzer::clean()
    });
    let h = harness(analyzer, dispatcher_config());
    let created = h.store.put(template("t1")).await.unwrap();
    let event = ChangeEvent::insert(created.clone());

    let report = h
        .dispatcher
        .handle(vec![event.clone(), event.clone(), event.clone()])
        .await;

    assert_eq!(report.applied, 1);
    assert_eq!(report.already_applied, 2);
    assert_eq!(report.superseded + report.failed, 0);

    let committed = h.store.get("t1").await.unwrap().unwrap();
    assert_eq!(committed.moderation_status, ModerationStatus::Approved);
    assert_eq!(committed.content_fingerprint, Some(created.fingerprint()));

    // A later redelivery changes nothing
    let report = h.dispatcher.handle(vec![event]).await;
    assert_eq!(report.already_applied, 1);
    assert_eq!(h.store.get("t1").await.unwrap().unwrap(), committed);
}

#[tokio::test]
async fn test_toxic_content_is_rejected() {
    let analyzer = CountingAnalyzer {
        report: AnalysisReport {
            toxicity_labels: vec![ToxicityLabel {
                name: "INSULT".to_string(),
                score: 0.95,
            }],
            ..Default::default()
        },
        ..CountingAnalyzer::clean()
    };
    let h = harness(Arc::new(analyzer), dispatcher_config());
    let created = h.store.put(template("t1")).await.unwrap();

    let report = h.dispatcher.handle(vec![ChangeEvent::insert(created)]).await;
    assert_eq!(report.applied, 1);

    let stored = h.store.get("t1").await.unwrap().unwrap();
    assert_eq!(stored.moderation_status, ModerationStatus::Rejected);
}

#[tokio::test]
async fn test_unchanged_modify_skips_engine() {
    let analyzer = Arc::new(CountingAnalyzer::clean());
    let h = harness(analyzer.clone(), dispatcher_config());

    let mut before = template("t1");
    before.moderation_status = ModerationStatus::Approved;
    before.content_fingerprint = Some(before.fingerprint());
    before.moderated_at = Some(Utc::now() - chrono::Duration::hours(2));
    let mut after = before.clone();
    after.view_count += 1;

    let report = h.dispatcher.handle(vec![ChangeEvent::modify(before, after)]).await;

    assert_eq!(report.skipped_unchanged, 1);
    assert_eq!(report.processed, 0);
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn test_write_back_echo_is_not_remoderated() {
    let analyzer = Arc::new(CountingAnalyzer::clean());
    let h = harness(analyzer.clone(), dispatcher_config());
    let mut feed = h.store.subscribe();

    let created = h.store.put(template("t1")).await.unwrap();
    let insert = futures::StreamExt::next(&mut feed).await.unwrap();
    let report = h.dispatcher.handle(vec![insert]).await;
    assert_eq!(report.applied, 1);

    // The write-back itself shows up on the feed
    let echo = futures::StreamExt::next(&mut feed).await.unwrap();
    assert_eq!(echo.template_id(), Some(created.id.as_str()));
    let report = h.dispatcher.handle(vec![echo]).await;

    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped_unchanged + report.skipped_self_write, 1);
    assert_eq!(analyzer.calls(), 1);
}

#[tokio::test]
async fn test_stale_decision_is_superseded() {
    let h = harness(Arc::new(CountingAnalyzer::clean()), dispatcher_config());
    let created = h.store.put(template("t1")).await.unwrap();
    let stale = candidate(&created);

    let edit = UpdateTemplateRequest {
        body: Some("Completely rewritten body".to_string()),
        ..Default::default()
    };
    h.store.update_content("t1", edit).await.unwrap();

    let outcome = h.pipeline.run(&stale).await;
    assert_eq!(outcome.commit, CommitOutcome::Superseded);

    let stored = h.store.get("t1").await.unwrap().unwrap();
    assert_eq!(stored.moderation_status, ModerationStatus::Pending);
    assert!(stored.content_fingerprint.is_none());
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let h = harness(Arc::new(CountingAnalyzer::clean()), dispatcher_config());
    let stored = h.store.put(template("kept")).await.unwrap();

    let events = vec![
        // Deleted before moderation
        ChangeEvent::insert(template("gone")),
        ChangeEvent {
            kind: prompt_template_service::store::ChangeKind::Modify,
            before: None,
            after: None,
        },
        ChangeEvent::insert(stored),
    ];
    let report = h.dispatcher.handle(events).await;

    assert_eq!(report.received, 3);
    assert_eq!(report.not_found, 1);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.applied, 1);
    assert!(matches!(
        report.outcome(2).unwrap().disposition,
        EventDisposition::Processed {
            status: ModerationStatus::Approved,
            commit: CommitOutcome::Applied,
        }
    ));
}

#[tokio::test]
async fn test_parallel_batch_moderates_every_event() {
    let analyzer = Arc::new(CountingAnalyzer {
        delay: Duration::from_millis(20),
        ..CountingAnalyzer::clean()
    });
    let h = harness(analyzer.clone(), dispatcher_config());

    let mut events = Vec::new();
    for i in 0..12 {
        let created = h.store.put(template(&format!("t{}", i))).await.unwrap();
        events.push(ChangeEvent::insert(created));
    }

    let report = h.dispatcher.handle(events).await;

    assert_eq!(report.applied, 12);
    assert_eq!(analyzer.calls(), 12);
    let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_shutdown_aborts_unstarted_events() {
    let analyzer = Arc::new(CountingAnalyzer::clean());
    let h = harness(analyzer.clone(), dispatcher_config());
    let (tx, mut rx) = broadcast::channel(1);
    tx.send(()).unwrap();

    let events = vec![
        ChangeEvent::insert(template("t1")),
        ChangeEvent::insert(template("t2")),
    ];
    let report = h.dispatcher.handle_until_shutdown(events, &mut rx).await;

    assert!(report.interrupted);
    assert_eq!(report.aborted, 2);
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn test_consumer_moderates_store_writes() {
    let store = Arc::new(MemoryContentStore::new());
    let moderation = ModerationConfig::default();
    let config = dispatcher_config();
    let pipeline = Arc::new(ModerationPipeline::new(
        ModerationEngine::new(Arc::new(HeuristicAnalyzer::new()), &moderation),
        ModerationWriter::new(store.clone(), &config),
    ));
    let dispatcher = Arc::new(ChangeEventDispatcher::new(pipeline, &config, &moderation));

    let (shutdown, _) = broadcast::channel(1);
    let consumer = ChangeFeedConsumer::new(store.subscribe(), dispatcher.clone(), &config, shutdown.clone());
    let handle = tokio::spawn(consumer.run());

    store.put(template("t1")).await.unwrap();
    let approved = wait_for_status(&store, "t1", ModerationStatus::Approved).await;
    assert_eq!(approved.content_fingerprint, Some(approved.fingerprint()));

    // An author edit sends the template back through moderation
    let edit = UpdateTemplateRequest {
        title: Some("Warm Intro Email".to_string()),
        ..Default::default()
    };
    let edited = store.update_content("t1", edit).await.unwrap();
    assert_eq!(edited.moderation_status, ModerationStatus::Pending);
    let reapproved = wait_for_status(&store, "t1", ModerationStatus::Approved).await;
    assert_eq!(reapproved.content_fingerprint, Some(edited.fingerprint()));

    shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("consumer did not stop")
        .unwrap();

    assert!(dispatcher.stats().applied >= 2);
}
