//! Change feed consumer.
//!
//! Pulls events from a store subscription, groups them into batches (by
//! size or wait time) and hands each batch to the dispatcher. Stops on the
//! shutdown signal: between batches immediately, inside a batch after the
//! events already started have committed.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;

use super::dispatcher::ChangeEventDispatcher;
use crate::config::DispatcherConfig;
use crate::metrics::ChangeFeedMetrics;
use crate::store::ChangeFeed;

pub struct ChangeFeedConsumer {
    feed: ChangeFeed,
    dispatcher: Arc<ChangeEventDispatcher>,
    batch_size: usize,
    batch_wait: Duration,
    shutdown: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ChangeFeedConsumer {
    /// The feed should be subscribed before the first mutation that must be seen
    pub fn new(
        feed: ChangeFeed,
        dispatcher: Arc<ChangeEventDispatcher>,
        config: &DispatcherConfig,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        let shutdown_rx = shutdown.subscribe();
        Self {
            feed,
            dispatcher,
            batch_size: config.batch_size.max(1),
            batch_wait: Duration::from_millis(config.batch_wait_ms),
            shutdown,
            shutdown_rx,
        }
    }

    /// Get a shutdown signal sender
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Run until shutdown or the end of the feed
    pub async fn run(mut self) {
        tracing::info!(
            batch_size = self.batch_size,
            batch_wait_ms = self.batch_wait.as_millis() as u64,
            "Change feed consumer started"
        );

        loop {
            let first = tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
                event = self.feed.next() => match event {
                    Some(event) => event,
                    None => {
                        tracing::warn!("Change feed ended");
                        break;
                    }
                }
            };

            let mut batch = vec![first];
            let mut feed_ended = false;
            let deadline = tokio::time::Instant::now() + self.batch_wait;
            while batch.len() < self.batch_size {
                match tokio::time::timeout_at(deadline, self.feed.next()).await {
                    Ok(Some(event)) => batch.push(event),
                    Ok(None) => {
                        feed_ended = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            ChangeFeedMetrics::observe_batch(batch.len());
            let report = self
                .dispatcher
                .handle_until_shutdown(batch, &mut self.shutdown_rx)
                .await;

            if report.interrupted {
                tracing::info!(aborted = report.aborted, "Stopping after interrupted batch");
                break;
            }
            if feed_ended {
                tracing::warn!("Change feed ended");
                break;
            }
        }

        tracing::info!("Change feed consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModerationConfig;
    use crate::moderation::{HeuristicAnalyzer, ModerationEngine, ModerationPipeline, ModerationWriter};
    use crate::store::{ContentStore, MemoryContentStore};
    use crate::template::{CreateTemplateRequest, ModerationStatus, Visibility};

    fn consumer_for(
        store: Arc<MemoryContentStore>,
        shutdown: broadcast::Sender<()>,
    ) -> ChangeFeedConsumer {
        let moderation = ModerationConfig::default();
        let config = DispatcherConfig {
            batch_wait_ms: 10,
            ..Default::default()
        };
        let pipeline = ModerationPipeline::new(
            ModerationEngine::new(Arc::new(HeuristicAnalyzer::new()), &moderation),
            ModerationWriter::new(store.clone(), &config),
        );
        let dispatcher = Arc::new(ChangeEventDispatcher::new(
            Arc::new(pipeline),
            &config,
            &moderation,
        ));
        ChangeFeedConsumer::new(store.subscribe(), dispatcher, &config, shutdown)
    }

    #[tokio::test]
    async fn test_consumer_moderates_and_stops() {
        let store = Arc::new(MemoryContentStore::new());
        let (shutdown, _) = broadcast::channel(1);
        let consumer = consumer_for(store.clone(), shutdown.clone());
        let handle = tokio::spawn(consumer.run());

        store
            .put(
                CreateTemplateRequest {
                    id: Some("t1".to_string()),
                    title: "Meeting Notes".to_string(),
                    body: "Summary of the weekly sync".to_string(),
                    tags: vec![],
                    variables: None,
                    category: None,
                    visibility: Visibility::Public,
                    author_id: "author-1".to_string(),
                    author_email: None,
                }
                .into(),
            )
            .await
            .unwrap();

        let mut status = ModerationStatus::Pending;
        for _ in 0..100 {
            status = store.get("t1").await.unwrap().unwrap().moderation_status;
            if status != ModerationStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, ModerationStatus::Approved);

        shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("consumer did not stop")
            .unwrap();
    }
}
