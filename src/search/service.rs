//! Search over the content store.
//!
//! Loads the candidate set from the store and hands it to the engine.
//! Transient store failures are retried a few times before the request is
//! reported as unavailable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::engine::SearchEngine;
use super::types::{SearchError, SearchPage, SearchQuery};
use crate::config::SearchConfig;
use crate::metrics::SearchMetrics;
use crate::resilience::{BackoffConfig, ExponentialBackoff};
use crate::store::ContentStore;
use crate::template::Template;

const LOAD_ATTEMPTS: u32 = 3;

pub struct SearchService {
    store: Arc<dyn ContentStore>,
    engine: SearchEngine,
    backoff: BackoffConfig,
}

impl SearchService {
    pub fn new(store: Arc<dyn ContentStore>, config: &SearchConfig) -> Self {
        Self {
            store,
            engine: SearchEngine::new(config),
            backoff: BackoffConfig::interactive(),
        }
    }

    pub fn engine(&self) -> &SearchEngine {
        &self.engine
    }

    #[tracing::instrument(
        name = "search.query",
        skip(self, query),
        fields(query = %query.query, sort = query.sort.as_str(), matches = tracing::field::Empty)
    )]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SearchError> {
        let started = Instant::now();
        let mode = if query.is_browse() { "browse" } else { "scored" };

        let candidates = self.load_candidates().await.inspect_err(|_| {
            SearchMetrics::record_error("unavailable");
        })?;

        let page = self.engine.search(query, candidates).inspect_err(|e| {
            if let SearchError::InvalidCursor(_) = e {
                SearchMetrics::record_error("invalid_cursor");
            }
        })?;

        tracing::Span::current().record("matches", page.total_matches);
        SearchMetrics::record_search(mode, page.total_matches, started.elapsed().as_secs_f64());

        Ok(page)
    }

    async fn load_candidates(&self) -> Result<Vec<Template>, SearchError> {
        let mut backoff = ExponentialBackoff::with_config(self.backoff.clone());
        let mut attempt = 1;

        loop {
            match self.store.list().await {
                Ok(templates) => return Ok(templates),
                Err(e) if e.is_transient() && attempt < LOAD_ATTEMPTS => {
                    let delay: Duration = backoff.next_delay();
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Loading search candidates failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Loading search candidates failed");
                    return Err(SearchError::Unavailable(e.to_string()));
                }
            }
        }
    }
}
