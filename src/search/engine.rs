//! Search query engine.
//!
//! Stateless: every call works on the candidate set it is given.
//!
//! 1. Filter by visibility, approval (public only), tag and owner
//! 2. Empty query: order by the selected sort order
//! 3. Otherwise score every candidate, drop scores <= 0 and order by
//!    score desc, createdAt desc, id asc
//! 4. Page from the cursor position

use super::cursor::{PageCursor, RankKey};
use super::scorer::{RelevanceScorer, ScoringWeights};
use super::tokenizer::tokenize;
use super::types::{ScoredItem, SearchError, SearchPage, SearchQuery, SortOrder};
use crate::config::SearchConfig;
use crate::template::{ModerationStatus, Template, Visibility};

const SCORED_MODE: &str = "scored";

#[derive(Debug, Clone)]
pub struct SearchEngine {
    scorer: RelevanceScorer,
    default_page_size: usize,
    max_page_size: usize,
}

impl SearchEngine {
    pub fn new(config: &SearchConfig) -> Self {
        let max_page_size = config.max_page_size.max(1);
        Self {
            scorer: RelevanceScorer::new(ScoringWeights::from(config)),
            default_page_size: config.default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    /// Requested page size clamped to [1, max]
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }

    pub fn search(
        &self,
        query: &SearchQuery,
        candidates: Vec<Template>,
    ) -> Result<SearchPage, SearchError> {
        let limit = self.page_limit(query.limit);
        let candidates = filter(query, candidates);

        let (mode, mut ranked) = if query.is_browse() {
            (query.sort.as_str(), browse(query.sort, candidates))
        } else {
            (SCORED_MODE, self.rank(&query.query, candidates))
        };

        ranked.sort_by(|a, b| a.0.rank_cmp(&b.0));
        let total_matches = ranked.len();

        let start = match &query.cursor {
            Some(encoded) => {
                let after = PageCursor::decode_for(encoded, mode)?;
                ranked.partition_point(|(key, _)| key.rank_cmp(&after).is_le())
            }
            None => 0,
        };

        let remaining = ranked.len().saturating_sub(start);
        let page: Vec<(RankKey, ScoredItem)> = ranked.into_iter().skip(start).take(limit).collect();

        let next_cursor = if remaining > limit {
            page.last()
                .map(|(key, _)| PageCursor::new(mode, key.clone()).encode())
        } else {
            None
        };

        Ok(SearchPage {
            items: page.into_iter().map(|(_, item)| item).collect(),
            next_cursor,
            total_matches,
        })
    }

    fn rank(&self, query: &str, candidates: Vec<Template>) -> Vec<(RankKey, ScoredItem)> {
        let terms = tokenize(query);

        candidates
            .into_iter()
            .filter_map(|template| {
                let breakdown = self.scorer.score(query, &terms, &template);
                let score = breakdown.total();
                if score <= 0.0 {
                    return None;
                }
                let key = RankKey {
                    primary: score,
                    secondary: 0.0,
                    created_at: template.created_at.timestamp_micros(),
                    id: template.id.clone(),
                };
                Some((
                    key,
                    ScoredItem {
                        template,
                        score,
                        breakdown: Some(breakdown),
                    },
                ))
            })
            .collect()
    }
}

fn filter(query: &SearchQuery, candidates: Vec<Template>) -> Vec<Template> {
    // Private templates are only ever listed for their owner
    if query.visibility == Visibility::Private && query.owner.is_none() {
        return Vec::new();
    }

    let tag = query
        .tag
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());

    candidates
        .into_iter()
        .filter(|t| t.visibility == query.visibility)
        .filter(|t| {
            query.visibility != Visibility::Public
                || t.moderation_status == ModerationStatus::Approved
        })
        .filter(|t| tag.as_ref().map_or(true, |tag| t.tags.contains(tag)))
        .filter(|t| {
            query
                .owner
                .as_deref()
                .map_or(true, |owner| t.author_id == owner)
        })
        .collect()
}

fn browse(sort: SortOrder, candidates: Vec<Template>) -> Vec<(RankKey, ScoredItem)> {
    candidates
        .into_iter()
        .map(|template| {
            let (primary, secondary) = match sort {
                SortOrder::Popular => (template.use_count as f64, template.view_count as f64),
                SortOrder::Views => (template.view_count as f64, template.use_count as f64),
                SortOrder::Recent => (0.0, 0.0),
            };
            let key = RankKey {
                primary,
                secondary,
                created_at: template.created_at.timestamp_micros(),
                id: template.id.clone(),
            };
            (
                key,
                ScoredItem {
                    template,
                    score: 0.0,
                    breakdown: None,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::CursorError;
    use crate::template::CreateTemplateRequest;
    use chrono::{Duration, Utc};

    fn template(id: &str, title: &str, use_count: u64) -> Template {
        let mut t: Template = CreateTemplateRequest {
            id: Some(id.to_string()),
            title: title.to_string(),
            body: "Body text".to_string(),
            tags: vec!["general".to_string()],
            variables: None,
            category: None,
            visibility: Visibility::Public,
            author_id: "author-1".to_string(),
            author_email: None,
        }
        .into();
        t.moderation_status = ModerationStatus::Approved;
        t.use_count = use_count;
        t
    }

    fn engine() -> SearchEngine {
        SearchEngine::new(&SearchConfig::default())
    }

    fn ids(page: &SearchPage) -> Vec<&str> {
        page.items.iter().map(|i| i.template.id.as_str()).collect()
    }

    #[test]
    fn test_unapproved_public_excluded() {
        let mut pending = template("p", "Email", 0);
        pending.moderation_status = ModerationStatus::Pending;
        let approved = template("a", "Email", 0);

        let page = engine()
            .search(&SearchQuery::text("email"), vec![pending, approved])
            .unwrap();
        assert_eq!(ids(&page), vec!["a"]);
    }

    #[test]
    fn test_private_requires_owner() {
        let mut mine = template("mine", "Email", 0);
        mine.visibility = Visibility::Private;
        mine.moderation_status = ModerationStatus::Pending;
        let mut theirs = mine.clone();
        theirs.id = "theirs".to_string();
        theirs.author_id = "someone-else".to_string();

        let mut query = SearchQuery {
            visibility: Visibility::Private,
            ..Default::default()
        };
        let page = engine()
            .search(&query, vec![mine.clone(), theirs.clone()])
            .unwrap();
        assert!(page.items.is_empty());

        query.owner = Some("author-1".to_string());
        let page = engine().search(&query, vec![mine, theirs]).unwrap();
        assert_eq!(ids(&page), vec!["mine"]);
    }

    #[test]
    fn test_tag_filter() {
        let mut tagged = template("t", "Email", 0);
        tagged.tags = vec!["sales".to_string()];
        let other = template("o", "Email", 0);

        let query = SearchQuery {
            query: "email".to_string(),
            tag: Some(" Sales ".to_string()),
            ..Default::default()
        };
        let page = engine().search(&query, vec![tagged, other]).unwrap();
        assert_eq!(ids(&page), vec!["t"]);
    }

    #[test]
    fn test_ties_broken_by_recency_then_id() {
        let now = Utc::now();
        let mut old = template("old", "Email", 0);
        old.created_at = now - Duration::days(2);
        let mut new = template("new", "Email", 0);
        new.created_at = now;
        let mut twin = template("twin", "Email", 0);
        twin.created_at = now;

        let page = engine()
            .search(&SearchQuery::text("email"), vec![old, twin, new])
            .unwrap();
        assert_eq!(ids(&page), vec!["new", "twin", "old"]);
    }

    #[test]
    fn test_browse_recent() {
        let now = Utc::now();
        let mut a = template("a", "A", 100);
        a.created_at = now - Duration::hours(1);
        let mut b = template("b", "B", 1);
        b.created_at = now;

        let query = SearchQuery {
            sort: SortOrder::Recent,
            ..Default::default()
        };
        let page = engine().search(&query, vec![a, b]).unwrap();
        assert_eq!(ids(&page), vec!["b", "a"]);
        assert!(page.items.iter().all(|i| i.breakdown.is_none()));
    }

    #[test]
    fn test_pagination_walks_all_items() {
        let candidates: Vec<Template> = (0..7)
            .map(|i| template(&format!("t{}", i), "Email", i))
            .collect();
        let engine = engine();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let query = SearchQuery {
                query: "email".to_string(),
                limit: Some(3),
                cursor: cursor.clone(),
                ..Default::default()
            };
            let page = engine.search(&query, candidates.clone()).unwrap();
            assert_eq!(page.total_matches, 7);
            seen.extend(page.items.iter().map(|i| i.template.id.clone()));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(seen, vec!["t6", "t5", "t4", "t3", "t2", "t1", "t0"]);
    }

    #[test]
    fn test_browse_cursor_rejected_for_scored_query() {
        let candidates = vec![template("a", "Email", 1), template("b", "Email", 2)];
        let browse = SearchQuery {
            limit: Some(1),
            ..Default::default()
        };
        let cursor = engine()
            .search(&browse, candidates.clone())
            .unwrap()
            .next_cursor
            .unwrap();

        let scored = SearchQuery {
            query: "email".to_string(),
            cursor: Some(cursor),
            ..Default::default()
        };
        assert!(matches!(
            engine().search(&scored, candidates),
            Err(SearchError::InvalidCursor(CursorError::ModeMismatch))
        ));
    }

    #[test]
    fn test_limit_clamped() {
        let engine = engine();
        assert_eq!(engine.page_limit(None), 20);
        assert_eq!(engine.page_limit(Some(0)), 1);
        assert_eq!(engine.page_limit(Some(10_000)), 100);
    }
}
