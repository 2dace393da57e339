//! Search request and result types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cursor::CursorError;
use crate::template::{Template, Visibility};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    InvalidCursor(#[from] CursorError),

    #[error("Search unavailable: {0}")]
    Unavailable(String),
}

/// Ordering used when the query string is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// useCount desc, then viewCount desc
    #[default]
    Popular,
    /// createdAt desc
    Recent,
    /// viewCount desc, then useCount desc
    Views,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Popular => "popular",
            SortOrder::Recent => "recent",
            SortOrder::Views => "views",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Free text; empty selects the browse path
    pub query: String,
    pub tag: Option<String>,
    pub owner: Option<String>,
    pub visibility: Visibility,
    pub sort: SortOrder,
    pub cursor: Option<String>,
    /// Clamped to the configured page size limits
    pub limit: Option<usize>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            tag: None,
            owner: None,
            visibility: Visibility::Public,
            sort: SortOrder::Popular,
            cursor: None,
            limit: None,
        }
    }
}

impl SearchQuery {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn is_browse(&self) -> bool {
        self.query.trim().is_empty()
    }
}

/// Per-field contributions to a relevance score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub title_exact: f64,
    pub title: f64,
    pub body: f64,
    pub tags: f64,
    pub variables: f64,
    /// Part of the field scores above that came from typo-tolerant matches
    pub fuzzy: f64,
    pub popularity: f64,
}

impl ScoreBreakdown {
    /// Sum of textual and tag contributions, without popularity
    pub fn textual(&self) -> f64 {
        self.title_exact + self.title + self.body + self.tags + self.variables
    }

    pub fn total(&self) -> f64 {
        self.textual() + self.popularity
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub template: Template,
    /// 0.0 on the browse path
    pub score: f64,
    pub breakdown: Option<ScoreBreakdown>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub items: Vec<ScoredItem>,
    pub next_cursor: Option<String>,
    /// Matches before pagination
    pub total_matches: usize,
}
