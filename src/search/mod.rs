//! Relevance search over public and owned templates.
//!
//! - `tokenizer`: query and field tokenization
//! - `fuzzy`: typo-tolerant term matching
//! - `scorer`: per-template relevance scores
//! - `cursor`: opaque pagination cursors
//! - `engine`: filtering, ranking and paging
//! - `service`: store-backed search entry point

mod cursor;
mod engine;
mod fuzzy;
mod scorer;
mod service;
mod tokenizer;
mod types;

pub use cursor::{CursorError, PageCursor, RankKey};
pub use engine::SearchEngine;
pub use fuzzy::fuzzy_match;
pub use scorer::{RelevanceScorer, ScoringWeights};
pub use service::SearchService;
pub use tokenizer::{tokenize, words};
pub use types::{ScoreBreakdown, ScoredItem, SearchError, SearchPage, SearchQuery, SortOrder};
