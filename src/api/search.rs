//! Template search endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search::{ScoredItem, SearchQuery, SortOrder};
use crate::server::AppState;
use crate::template::Visibility;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub sort: Option<SortOrder>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl From<SearchParams> for SearchQuery {
    fn from(params: SearchParams) -> Self {
        SearchQuery {
            query: params.q.unwrap_or_default(),
            tag: params.tag,
            owner: params.owner.filter(|o| !o.is_empty()),
            visibility: params.visibility.unwrap_or_default(),
            sort: params.sort.unwrap_or_default(),
            cursor: params.cursor.filter(|c| !c.is_empty()),
            limit: params.limit,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub tags: Vec<String>,
    pub variables: Vec<String>,
    pub use_count: u64,
    pub view_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl From<ScoredItem> for SearchItem {
    fn from(item: ScoredItem) -> Self {
        let score = item.breakdown.map(|_| item.score);
        let preview = item.template.preview();
        let t = item.template;
        SearchItem {
            id: t.id,
            title: t.title,
            preview,
            tags: t.tags,
            variables: t.variables,
            use_count: t.use_count,
            view_count: t.view_count,
            score,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub items: Vec<SearchItem>,
    /// Items on this page
    pub count: usize,
    /// Matches across all pages
    pub total_matches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// GET /api/v1/templates/search
#[tracing::instrument(
    name = "http.search_templates",
    skip(state, params),
    fields(q = params.q.as_deref().unwrap_or(""))
)]
pub async fn search_templates(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let query = SearchQuery::from(params);
    let page = state.search.search(&query).await?;

    let items: Vec<SearchItem> = page.items.into_iter().map(SearchItem::from).collect();

    Ok(Json(SearchResponse {
        count: items.len(),
        items,
        total_matches: page.total_matches,
        next_cursor: page.next_cursor,
    }))
}
