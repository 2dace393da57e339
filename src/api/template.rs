//! Template CRUD and usage tracking endpoints.
//!
//! Every write lands in the content store and reaches moderation through the
//! change feed; handlers never call the moderation pipeline directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::template::{CreateTemplateRequest, Template, UpdateTemplateRequest};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub id: String,
    pub use_count: u64,
    pub view_count: u64,
}

impl From<Template> for UsageResponse {
    fn from(t: Template) -> Self {
        Self {
            id: t.id,
            use_count: t.use_count,
            view_count: t.view_count,
        }
    }
}

/// POST /api/v1/templates - Create a new template
#[tracing::instrument(
    name = "http.create_template",
    skip(state, request),
    fields(template_id = request.id.as_deref().unwrap_or(""))
)]
pub async fn create_template(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>)> {
    let template: Template = request.into();
    let created = state.store.put(template).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/templates/{id} - Get a specific template
#[tracing::instrument(name = "http.get_template", skip(state))]
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Template>> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Template {}", id)))
}

/// PUT /api/v1/templates/{id} - Author edit
#[tracing::instrument(name = "http.update_template", skip(state, request))]
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<Template>> {
    let updated = state.store.update_content(&id, request).await?;
    Ok(Json(updated))
}

/// DELETE /api/v1/templates/{id} - Delete a template
#[tracing::instrument(name = "http.delete_template", skip(state))]
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/templates/{id}/use
#[tracing::instrument(name = "http.record_use", skip(state))]
pub async fn record_use(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UsageResponse>> {
    let template = state.store.record_use(&id).await?;
    Ok(Json(template.into()))
}

/// POST /api/v1/templates/{id}/view
#[tracing::instrument(name = "http.record_view", skip(state))]
pub async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UsageResponse>> {
    let template = state.store.record_view(&id).await?;
    Ok(Json(template.into()))
}
