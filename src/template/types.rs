//! Template types and error definitions

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::fingerprint::content_fingerprint;
use super::markup::{extract_variables, strip_markup};
use crate::moderation::ModerationDetails;

const MAX_ID_LEN: usize = 64;
const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 50_000;
const MAX_TAGS: usize = 20;
const MAX_TAG_LEN: usize = 50;
const PREVIEW_LEN: usize = 200;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid template ID: {0}")]
    InvalidId(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// Moderation lifecycle of a template's current content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Review,
}

impl ModerationStatus {
    /// Terminal for the fingerprint it was decided on
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ModerationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Review => "review",
        }
    }
}

/// A shareable prompt template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Unique template identifier (alphanumeric, dash, underscore)
    pub id: String,

    pub title: String,

    /// Template text, may contain HTML markup
    pub body: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Placeholder names in order of first appearance
    #[serde(default)]
    pub variables: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub visibility: Visibility,

    #[serde(default)]
    pub moderation_status: ModerationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderation_details: Option<ModerationDetails>,

    /// Fingerprint of the content the current moderation status was decided on.
    /// Cleared whenever the title or body changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_fingerprint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub use_count: u64,

    #[serde(default)]
    pub view_count: u64,

    pub author_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Bring externally supplied records (seed files, direct puts) to the
    /// shape the create request produces: trimmed title, normalized tags and
    /// variables extracted from the body when none were given.
    pub fn normalize(&mut self) {
        let title = self.title.trim();
        if title.len() != self.title.len() {
            self.title = title.to_string();
        }
        self.tags = normalize_tags(&self.tags);
        if self.variables.is_empty() {
            self.variables = extract_variables(&self.body);
        }
    }

    /// Validate the template
    pub fn validate(&self) -> TemplateResult<()> {
        if self.id.is_empty() || self.id.len() > MAX_ID_LEN {
            return Err(TemplateError::InvalidId(format!(
                "ID must be 1-{} characters",
                MAX_ID_LEN
            )));
        }

        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TemplateError::InvalidId(
                "ID must contain only alphanumeric, dash, or underscore".to_string(),
            ));
        }

        let title_len = self.title.trim().chars().count();
        if title_len == 0 || title_len > MAX_TITLE_LEN {
            return Err(TemplateError::InvalidTemplate(format!(
                "Title must be 1-{} characters",
                MAX_TITLE_LEN
            )));
        }

        let body_len = self.body.trim().chars().count();
        if body_len == 0 || body_len > MAX_BODY_LEN {
            return Err(TemplateError::InvalidTemplate(format!(
                "Body must be 1-{} characters",
                MAX_BODY_LEN
            )));
        }

        if self.tags.len() > MAX_TAGS {
            return Err(TemplateError::InvalidTemplate(format!(
                "At most {} tags are allowed",
                MAX_TAGS
            )));
        }

        if let Some(tag) = self
            .tags
            .iter()
            .find(|t| t.is_empty() || t.chars().count() > MAX_TAG_LEN)
        {
            return Err(TemplateError::InvalidTemplate(format!(
                "Invalid tag '{}': tags must be 1-{} characters",
                tag, MAX_TAG_LEN
            )));
        }

        if self.author_id.trim().is_empty() {
            return Err(TemplateError::InvalidTemplate(
                "Author is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Fingerprint of the current title and body
    pub fn fingerprint(&self) -> String {
        content_fingerprint(&self.title, &self.body)
    }

    /// Plain-text excerpt of the body
    pub fn preview(&self) -> String {
        let text = strip_markup(&self.body);
        if text.chars().count() <= PREVIEW_LEN {
            return text;
        }
        let mut preview: String = text.chars().take(PREVIEW_LEN).collect();
        preview.push_str("...");
        preview
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// Lowercase, trim and de-duplicate tags, keeping first-seen order
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Request to create a new template
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,

    pub title: String,

    pub body: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Extracted from `[[name]]` placeholders when absent
    #[serde(default)]
    pub variables: Option<Vec<String>>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub visibility: Visibility,

    pub author_id: String,

    #[serde(default)]
    pub author_email: Option<String>,
}

impl From<CreateTemplateRequest> for Template {
    fn from(req: CreateTemplateRequest) -> Self {
        let now = Utc::now();
        let variables = req
            .variables
            .unwrap_or_else(|| extract_variables(&req.body));
        Template {
            id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            title: req.title.trim().to_string(),
            body: req.body,
            tags: normalize_tags(&req.tags),
            variables,
            category: req.category,
            visibility: req.visibility,
            moderation_status: ModerationStatus::Pending,
            moderation_details: None,
            content_fingerprint: None,
            moderated_at: None,
            use_count: 0,
            view_count: 0,
            author_id: req.author_id,
            author_email: req.author_email,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to update an existing template (author edit)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    pub title: Option<String>,

    pub body: Option<String>,

    pub tags: Option<Vec<String>>,

    pub variables: Option<Vec<String>>,

    /// Use null to clear
    pub category: Option<Option<String>>,

    pub visibility: Option<Visibility>,
}

impl UpdateTemplateRequest {
    /// Apply the edit to a template in place.
    ///
    /// Returns true when the title or body changed, in which case the
    /// template goes back to `Pending` and its recorded fingerprint is cleared.
    pub fn apply_to(self, template: &mut Template) -> bool {
        let mut content_changed = false;

        if let Some(title) = self.title {
            let title = title.trim().to_string();
            if title != template.title {
                template.title = title;
                content_changed = true;
            }
        }

        if let Some(body) = self.body {
            if body != template.body {
                if self.variables.is_none() {
                    template.variables = extract_variables(&body);
                }
                template.body = body;
                content_changed = true;
            }
        }

        if let Some(tags) = self.tags {
            template.tags = normalize_tags(&tags);
        }

        if let Some(variables) = self.variables {
            template.variables = variables;
        }

        if let Some(category) = self.category {
            template.category = category;
        }

        if let Some(visibility) = self.visibility {
            template.visibility = visibility;
        }

        if content_changed {
            template.moderation_status = ModerationStatus::Pending;
            template.content_fingerprint = None;
        }

        template.updated_at = Utc::now();
        content_changed
    }
}

/// Response for listing templates
#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, body: &str) -> CreateTemplateRequest {
        CreateTemplateRequest {
            id: Some("tpl-1".to_string()),
            title: title.to_string(),
            body: body.to_string(),
            tags: vec![" Email ".to_string(), "email".to_string(), "Sales".to_string()],
            variables: None,
            category: None,
            visibility: Visibility::Public,
            author_id: "author-1".to_string(),
            author_email: None,
        }
    }

    #[test]
    fn test_create_request_normalizes() {
        let template: Template = request("  Cold Outreach ", "Hi [[name]], about [[company]]").into();

        assert_eq!(template.title, "Cold Outreach");
        assert_eq!(template.tags, vec!["email", "sales"]);
        assert_eq!(template.variables, vec!["name", "company"]);
        assert_eq!(template.moderation_status, ModerationStatus::Pending);
        assert!(template.content_fingerprint.is_none());
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_normalize_deserialized_record() {
        let mut template: Template = serde_json::from_value(serde_json::json!({
            "id": "seeded",
            "title": " Follow Up ",
            "body": "Hi [[name]]",
            "tags": ["Sales", " sales", "Q4 "],
            "authorId": "author-1"
        }))
        .unwrap();

        template.normalize();

        assert_eq!(template.title, "Follow Up");
        assert_eq!(template.tags, vec!["sales", "q4"]);
        assert_eq!(template.variables, vec!["name"]);
    }

    #[test]
    fn test_validation_invalid_id_chars() {
        let mut template: Template = request("Title", "Body").into();
        template.id = "invalid/id".to_string();

        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidId(_))
        ));
    }

    #[test]
    fn test_validation_empty_title() {
        let template: Template = request("   ", "Body").into();

        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_validation_too_many_tags() {
        let mut template: Template = request("Title", "Body").into();
        template.tags = (0..25).map(|i| format!("tag{}", i)).collect();

        assert!(template.validate().is_err());
    }

    #[test]
    fn test_update_content_resets_moderation() {
        let mut template: Template = request("Title", "Body").into();
        template.moderation_status = ModerationStatus::Approved;
        template.content_fingerprint = Some(template.fingerprint());

        let changed = UpdateTemplateRequest {
            body: Some("New body with [[topic]]".to_string()),
            ..Default::default()
        }
        .apply_to(&mut template);

        assert!(changed);
        assert_eq!(template.moderation_status, ModerationStatus::Pending);
        assert!(template.content_fingerprint.is_none());
        assert_eq!(template.variables, vec!["topic"]);
    }

    #[test]
    fn test_update_tags_keeps_moderation() {
        let mut template: Template = request("Title", "Body").into();
        template.moderation_status = ModerationStatus::Approved;
        let fingerprint = template.fingerprint();
        template.content_fingerprint = Some(fingerprint.clone());

        let changed = UpdateTemplateRequest {
            tags: Some(vec!["New".to_string()]),
            title: Some("Title".to_string()),
            ..Default::default()
        }
        .apply_to(&mut template);

        assert!(!changed);
        assert_eq!(template.moderation_status, ModerationStatus::Approved);
        assert_eq!(template.content_fingerprint, Some(fingerprint));
        assert_eq!(template.tags, vec!["new"]);
    }

    #[test]
    fn test_preview_strips_markup_and_truncates() {
        let mut template: Template = request("Title", "<p>Hello <b>world</b></p>").into();
        assert_eq!(template.preview(), "Hello world");

        template.body = "a".repeat(300);
        let preview = template.preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!ModerationStatus::Pending.is_terminal());
        assert!(ModerationStatus::Approved.is_terminal());
        assert!(ModerationStatus::Rejected.is_terminal());
        assert!(ModerationStatus::Review.is_terminal());
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let template: Template = request("Title", "Body").into();
        let json = serde_json::to_value(&template).unwrap();

        assert_eq!(json["moderationStatus"], "pending");
        assert_eq!(json["visibility"], "public");
        assert!(json.get("contentFingerprint").is_none());
        assert_eq!(json["useCount"], 0);
    }
}
