//! Template data model.
//!
//! This module provides:
//! - The `Template` record shared by the store, moderation and search
//! - Validation and author-edit semantics
//! - Content fingerprinting over `(title, body)`
//! - Markup stripping and `[[placeholder]]` extraction
//! - Catalog consolidation for bulk imports

mod consolidate;
mod fingerprint;
mod markup;
mod types;

pub use consolidate::{consolidate, ConsolidationReport, DuplicateContent, DuplicateTitle};
pub use fingerprint::content_fingerprint;
pub use markup::{extract_variables, strip_markup};
pub use types::{
    normalize_tags, CreateTemplateRequest, ModerationStatus, Template, TemplateError,
    TemplateListResponse, TemplateResult, UpdateTemplateRequest, Visibility,
};
