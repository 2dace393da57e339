//! Catalog consolidation for bulk imports.
//!
//! Seed catalogs are assembled from several exports and routinely contain the
//! same template more than once. Consolidation keeps one record per title,
//! preferring the most-used copy, and reports what it folded away.

use std::collections::HashMap;

use serde::Serialize;

use super::types::Template;

/// Number of leading body characters compared when looking for content duplicates
const CONTENT_KEY_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateTitle {
    pub title: String,
    /// Input positions of the first occurrence and the duplicate
    pub indices: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateContent {
    pub first_title: String,
    pub second_title: String,
    pub indices: (usize, usize),
}

#[derive(Debug, Default, Serialize)]
pub struct ConsolidationReport {
    /// Unique templates sorted by (category, title)
    pub templates: Vec<Template>,
    pub total_processed: usize,
    pub duplicate_titles: Vec<DuplicateTitle>,
    pub duplicate_content: Vec<DuplicateContent>,
}

/// Collapse templates sharing a title into the copy with the highest
/// `view_count + use_count` (first one wins ties).
pub fn consolidate(templates: Vec<Template>) -> ConsolidationReport {
    let total_processed = templates.len();
    let mut duplicate_titles = Vec::new();
    let mut duplicate_content = Vec::new();

    let mut first_by_title: HashMap<String, usize> = HashMap::new();
    let mut first_by_content: HashMap<String, usize> = HashMap::new();

    for (i, template) in templates.iter().enumerate() {
        let title = template.title.trim().to_string();
        match first_by_title.get(&title) {
            Some(&first) => duplicate_titles.push(DuplicateTitle {
                title: title.clone(),
                indices: (first, i),
            }),
            None => {
                first_by_title.insert(title, i);
            }
        }

        let content_key: String = template.body.trim().chars().take(CONTENT_KEY_LEN).collect();
        match first_by_content.get(&content_key) {
            Some(&first) => duplicate_content.push(DuplicateContent {
                first_title: templates[first].title.clone(),
                second_title: template.title.clone(),
                indices: (first, i),
            }),
            None => {
                first_by_content.insert(content_key, i);
            }
        }
    }

    // Pick the best copy per title, remembering where each title first appeared
    let mut best: HashMap<String, usize> = HashMap::new();
    for (i, template) in templates.iter().enumerate() {
        let title = template.title.trim().to_string();
        let popularity = template.view_count + template.use_count;
        best.entry(title)
            .and_modify(|current| {
                let existing = &templates[*current];
                if popularity > existing.view_count + existing.use_count {
                    *current = i;
                }
            })
            .or_insert(i);
    }

    let mut keep: Vec<usize> = best.into_values().collect();
    keep.sort_unstable();

    let mut slots: Vec<Option<Template>> = templates.into_iter().map(Some).collect();
    let mut unique: Vec<Template> = keep
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect();

    unique.sort_by(|a, b| {
        let a_category = a.category.as_deref().unwrap_or("");
        let b_category = b.category.as_deref().unwrap_or("");
        a_category
            .cmp(b_category)
            .then_with(|| a.title.cmp(&b.title))
    });

    tracing::info!(
        total = total_processed,
        unique = unique.len(),
        duplicate_titles = duplicate_titles.len(),
        duplicate_content = duplicate_content.len(),
        "Template catalog consolidated"
    );

    ConsolidationReport {
        templates: unique,
        total_processed,
        duplicate_titles,
        duplicate_content,
    }
}
