//! Startup import of a template catalog.

use super::backend::{ContentStore, StoreError};
use crate::template::{consolidate, Template};

/// Deduplicate `templates` and put each one, skipping ids already present.
///
/// Returns the number of templates created. Records are normalized by the
/// store on the way in, so seeded tags and variables match created ones.
pub async fn import_templates(store: &dyn ContentStore, templates: Vec<Template>) -> usize {
    let report = consolidate(templates);
    if !report.duplicate_titles.is_empty() || !report.duplicate_content.is_empty() {
        tracing::warn!(
            processed = report.total_processed,
            duplicate_titles = report.duplicate_titles.len(),
            duplicate_content = report.duplicate_content.len(),
            "Seed catalog contains duplicates"
        );
    }

    let mut imported = 0;
    for template in report.templates {
        let id = template.id.clone();
        match store.put(template).await {
            Ok(_) => imported += 1,
            Err(StoreError::AlreadyExists(_)) => {
                tracing::debug!(id = %id, "Seed template already present");
            }
            Err(e) => tracing::warn!(id = %id, error = %e, "Skipping seed template"),
        }
    }

    imported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryContentStore;

    fn seeded(id: &str, title: &str) -> Template {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "body": "Hello [[name]]",
            "tags": ["Sales"],
            "authorId": "author-1"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_import_normalizes_and_skips_existing() {
        let store = MemoryContentStore::new();
        store.put(seeded("existing", "Existing")).await.unwrap();

        let imported = import_templates(
            &store,
            vec![seeded("existing", "Existing again"), seeded("fresh", "Fresh")],
        )
        .await;

        assert_eq!(imported, 1);
        let fresh = store.get("fresh").await.unwrap().unwrap();
        assert_eq!(fresh.tags, vec!["sales"]);
        assert_eq!(fresh.variables, vec!["name"]);
    }
}
