//! Relevance scoring.
//!
//! Pure function of (query, template). Each query term contributes
//! independently per field; terms with no exact or substring hit anywhere
//! fall back to typo-tolerant matching at a reduced weight. Popularity is
//! only added on top of an existing textual match.

use std::cell::OnceCell;

use super::fuzzy::fuzzy_match;
use super::tokenizer::words;
use super::types::ScoreBreakdown;
use crate::config::SearchConfig;
use crate::template::{strip_markup, Template};

#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub title: f64,
    pub body: f64,
    pub tag: f64,
    pub variable: f64,
    pub fuzzy_factor: f64,
    pub max_edit_distance: usize,
    pub use_count_cap: u64,
    pub use_count_divisor: f64,
    pub view_count_cap: u64,
    pub view_count_divisor: f64,
}

impl From<&SearchConfig> for ScoringWeights {
    fn from(config: &SearchConfig) -> Self {
        Self {
            title: config.title_weight,
            body: config.body_weight,
            tag: config.tag_weight,
            variable: config.variable_weight,
            fuzzy_factor: config.fuzzy_factor,
            max_edit_distance: config.max_edit_distance,
            use_count_cap: config.use_count_cap,
            use_count_divisor: config.use_count_divisor,
            view_count_cap: config.view_count_cap,
            view_count_divisor: config.view_count_divisor,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

/// Lowercased searchable fields of one template
struct Fields {
    title: String,
    body: String,
    tags: Vec<String>,
    variables: Vec<String>,
    title_words: OnceCell<Vec<String>>,
    body_words: OnceCell<Vec<String>>,
    tag_words: OnceCell<Vec<String>>,
    variable_words: OnceCell<Vec<String>>,
}

impl Fields {
    fn new(template: &Template) -> Self {
        Self {
            title: template.title.to_lowercase(),
            body: strip_markup(&template.body).to_lowercase(),
            tags: template.tags.iter().map(|t| t.to_lowercase()).collect(),
            variables: template.variables.iter().map(|v| v.to_lowercase()).collect(),
            title_words: OnceCell::new(),
            body_words: OnceCell::new(),
            tag_words: OnceCell::new(),
            variable_words: OnceCell::new(),
        }
    }

    fn title_words(&self) -> &Vec<String> {
        self.title_words.get_or_init(|| words(&self.title))
    }

    fn body_words(&self) -> &Vec<String> {
        self.body_words.get_or_init(|| words(&self.body))
    }

    fn tag_words(&self) -> &Vec<String> {
        self.tag_words
            .get_or_init(|| self.tags.iter().flat_map(|t| words(t)).collect())
    }

    fn variable_words(&self) -> &Vec<String> {
        self.variable_words
            .get_or_init(|| self.variables.iter().flat_map(|v| words(v)).collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    weights: ScoringWeights,
}

impl RelevanceScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score `template` for `query`, already split into lowercase `terms`
    pub fn score(&self, query: &str, terms: &[String], template: &Template) -> ScoreBreakdown {
        let w = &self.weights;
        let fields = Fields::new(template);
        let mut breakdown = ScoreBreakdown::default();

        let normalized_query = normalize(query);
        if !normalized_query.is_empty() && normalize(&fields.title) == normalized_query {
            breakdown.title_exact += w.title;
        }

        for term in terms {
            let mut matched = false;

            if fields.title.contains(term.as_str()) {
                breakdown.title += w.title;
                matched = true;
            }
            if fields.body.contains(term.as_str()) {
                breakdown.body += w.body;
                matched = true;
            }
            if fields.tags.iter().any(|t| t.contains(term.as_str())) {
                breakdown.tags += w.tag;
                matched = true;
            }
            if fields.variables.iter().any(|v| v.contains(term.as_str())) {
                breakdown.variables += w.variable;
                matched = true;
            }

            if matched {
                continue;
            }

            let max = w.max_edit_distance;
            if fuzzy_match(term, fields.title_words(), max) {
                let s = w.title * w.fuzzy_factor;
                breakdown.title += s;
                breakdown.fuzzy += s;
            }
            if fuzzy_match(term, fields.body_words(), max) {
                let s = w.body * w.fuzzy_factor;
                breakdown.body += s;
                breakdown.fuzzy += s;
            }
            if fuzzy_match(term, fields.tag_words(), max) {
                let s = w.tag * w.fuzzy_factor;
                breakdown.tags += s;
                breakdown.fuzzy += s;
            }
            if fuzzy_match(term, fields.variable_words(), max) {
                let s = w.variable * w.fuzzy_factor;
                breakdown.variables += s;
                breakdown.fuzzy += s;
            }
        }

        if breakdown.textual() > 0.0 {
            breakdown.popularity = popularity(
                template.use_count,
                w.use_count_cap,
                w.use_count_divisor,
            ) + popularity(template.view_count, w.view_count_cap, w.view_count_divisor);
        }

        breakdown
    }
}

fn popularity(count: u64, cap: u64, divisor: f64) -> f64 {
    if divisor <= 0.0 {
        return 0.0;
    }
    count.min(cap) as f64 / divisor
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tokenize;
    use crate::template::{CreateTemplateRequest, Visibility};

    fn template(title: &str, body: &str, tags: &[&str], use_count: u64, view_count: u64) -> Template {
        let mut t: Template = CreateTemplateRequest {
            id: None,
            title: title.to_string(),
            body: body.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            variables: None,
            category: None,
            visibility: Visibility::Public,
            author_id: "author-1".to_string(),
            author_email: None,
        }
        .into();
        t.use_count = use_count;
        t.view_count = view_count;
        t
    }

    fn score(query: &str, t: &Template) -> ScoreBreakdown {
        RelevanceScorer::default().score(query, &tokenize(query), t)
    }

    #[test]
    fn test_exact_title_counts_twice() {
        let t = template("Cold Outreach", "Body", &[], 0, 0);
        let s = score("cold outreach", &t);

        assert_eq!(s.title_exact, 10.0);
        assert_eq!(s.title, 20.0);
        assert_eq!(s.total(), 30.0);
    }

    #[test]
    fn test_field_weights() {
        let t = template(
            "Newsletter",
            "<p>Quarterly <b>report</b> for [[company]]</p>",
            &["finance"],
            0,
            0,
        );

        assert_eq!(score("report", &t).body, 5.0);
        assert_eq!(score("finance", &t).tags, 8.0);
        assert_eq!(score("company", &t).variables, 3.0);
        // Markup is not searchable
        assert_eq!(score("b", &t).body, 0.0);
    }

    #[test]
    fn test_popularity_is_gated() {
        let t = template("Cold Outreach Email", "Hello", &["sales"], 500, 1000);
        let s = score("xyzxyz", &t);

        assert_eq!(s.popularity, 0.0);
        assert_eq!(s.total(), 0.0);
    }

    #[test]
    fn test_popularity_is_capped() {
        let t = template("Email", "Hello", &[], 500, 1000);
        let s = score("email", &t);

        assert_eq!(s.popularity, 5.0 + 2.0);
    }

    #[test]
    fn test_fuzzy_only_without_exact_hit() {
        let t = template("Email Campaign", "Launch plan", &[], 0, 0);

        let typo = score("emial", &t);
        assert!((typo.title - 7.0).abs() < 1e-9);
        assert!((typo.fuzzy - 7.0).abs() < 1e-9);

        let exact = score("email", &t);
        assert_eq!(exact.fuzzy, 0.0);
        assert_eq!(exact.title, 10.0);
    }

    #[test]
    fn test_terms_contribute_independently() {
        let t = template("Cold Outreach Email", "Reach out to leads", &["sales"], 0, 0);
        let s = score("email sales", &t);

        assert_eq!(s.title, 10.0);
        assert_eq!(s.tags, 8.0);
    }
}
