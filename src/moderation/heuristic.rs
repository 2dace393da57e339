//! Built-in heuristic analyzer.
//!
//! Used when no external analyzer is configured. It cannot detect toxicity or
//! personal information, so it never reports anything that leads to a
//! rejection; at most it flags text for manual review.

use std::collections::HashSet;

use async_trait::async_trait;

use super::analyzer::{AnalyzerError, TextAnalyzer};
use super::types::AnalysisReport;

const MIN_LENGTH_FOR_CAPS_CHECK: usize = 20;
const MAX_UPPERCASE_RATIO: f64 = 0.7;
const MIN_WORDS_FOR_REPETITION_CHECK: usize = 10;
const MIN_UNIQUE_WORD_RATIO: f64 = 0.3;

pub const FLAG_EXCESSIVE_CAPS: &str = "excessive capitalization";
pub const FLAG_EXCESSIVE_REPETITION: &str = "excessive repetition";

#[derive(Debug, Default, Clone)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Run the checks synchronously
    pub fn inspect(text: &str) -> AnalysisReport {
        let mut flags = Vec::new();

        if text.chars().count() > MIN_LENGTH_FOR_CAPS_CHECK {
            let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
            if !letters.is_empty() {
                let upper = letters.iter().filter(|c| c.is_uppercase()).count();
                if upper as f64 / letters.len() as f64 > MAX_UPPERCASE_RATIO {
                    flags.push(FLAG_EXCESSIVE_CAPS.to_string());
                }
            }
        }

        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        if words.len() > MIN_WORDS_FOR_REPETITION_CHECK {
            let unique: HashSet<&String> = words.iter().collect();
            if (unique.len() as f64 / words.len() as f64) < MIN_UNIQUE_WORD_RATIO {
                flags.push(FLAG_EXCESSIVE_REPETITION.to_string());
            }
        }

        AnalysisReport {
            flags,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TextAnalyzer for HeuristicAnalyzer {
    fn method(&self) -> &'static str {
        "heuristic"
    }

    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalyzerError> {
        Ok(Self::inspect(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_has_no_flags() {
        let report = HeuristicAnalyzer::inspect("A friendly reminder about tomorrow's meeting agenda.");
        assert!(report.flags.is_empty());
        assert!(report.toxicity_labels.is_empty());
        assert!(report.sensitive_entities.is_empty());
    }

    #[test]
    fn test_shouting_is_flagged() {
        let report = HeuristicAnalyzer::inspect("BUY THIS AMAZING PRODUCT RIGHT NOW");
        assert_eq!(report.flags, vec![FLAG_EXCESSIVE_CAPS]);
    }

    #[test]
    fn test_short_caps_not_flagged() {
        let report = HeuristicAnalyzer::inspect("URGENT: READ");
        assert!(report.flags.is_empty());
    }

    #[test]
    fn test_repetition_is_flagged() {
        let text = "spam spam spam spam spam spam spam spam spam spam spam spam";
        let report = HeuristicAnalyzer::inspect(text);
        assert!(report.flags.contains(&FLAG_EXCESSIVE_REPETITION.to_string()));
    }

    #[test]
    fn test_few_words_not_checked_for_repetition() {
        let report = HeuristicAnalyzer::inspect("go go go go");
        assert!(report.flags.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_never_fails() {
        let analyzer = HeuristicAnalyzer::new();
        assert!(analyzer.analyze("").await.is_ok());
    }
}
