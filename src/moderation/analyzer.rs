//! Text analyzer capability.
//!
//! Moderation delegates classification to a swappable analyzer:
//!
//! - `HeuristicAnalyzer`: built-in, offline; can only ask for review
//! - `RemoteAnalyzer`: HTTP-backed toxicity/sentiment/PII service
//!
//! Use `create_analyzer()` to pick one from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::heuristic::HeuristicAnalyzer;
use super::remote::RemoteAnalyzer;
use super::types::AnalysisReport;
use crate::config::ModerationConfig;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Analyzer timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid analyzer response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AnalyzerError {
    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzerError::Timeout(_) => "timeout",
            AnalyzerError::Unavailable(_) => "unavailable",
            AnalyzerError::InvalidResponse(_) => "invalid_response",
            AnalyzerError::Http(_) => "http",
        }
    }

    /// Worth another call after backing off
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyzerError::Timeout(_) | AnalyzerError::Unavailable(_))
    }
}

/// Classifies text for moderation.
///
/// Implementations must be thread-safe; one instance is shared by every
/// dispatcher worker.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Name recorded in `ModerationDetails::method`
    fn method(&self) -> &'static str;

    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalyzerError>;
}

/// Create the analyzer named by `settings.analyzer`.
///
/// Falls back to the heuristic analyzer when "remote" is requested without
/// an endpoint or the HTTP client cannot be built.
pub fn create_analyzer(settings: &ModerationConfig) -> Arc<dyn TextAnalyzer> {
    match settings.analyzer.as_str() {
        "remote" => match settings.analyzer_endpoint.as_deref() {
            Some(endpoint) => {
                match RemoteAnalyzer::new(endpoint, Duration::from_millis(settings.analyzer_timeout_ms)) {
                    Ok(analyzer) => {
                        tracing::info!(analyzer = "remote", endpoint = %endpoint, "Creating remote analyzer");
                        Arc::new(analyzer)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to build remote analyzer, falling back to heuristic");
                        Arc::new(HeuristicAnalyzer::new())
                    }
                }
            }
            None => {
                tracing::warn!("Remote analyzer requested but no endpoint configured, falling back to heuristic");
                Arc::new(HeuristicAnalyzer::new())
            }
        },
        _ => {
            tracing::info!(analyzer = "heuristic", "Creating heuristic analyzer");
            Arc::new(HeuristicAnalyzer::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_defaults_to_heuristic() {
        let analyzer = create_analyzer(&ModerationConfig::default());
        assert_eq!(analyzer.method(), "heuristic");
    }

    #[test]
    fn test_factory_remote_without_endpoint_falls_back() {
        let config = ModerationConfig {
            analyzer: "remote".to_string(),
            analyzer_endpoint: None,
            ..Default::default()
        };
        assert_eq!(create_analyzer(&config).method(), "heuristic");
    }

    #[test]
    fn test_factory_remote_with_endpoint() {
        let config = ModerationConfig {
            analyzer: "remote".to_string(),
            analyzer_endpoint: Some("http://localhost:9999/analyze".to_string()),
            ..Default::default()
        };
        assert_eq!(create_analyzer(&config).method(), "remote");
    }
}
