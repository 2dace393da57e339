//! HTTP-backed analyzer.
//!
//! Sends `{"text": ...}` to the configured endpoint and expects
//! `{toxicityLabels, sentiment, sensitiveEntities}` back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use super::analyzer::{AnalyzerError, TextAnalyzer};
use super::types::AnalysisReport;

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

pub struct RemoteAnalyzer {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteAnalyzer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextAnalyzer for RemoteAnalyzer {
    fn method(&self) -> &'static str {
        "remote"
    }

    #[tracing::instrument(name = "analyzer.remote", skip(self, text), fields(text_len = text.len()))]
    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalyzerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnalyzeRequest { text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AnalyzerError::Unavailable(e.to_string())
                } else {
                    AnalyzerError::Http(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AnalyzerError::Unavailable(format!("analyzer returned {}", status)));
        }
        if !status.is_success() {
            return Err(AnalyzerError::InvalidResponse(format!(
                "analyzer returned {}",
                status
            )));
        }

        let report: AnalysisReport = response
            .json()
            .await
            .map_err(|e| AnalyzerError::InvalidResponse(e.to_string()))?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape_parses() {
        let json = r#"{
            "toxicityLabels": [{"name": "INSULT", "score": 0.82}],
            "sentiment": {"label": "NEGATIVE", "negativeScore": 0.91},
            "sensitiveEntities": ["SSN"]
        }"#;

        let report: AnalysisReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.toxicity_labels[0].name, "INSULT");
        assert_eq!(report.sentiment.unwrap().negative_score, 0.91);
        assert_eq!(report.sensitive_entities, vec!["SSN"]);
        assert!(report.flags.is_empty());
    }

    #[test]
    fn test_partial_response_parses() {
        let report: AnalysisReport = serde_json::from_str("{}").unwrap();
        assert!(report.toxicity_labels.is_empty());
        assert!(report.sentiment.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let analyzer =
            RemoteAnalyzer::new("http://127.0.0.1:1/analyze", Duration::from_millis(200)).unwrap();
        assert!(analyzer.analyze("hello").await.is_err());
    }
}
