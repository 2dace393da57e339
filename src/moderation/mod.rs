//! Content moderation.
//!
//! This module provides:
//! - The `TextAnalyzer` capability with heuristic and remote implementations
//! - `ModerationEngine`: text preparation, timeout-bounded analysis and the
//!   decision policy (fails safe toward `Review`)
//! - `ModerationWriter`: fingerprint-conditioned write-back with retries
//! - `ModerationPipeline`: engine followed by writer

mod analyzer;
mod engine;
mod heuristic;
mod pipeline;
mod remote;
mod types;
mod writer;

pub use analyzer::{create_analyzer, AnalyzerError, TextAnalyzer};
pub use engine::{
    DecisionPolicy, ModerationEngine, REASON_ANALYZER_FAILURE, REASON_HIGH_TOXICITY,
    REASON_MANUAL_REVIEW, REASON_SENSITIVE_INFO,
};
pub use heuristic::HeuristicAnalyzer;
pub use pipeline::{ModerationCandidate, ModerationPipeline, PipelineOutcome};
pub use remote::RemoteAnalyzer;
pub use types::{
    AnalysisReport, ModerationDecision, ModerationDetails, Sentiment, ToxicityLabel,
    MODERATION_VERSION,
};
pub use writer::{CommitOutcome, ModerationWriter};
