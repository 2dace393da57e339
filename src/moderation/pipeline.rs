//! Classify-then-commit for one piece of content

use serde::Serialize;

use super::engine::ModerationEngine;
use super::writer::{CommitOutcome, ModerationWriter};
use crate::template::ModerationStatus;

/// Content forwarded by the dispatcher for moderation
#[derive(Debug, Clone)]
pub struct ModerationCandidate {
    pub id: String,
    pub title: String,
    pub body: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub status: ModerationStatus,
    pub commit: CommitOutcome,
}

pub struct ModerationPipeline {
    engine: ModerationEngine,
    writer: ModerationWriter,
}

impl ModerationPipeline {
    pub fn new(engine: ModerationEngine, writer: ModerationWriter) -> Self {
        Self { engine, writer }
    }

    pub fn engine(&self) -> &ModerationEngine {
        &self.engine
    }

    pub async fn run(&self, candidate: &ModerationCandidate) -> PipelineOutcome {
        let decision = self
            .engine
            .moderate(
                &candidate.id,
                &candidate.title,
                &candidate.body,
                &candidate.fingerprint,
            )
            .await;

        let commit = self
            .writer
            .commit(&candidate.id, &candidate.fingerprint, &decision)
            .await;

        PipelineOutcome {
            status: decision.status,
            commit,
        }
    }
}
