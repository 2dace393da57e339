//! Per-batch processing report

use serde::Serialize;

use crate::moderation::CommitOutcome;
use crate::template::ModerationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Removed,
    NotPublic,
}

/// What happened to one event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum EventDisposition {
    Ignored { reason: IgnoreReason },
    Malformed { error: String },
    /// Content already moderated with a terminal status
    SkippedUnchanged,
    /// The event is the echo of a moderation write
    SkippedSelfWrite,
    Processed {
        status: ModerationStatus,
        commit: CommitOutcome,
    },
    Failed { error: String },
    /// Not started because shutdown was requested
    Aborted,
}

impl EventDisposition {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            EventDisposition::Ignored { .. } => "ignored",
            EventDisposition::Malformed { .. } => "malformed",
            EventDisposition::SkippedUnchanged => "skipped_unchanged",
            EventDisposition::SkippedSelfWrite => "skipped_self_write",
            EventDisposition::Processed { commit, .. } if !commit.is_settled() => "failed",
            EventDisposition::Processed { .. } => "processed",
            EventDisposition::Failed { .. } => "failed",
            EventDisposition::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventOutcome {
    /// Position of the event in the batch
    pub index: usize,
    pub id: Option<String>,
    #[serde(flatten)]
    pub disposition: EventDisposition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub received: usize,
    pub ignored: usize,
    pub malformed: usize,
    pub skipped_unchanged: usize,
    pub skipped_self_write: usize,
    /// Events that went through the moderation engine
    pub processed: usize,
    pub applied: usize,
    pub already_applied: usize,
    pub superseded: usize,
    pub not_found: usize,
    pub failed: usize,
    pub aborted: usize,
    /// Shutdown was requested while the batch was being dispatched
    pub interrupted: bool,
    /// Outcomes in batch order
    pub outcomes: Vec<EventOutcome>,
}

impl ProcessingReport {
    pub fn new(received: usize) -> Self {
        Self {
            received,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: EventOutcome) {
        match &outcome.disposition {
            EventDisposition::Ignored { .. } => self.ignored += 1,
            EventDisposition::Malformed { .. } => self.malformed += 1,
            EventDisposition::SkippedUnchanged => self.skipped_unchanged += 1,
            EventDisposition::SkippedSelfWrite => self.skipped_self_write += 1,
            EventDisposition::Processed { commit, .. } => {
                self.processed += 1;
                match commit {
                    CommitOutcome::Applied => self.applied += 1,
                    CommitOutcome::AlreadyApplied => self.already_applied += 1,
                    CommitOutcome::Superseded => self.superseded += 1,
                    CommitOutcome::NotFound => self.not_found += 1,
                    CommitOutcome::ConflictRetryable(_) | CommitOutcome::Failed(_) => {
                        self.failed += 1
                    }
                }
            }
            EventDisposition::Failed { .. } => self.failed += 1,
            EventDisposition::Aborted => self.aborted += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Outcome for the event at `index`
    pub fn outcome(&self, index: usize) -> Option<&EventOutcome> {
        self.outcomes.iter().find(|o| o.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, disposition: EventDisposition) -> EventOutcome {
        EventOutcome {
            index,
            id: Some(format!("t{}", index)),
            disposition,
        }
    }

    #[test]
    fn test_record_counts() {
        let mut report = ProcessingReport::new(5);
        report.record(outcome(
            0,
            EventDisposition::Ignored {
                reason: IgnoreReason::Removed,
            },
        ));
        report.record(outcome(1, EventDisposition::SkippedSelfWrite));
        report.record(outcome(
            2,
            EventDisposition::Processed {
                status: ModerationStatus::Approved,
                commit: CommitOutcome::Applied,
            },
        ));
        report.record(outcome(
            3,
            EventDisposition::Processed {
                status: ModerationStatus::Review,
                commit: CommitOutcome::ConflictRetryable("throttled".to_string()),
            },
        ));
        report.record(outcome(
            4,
            EventDisposition::Failed {
                error: "panicked".to_string(),
            },
        ));

        assert_eq!(report.ignored, 1);
        assert_eq!(report.skipped_self_write, 1);
        assert_eq!(report.processed, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.outcome(3).unwrap().disposition.label(), "failed");
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let json = serde_json::to_value(outcome(0, EventDisposition::SkippedUnchanged)).unwrap();
        assert_eq!(json["disposition"], "skipped_unchanged");
        assert_eq!(json["id"], "t0");
    }
}
