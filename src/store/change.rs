//! Change events emitted by content store mutations

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::template::Template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Modify => "modify",
            ChangeKind::Remove => "remove",
        }
    }
}

/// One mutation of a template.
///
/// Delivered at least once; ordered per template id but not across ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Template>,

    /// Absent for removals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Template>,
}

impl ChangeEvent {
    pub fn insert(after: Template) -> Self {
        Self {
            kind: ChangeKind::Insert,
            before: None,
            after: Some(after),
        }
    }

    pub fn modify(before: Template, after: Template) -> Self {
        Self {
            kind: ChangeKind::Modify,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn remove(before: Template) -> Self {
        Self {
            kind: ChangeKind::Remove,
            before: Some(before),
            after: None,
        }
    }

    /// Id of the template the event is about
    pub fn template_id(&self) -> Option<&str> {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(|t| t.id.as_str())
    }
}

/// Stream of change events from a store subscription
pub type ChangeFeed = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;
