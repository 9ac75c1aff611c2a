//! Newest-first change log with coalescing and single-step revert.

use crate::model::{FeedbackId, FeedbackState};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// Old/new values keyed by change type. Only `Grade` and `Feedback` carry
/// student state that can be restored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeKind {
    #[serde(rename_all = "camelCase")]
    Grade { old_value: String, new_value: String },
    #[serde(rename_all = "camelCase")]
    Feedback {
        old_value: FeedbackState,
        new_value: FeedbackState,
        /// Comment each id in `old_value` pointed at when recorded.
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        applied_comments: BTreeMap<FeedbackId, String>,
    },
    Import,
    Reorder,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Grade { .. } => "grade",
            ChangeKind::Feedback { .. } => "feedback",
            ChangeKind::Import => "import",
            ChangeKind::Reorder => "reorder",
        }
    }

    pub fn is_revertible(&self) -> bool {
        matches!(self, ChangeKind::Grade { .. } | ChangeKind::Feedback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub student_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ChangeRecord {
    pub fn new(kind: ChangeKind, student_name: impl Into<String>, message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            student_name: student_name.into(),
            timestamp: Utc::now(),
            message,
        }
    }

    pub fn grade(student: &str, old: &str, new: &str) -> Self {
        let message = format!("{student}: {} → {new} points", or_zero(old));
        Self::new(
            ChangeKind::Grade {
                old_value: old.to_string(),
                new_value: new.to_string(),
            },
            student,
            Some(message),
        )
    }

    pub fn feedback(
        student: &str,
        old: FeedbackState,
        new: FeedbackState,
        applied_comments: BTreeMap<FeedbackId, String>,
    ) -> Self {
        let message = format!("{student}: {} → {} points", or_zero(&old.grade), new.grade);
        Self::new(
            ChangeKind::Feedback {
                old_value: old,
                new_value: new,
                applied_comments,
            },
            student,
            Some(message),
        )
    }
}

fn or_zero(grade: &str) -> &str {
    if grade.is_empty() {
        "0"
    } else {
        grade
    }
}

#[derive(Debug, Clone)]
pub struct ChangeHistory {
    entries: VecDeque<ChangeRecord>,
    max_entries: usize,
    coalesce_window: Duration,
}

impl Default for ChangeHistory {
    fn default() -> Self {
        Self::new(50, Duration::milliseconds(1000))
    }
}

impl ChangeHistory {
    pub fn new(max_entries: usize, coalesce_window: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            coalesce_window,
        }
    }

    /// Prepends `change` stamped with `now`, unless the newest entry is for
    /// the same student and type and younger than the coalesce window.
    /// Returns whether the change was kept.
    pub fn record(&mut self, mut change: ChangeRecord, now: DateTime<Utc>) -> bool {
        if let Some(latest) = self.entries.front() {
            if latest.student_name == change.student_name
                && latest.kind.label() == change.kind.label()
                && now - latest.timestamp < self.coalesce_window
            {
                return false;
            }
        }
        change.timestamp = now;
        self.entries.push_front(change);
        self.entries.truncate(self.max_entries);
        true
    }

    pub fn list(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: Uuid) -> Option<&ChangeRecord> {
        self.entries.iter().find(|c| c.id == id)
    }

    /// Removes and returns the entry; a taken entry can't be reverted again.
    pub fn take(&mut self, id: Uuid) -> Option<ChangeRecord> {
        let pos = self.entries.iter().position(|c| c.id == id)?;
        self.entries.remove(pos)
    }
}
