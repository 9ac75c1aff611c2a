use crate::commentary::Commentary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type FeedbackId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionFile {
    pub name: String,
    pub content: String,
}

/// One student's files pulled out of a submission archive, before matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionBundle {
    pub email: String,
    pub last_name: String,
    pub first_name: String,
    pub submission_date: String,
    pub files: Vec<SubmissionFile>,
}

/// The file sent for commentary: `main.py` if present, else the first file.
pub fn main_file(files: &[SubmissionFile]) -> Option<&SubmissionFile> {
    files
        .iter()
        .find(|f| f.name.to_lowercase().contains("main.py"))
        .or_else(|| files.first())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub id: FeedbackId,
    pub comment: String,
    /// Points deducted when applied.
    pub grade: f64,
}

/// The part of a roster record the feedback ledger owns. Change records
/// snapshot exactly this.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackState {
    pub grade: String,
    pub feedback: String,
    pub applied_ids: BTreeSet<FeedbackId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRecord {
    pub identifier: String,
    pub name: String,
    pub id_number: String,
    pub email: String,
    pub status: String,
    pub grade: String,
    pub max_grade: String,
    pub grade_can_be_changed: String,
    pub last_modified_submission: String,
    pub online_text: String,
    pub last_modified_grade: String,
    pub feedback: String,
    pub applied_ids: BTreeSet<FeedbackId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_files: Option<Vec<SubmissionFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<Commentary>,
}

impl RosterRecord {
    pub fn feedback_state(&self) -> FeedbackState {
        FeedbackState {
            grade: self.grade.clone(),
            feedback: self.feedback.clone(),
            applied_ids: self.applied_ids.clone(),
        }
    }

    pub fn restore_feedback_state(&mut self, state: &FeedbackState) {
        self.grade = state.grade.clone();
        self.feedback = state.feedback.clone();
        self.applied_ids = state.applied_ids.clone();
    }

    pub fn has_submission(&self) -> bool {
        self.submission_files
            .as_ref()
            .map(|f| !f.is_empty())
            .unwrap_or(false)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Formats points the way the grade column expects: `17`, `17.5`.
pub fn format_points(points: f64) -> String {
    if points.is_finite() && points.fract() == 0.0 {
        format!("{}", points as i64)
    } else {
        format!("{}", points)
    }
}
