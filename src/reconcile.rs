//! Attaches parsed submissions to roster records by email.

use crate::archive::ParsedSubmissions;
use crate::model::{normalize_email, RosterRecord};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPair {
    pub student: String,
    pub email: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedSubmission {
    pub email: String,
    pub name: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSubmission {
    pub email: String,
    pub date: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub matched_count: usize,
    pub matched: Vec<MatchedPair>,
    pub unmatched: Vec<UnmatchedSubmission>,
    pub duplicates: Vec<DuplicateSubmission>,
}

/// Exact match on trimmed, lowercased email. The first submission for an
/// address wins; later ones are listed as duplicates and never attached.
/// Records without a match keep whatever submission they already had.
pub fn reconcile(roster: &mut [RosterRecord], parsed: &ParsedSubmissions) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let mut first_by_email = HashMap::new();
    for (i, bundle) in parsed.students.iter().enumerate() {
        let key = normalize_email(&bundle.email);
        if first_by_email.contains_key(&key) {
            warn!(email = %bundle.email, "duplicate submission ignored");
            report.duplicates.push(DuplicateSubmission {
                email: bundle.email.clone(),
                date: bundle.submission_date.clone(),
            });
            continue;
        }
        first_by_email.insert(key, i);
    }

    let mut attached = HashSet::new();
    for record in roster.iter_mut() {
        let key = normalize_email(&record.email);
        if key.is_empty() {
            continue;
        }
        let Some(&i) = first_by_email.get(&key) else {
            continue;
        };
        let bundle = &parsed.students[i];
        record.submission_files = Some(bundle.files.clone());
        record.submission_date = Some(bundle.submission_date.clone());
        attached.insert(i);
        report.matched.push(MatchedPair {
            student: record.name.clone(),
            email: record.email.trim().to_string(),
            file_count: bundle.files.len(),
        });
    }
    report.matched_count = report.matched.len();

    for (i, bundle) in parsed.students.iter().enumerate() {
        let key = normalize_email(&bundle.email);
        if attached.contains(&i) || first_by_email.get(&key) != Some(&i) {
            continue;
        }
        warn!(email = %bundle.email, "submission has no roster match");
        report.unmatched.push(UnmatchedSubmission {
            email: bundle.email.clone(),
            name: format!("{} {}", bundle.first_name, bundle.last_name),
            date: bundle.submission_date.clone(),
        });
    }

    report
}
