//! Feedback catalog and the deduction arithmetic that keeps each record's
//! grade, feedback text and applied ids consistent.
//!
//! A record's grade is a pure function of its applied ids:
//! blank when none are applied, otherwise `max(0, maxPoints - sum)`.

use crate::error::{GradingError, GradingResult};
use crate::model::{format_points, FeedbackId, FeedbackItem, FeedbackState, RosterRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct FeedbackCatalog {
    items: Vec<FeedbackItem>,
    next_id: FeedbackId,
    free_ids: BTreeSet<FeedbackId>,
}

impl Default for FeedbackCatalog {
    fn default() -> Self {
        let item = |id, comment: &str, grade| FeedbackItem {
            id,
            comment: comment.to_string(),
            grade,
        };
        Self {
            items: vec![
                item(1, "Add more comments", 3.0),
                item(2, "Poor indentation", 2.0),
                item(3, "Looks good!", 0.0),
                item(4, "No submission", 20.0),
            ],
            next_id: 5,
            free_ids: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Manual,
    Text,
    Deduction,
    Applied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub search: Option<String>,
    pub sort_field: SortField,
    pub direction: SortDirection,
}

fn validate(comment: &str, grade: f64) -> GradingResult<()> {
    if comment.trim().is_empty() {
        return Err(GradingError::Validation(
            "feedback comment must not be empty".to_string(),
        ));
    }
    if !grade.is_finite() || grade < 0.0 {
        return Err(GradingError::Validation(format!(
            "deduction must be a non-negative number, got {grade}"
        )));
    }
    Ok(())
}

impl FeedbackCatalog {
    pub fn items(&self) -> &[FeedbackItem] {
        &self.items
    }

    pub fn get(&self, id: FeedbackId) -> Option<&FeedbackItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn contains(&self, id: FeedbackId) -> bool {
        self.get(id).is_some()
    }

    /// Ids missing from the catalog deduct nothing.
    pub fn deduction(&self, id: FeedbackId) -> f64 {
        self.get(id).map(|i| i.grade).unwrap_or(0.0)
    }

    pub fn create(&mut self, comment: &str, grade: f64) -> GradingResult<FeedbackItem> {
        validate(comment, grade)?;
        let id = match self.free_ids.pop_first() {
            Some(id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        let item = FeedbackItem {
            id,
            comment: comment.trim().to_string(),
            grade,
        };
        self.items.push(item.clone());
        Ok(item)
    }

    /// Replaces an item in place and returns the previous version.
    pub fn update(
        &mut self,
        id: FeedbackId,
        comment: &str,
        grade: f64,
    ) -> GradingResult<FeedbackItem> {
        validate(comment, grade)?;
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| GradingError::NotFound(format!("feedback item {id}")))?;
        let old = item.clone();
        item.comment = comment.trim().to_string();
        item.grade = grade;
        Ok(old)
    }

    /// Removes an item; its id goes back to the pool for the next `create`.
    pub fn remove(&mut self, id: FeedbackId) -> GradingResult<FeedbackItem> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| GradingError::NotFound(format!("feedback item {id}")))?;
        let item = self.items.remove(pos);
        self.free_ids.insert(id);
        Ok(item)
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> GradingResult<()> {
        let len = self.items.len();
        if from >= len || to >= len {
            return Err(GradingError::Validation(format!(
                "reorder index out of range: {from} -> {to} (items: {len})"
            )));
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        Ok(())
    }

    /// Filters by case-insensitive substring and sorts. `applied` is the
    /// student whose applied ids drive the `Applied` sort; without one that
    /// sort keeps manual order.
    pub fn list(
        &self,
        query: &ListQuery,
        applied: Option<&BTreeSet<FeedbackId>>,
    ) -> Vec<FeedbackItem> {
        let needle = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let mut items: Vec<FeedbackItem> = self
            .items
            .iter()
            .filter(|i| match &needle {
                Some(n) => i.comment.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .cloned()
            .collect();

        let is_applied = |i: &FeedbackItem| applied.map(|a| a.contains(&i.id)).unwrap_or(false);
        let cmp = |a: &FeedbackItem, b: &FeedbackItem| -> Ordering {
            match query.sort_field {
                SortField::Manual => Ordering::Equal,
                SortField::Text => a.comment.to_lowercase().cmp(&b.comment.to_lowercase()),
                SortField::Deduction => a.grade.total_cmp(&b.grade),
                SortField::Applied => is_applied(a).cmp(&is_applied(b)),
            }
        };
        match query.direction {
            SortDirection::Asc => items.sort_by(cmp),
            SortDirection::Desc => items.sort_by(|a, b| cmp(b, a)),
        }
        items
    }
}

/// A record touched by a ledger operation, with its state on either side.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub index: usize,
    pub student: String,
    pub before: FeedbackState,
    pub after: FeedbackState,
    /// Comment behind each id in `before`, as it read at the time.
    pub before_comments: BTreeMap<FeedbackId, String>,
}

/// Comment text for each id. `known` stands in for an item the catalog no
/// longer holds in that form (just edited or just removed).
pub fn applied_comments(
    ids: &BTreeSet<FeedbackId>,
    catalog: &FeedbackCatalog,
    known: Option<&FeedbackItem>,
) -> BTreeMap<FeedbackId, String> {
    ids.iter()
        .filter_map(|id| {
            let comment = match known {
                Some(item) if item.id == *id => Some(item.comment.clone()),
                _ => catalog.get(*id).map(|i| i.comment.clone()),
            }?;
            Some((*id, comment))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResult {
    pub student: String,
    pub applied: bool,
    pub grade: String,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub mutations: Vec<Mutation>,
    pub results: Vec<ToggleResult>,
    pub unknown: Vec<String>,
}

pub fn compute_grade(
    applied: &BTreeSet<FeedbackId>,
    catalog: &FeedbackCatalog,
    max_points: f64,
) -> String {
    if applied.is_empty() {
        return String::new();
    }
    let total: f64 = applied.iter().map(|id| catalog.deduction(*id)).sum();
    format_points((max_points - total).max(0.0))
}

pub fn recompute_grade(record: &mut RosterRecord, catalog: &FeedbackCatalog, max_points: f64) {
    record.grade = compute_grade(&record.applied_ids, catalog, max_points);
}

/// Recomputes every record that has feedback applied. Returns how many
/// grades actually changed.
pub fn recompute_all(
    records: &mut [RosterRecord],
    catalog: &FeedbackCatalog,
    max_points: f64,
) -> usize {
    let mut changed = 0;
    for record in records.iter_mut().filter(|r| !r.applied_ids.is_empty()) {
        let grade = compute_grade(&record.applied_ids, catalog, max_points);
        if grade != record.grade {
            record.grade = grade;
            changed += 1;
        }
    }
    changed
}

fn matches_comment(line: &str, comment: &str) -> bool {
    let comment = comment.trim();
    !comment.is_empty() && line.trim().starts_with(comment)
}

/// Drops every line that starts with `comment`. The remaining text is kept
/// byte for byte, including blank lines and trailing newlines.
pub fn strip_comment_lines(feedback: &str, comment: &str) -> String {
    if comment.trim().is_empty() {
        return feedback.to_string();
    }
    feedback
        .split('\n')
        .filter(|line| !matches_comment(line, comment))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn append_comment(feedback: &str, comment: &str) -> String {
    if feedback.is_empty() {
        comment.to_string()
    } else {
        format!("{feedback}\n{comment}")
    }
}

/// Rewrites matching lines to `new_comment`; a rewritten line that ends up
/// blank is dropped. Other lines are untouched.
fn replace_comment_lines(feedback: &str, old_comment: &str, new_comment: &str) -> String {
    let new_comment = new_comment.trim();
    feedback
        .split('\n')
        .filter_map(|line| {
            if !matches_comment(line, old_comment) {
                Some(line)
            } else if new_comment.is_empty() {
                None
            } else {
                Some(new_comment)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Adds `item` to the record if absent, removes it if present.
/// Returns whether the item is applied afterwards.
pub fn toggle(
    record: &mut RosterRecord,
    item: &FeedbackItem,
    catalog: &FeedbackCatalog,
    max_points: f64,
) -> bool {
    let applied = if record.applied_ids.remove(&item.id) {
        record.feedback = strip_comment_lines(&record.feedback, &item.comment);
        false
    } else {
        record.applied_ids.insert(item.id);
        record.feedback = append_comment(&record.feedback, &item.comment);
        true
    };
    recompute_grade(record, catalog, max_points);
    applied
}

/// Toggles `item` on every named student. Names that match no record are
/// returned in `unknown`; the rest still go through.
pub fn apply_to(
    records: &mut [RosterRecord],
    students: &[String],
    item: &FeedbackItem,
    catalog: &FeedbackCatalog,
    max_points: f64,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    let mut seen = BTreeSet::new();
    for name in students {
        if !seen.insert(name.as_str()) {
            continue;
        }
        let Some(index) = records.iter().position(|r| &r.name == name) else {
            outcome.unknown.push(name.clone());
            continue;
        };
        let record = &mut records[index];
        let before = record.feedback_state();
        let before_comments = applied_comments(&before.applied_ids, catalog, None);
        let applied = toggle(record, item, catalog, max_points);
        outcome.results.push(ToggleResult {
            student: record.name.clone(),
            applied,
            grade: record.grade.clone(),
        });
        outcome.mutations.push(Mutation {
            index,
            student: record.name.clone(),
            before,
            after: record.feedback_state(),
            before_comments,
        });
    }
    outcome
}

/// Carries an edited item into every record that has it applied. `catalog`
/// must already hold the new version.
pub fn propagate_edit(
    records: &mut [RosterRecord],
    old: &FeedbackItem,
    new: &FeedbackItem,
    catalog: &FeedbackCatalog,
    max_points: f64,
) -> Vec<Mutation> {
    let mut mutations = Vec::new();
    for (index, record) in records.iter_mut().enumerate() {
        if !record.applied_ids.contains(&old.id) {
            continue;
        }
        let before = record.feedback_state();
        let before_comments = applied_comments(&before.applied_ids, catalog, Some(old));
        record.feedback = replace_comment_lines(&record.feedback, &old.comment, &new.comment);
        recompute_grade(record, catalog, max_points);
        let after = record.feedback_state();
        if after != before {
            mutations.push(Mutation {
                index,
                student: record.name.clone(),
                before,
                after,
                before_comments,
            });
        }
    }
    mutations
}

/// Withdraws a deleted item from every record that has it applied. `catalog`
/// must no longer contain it.
pub fn propagate_delete(
    records: &mut [RosterRecord],
    removed: &FeedbackItem,
    catalog: &FeedbackCatalog,
    max_points: f64,
) -> Vec<Mutation> {
    let mut mutations = Vec::new();
    for (index, record) in records.iter_mut().enumerate() {
        if !record.applied_ids.contains(&removed.id) {
            continue;
        }
        let before = record.feedback_state();
        let before_comments = applied_comments(&before.applied_ids, catalog, Some(removed));
        record.applied_ids.remove(&removed.id);
        record.feedback = strip_comment_lines(&record.feedback, &removed.comment);
        recompute_grade(record, catalog, max_points);
        mutations.push(Mutation {
            index,
            student: record.name.clone(),
            before,
            after: record.feedback_state(),
            before_comments,
        });
    }
    mutations
}
