//! The working session: roster, feedback catalog, change log and assignment
//! settings. Every mutator takes `&mut self`, so a grade recompute, its
//! feedback text edit and the history append always land together.

use crate::archive::{self, ArchiveOptions, ArchiveShape, ParsedSubmissions};
use crate::commentary::{
    custom_prompt, default_prompt, run_batch, suggestion_prompt, BatchReport, Commentary,
    CommentaryGenerator, CommentaryRequest, SuggestedCriterion, SUGGESTION_SAMPLE_LIMIT,
};
use crate::config::Config;
use crate::error::{GradingError, GradingResult};
use crate::history::{ChangeHistory, ChangeKind, ChangeRecord};
use crate::ledger::{self, ApplyOutcome, FeedbackCatalog, Mutation};
use crate::model::{format_points, FeedbackId, FeedbackItem, RosterRecord};
use crate::reconcile::{reconcile, DuplicateSubmission, MatchedPair, UnmatchedSubmission};
use crate::roster;
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterImportSummary {
    pub students: usize,
    pub max_points: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionImportSummary {
    pub shape: ArchiveShape,
    pub total_students: usize,
    pub successful_extractions: usize,
    pub matched_count: usize,
    pub matched: Vec<MatchedPair>,
    pub unmatched: Vec<UnmatchedSubmission>,
    pub duplicates: Vec<DuplicateSubmission>,
    pub errors: Vec<String>,
    pub archive_sha256: String,
}

#[derive(Debug, Clone)]
pub struct RevertOutcome {
    pub change: ChangeRecord,
    pub record: RosterRecord,
    /// Restored applied ids that the catalog no longer has, or that now
    /// name an item with a different comment.
    pub stale_ids: Vec<FeedbackId>,
}

/// Name a fresh or reset session starts with.
pub const DEFAULT_ASSIGNMENT_NAME: &str = "Assignment 1";

pub struct Session {
    pub assignment_name: String,
    max_points: f64,
    default_max_points: f64,
    roster: Vec<RosterRecord>,
    catalog: FeedbackCatalog,
    history: ChangeHistory,
    suggestions: Vec<SuggestedCriterion>,
    max_history: usize,
    coalesce_window: Duration,
    archive_options: ArchiveOptions,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let coalesce_window = Duration::milliseconds(config.coalesce_ms);
        Self {
            assignment_name: DEFAULT_ASSIGNMENT_NAME.to_string(),
            max_points: config.default_max_points,
            default_max_points: config.default_max_points,
            roster: Vec::new(),
            catalog: FeedbackCatalog::default(),
            history: ChangeHistory::new(config.max_history, coalesce_window),
            suggestions: Vec::new(),
            max_history: config.max_history,
            coalesce_window,
            archive_options: config.archive_options(),
        }
    }

    pub fn reset(&mut self) {
        self.assignment_name = DEFAULT_ASSIGNMENT_NAME.to_string();
        self.max_points = self.default_max_points;
        self.roster.clear();
        self.catalog = FeedbackCatalog::default();
        self.history = ChangeHistory::new(self.max_history, self.coalesce_window);
        self.suggestions.clear();
        info!("session reset");
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    pub fn roster(&self) -> &[RosterRecord] {
        &self.roster
    }

    pub fn catalog(&self) -> &FeedbackCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &ChangeHistory {
        &self.history
    }

    pub fn student(&self, name: &str) -> Option<&RosterRecord> {
        self.roster.iter().find(|r| r.name == name)
    }

    fn student_index(&self, name: &str) -> GradingResult<usize> {
        self.roster
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| GradingError::NotFound(format!("student {name}")))
    }

    fn log(&mut self, change: ChangeRecord) {
        self.history.record(change, Utc::now());
    }

    fn log_mutations(&mut self, mutations: Vec<Mutation>) {
        for m in mutations {
            self.log(ChangeRecord::feedback(
                &m.student,
                m.before,
                m.after,
                m.before_comments,
            ));
        }
    }

    /// Updates assignment settings. A new maximum re-derives every grade that
    /// has feedback applied; returns how many grades changed.
    pub fn update_assignment(
        &mut self,
        name: Option<&str>,
        max_points: Option<f64>,
    ) -> GradingResult<usize> {
        if let Some(max) = max_points {
            if !max.is_finite() || max <= 0.0 {
                return Err(GradingError::Validation(format!(
                    "maximum points must be a positive number, got {max}"
                )));
            }
        }
        if let Some(name) = name {
            self.assignment_name = name.trim().to_string();
        }
        let Some(max) = max_points else {
            return Ok(0);
        };
        self.max_points = max;
        Ok(ledger::recompute_all(&mut self.roster, &self.catalog, max))
    }

    /// Replaces the roster. On a validation failure the current roster stays.
    pub fn import_roster(&mut self, csv: &str) -> GradingResult<RosterImportSummary> {
        let imported = roster::parse_roster(csv)?;
        for w in &imported.warnings {
            warn!("{}", w);
        }
        if let Some(max) = imported.max_points {
            self.max_points = max;
        }
        self.roster = imported.records;
        self.log(ChangeRecord::new(
            ChangeKind::Import,
            "",
            Some("CSV data imported".to_string()),
        ));
        info!(students = self.roster.len(), max_points = self.max_points, "roster imported");
        Ok(RosterImportSummary {
            students: self.roster.len(),
            max_points: self.max_points,
            warnings: imported.warnings,
        })
    }

    pub fn export_roster(&self) -> String {
        roster::export_roster(&self.roster, self.max_points)
    }

    pub fn export_file_name(&self) -> String {
        let name = if self.assignment_name.trim().is_empty() {
            "assignment"
        } else {
            self.assignment_name.as_str()
        };
        roster::export_file_name(name)
    }

    pub fn import_submissions(&mut self, bytes: &[u8]) -> SubmissionImportSummary {
        let parsed: ParsedSubmissions = archive::parse_submission_archive(bytes, &self.archive_options);
        let report = reconcile(&mut self.roster, &parsed);
        self.log(ChangeRecord::new(
            ChangeKind::Import,
            "",
            Some(format!(
                "ZIP submissions imported: {} matched, {} unmatched",
                report.matched_count,
                report.unmatched.len()
            )),
        ));
        info!(
            matched = report.matched_count,
            unmatched = report.unmatched.len(),
            errors = parsed.errors.len(),
            "submissions imported"
        );
        SubmissionImportSummary {
            shape: parsed.shape,
            total_students: parsed.total_students,
            successful_extractions: parsed.successful_extractions,
            matched_count: report.matched_count,
            matched: report.matched,
            unmatched: report.unmatched,
            duplicates: report.duplicates,
            errors: parsed.errors,
            archive_sha256: archive::archive_digest(bytes),
        }
    }

    fn feedback_item(&self, id: FeedbackId) -> GradingResult<FeedbackItem> {
        self.catalog
            .get(id)
            .cloned()
            .ok_or_else(|| GradingError::NotFound(format!("feedback item {id}")))
    }

    pub fn apply_feedback(
        &mut self,
        id: FeedbackId,
        students: &[String],
    ) -> GradingResult<ApplyOutcome> {
        let item = self.feedback_item(id)?;
        let mut outcome =
            ledger::apply_to(&mut self.roster, students, &item, &self.catalog, self.max_points);
        for name in &outcome.unknown {
            warn!(student = %name, feedback_id = id, "apply target not in roster");
        }
        self.log_mutations(std::mem::take(&mut outcome.mutations));
        Ok(outcome)
    }

    pub fn create_feedback(&mut self, comment: &str, grade: f64) -> GradingResult<FeedbackItem> {
        let item = self.catalog.create(comment, grade)?;
        info!(id = item.id, "feedback item created");
        Ok(item)
    }

    /// Returns the updated item and the students whose state changed.
    pub fn edit_feedback(
        &mut self,
        id: FeedbackId,
        comment: &str,
        grade: f64,
    ) -> GradingResult<(FeedbackItem, Vec<String>)> {
        let old = self.catalog.update(id, comment, grade)?;
        let new = self.feedback_item(id)?;
        let mutations =
            ledger::propagate_edit(&mut self.roster, &old, &new, &self.catalog, self.max_points);
        let affected = mutations.iter().map(|m| m.student.clone()).collect();
        self.log_mutations(mutations);
        Ok((new, affected))
    }

    pub fn delete_feedback(&mut self, id: FeedbackId) -> GradingResult<Vec<String>> {
        let removed = self.catalog.remove(id)?;
        let mutations =
            ledger::propagate_delete(&mut self.roster, &removed, &self.catalog, self.max_points);
        let affected = mutations.iter().map(|m| m.student.clone()).collect();
        self.log_mutations(mutations);
        info!(id, "feedback item deleted");
        Ok(affected)
    }

    pub fn reorder_feedback(&mut self, from: usize, to: usize) -> GradingResult<()> {
        self.catalog.reorder(from, to)?;
        self.log(ChangeRecord::new(
            ChangeKind::Reorder,
            "",
            Some("Feedback items reordered".to_string()),
        ));
        Ok(())
    }

    /// Manual override: a non-negative number or blank.
    pub fn set_grade(&mut self, student: &str, grade: &str) -> GradingResult<RosterRecord> {
        let grade = grade.trim();
        let new_grade = if grade.is_empty() {
            String::new()
        } else {
            match grade.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => format_points(v),
                _ => {
                    return Err(GradingError::Validation(format!(
                        "grade must be a non-negative number or blank, got {grade}"
                    )))
                }
            }
        };
        let idx = self.student_index(student)?;
        let old_grade = std::mem::replace(&mut self.roster[idx].grade, new_grade.clone());
        if old_grade != new_grade {
            self.log(ChangeRecord::grade(student, &old_grade, &new_grade));
        }
        Ok(self.roster[idx].clone())
    }

    /// Undoes one history entry and drops it from the log. Reverting is not
    /// itself recorded.
    pub fn revert(&mut self, change_id: Uuid) -> GradingResult<RevertOutcome> {
        let change = self
            .history
            .get(change_id)
            .ok_or_else(|| GradingError::NotFound(format!("change {change_id}")))?;
        if !change.kind.is_revertible() {
            return Err(GradingError::NotRevertible(change_id.to_string()));
        }
        let Some(idx) = self.roster.iter().position(|r| r.name == change.student_name) else {
            warn!(student = %change.student_name, change = %change_id, "revert target missing");
            return Err(GradingError::LedgerInconsistency(format!(
                "student {} is not in the roster",
                change.student_name
            )));
        };

        let change = self
            .history
            .take(change_id)
            .ok_or_else(|| GradingError::NotFound(format!("change {change_id}")))?;
        let record = &mut self.roster[idx];
        let mut stale_ids = Vec::new();
        match &change.kind {
            ChangeKind::Grade { old_value, .. } => record.grade = old_value.clone(),
            ChangeKind::Feedback {
                old_value,
                applied_comments,
                ..
            } => {
                record.restore_feedback_state(old_value);
                stale_ids = old_value
                    .applied_ids
                    .iter()
                    .copied()
                    .filter(|id| match (self.catalog.get(*id), applied_comments.get(id)) {
                        (None, _) => true,
                        (Some(live), Some(then)) => live.comment != *then,
                        (Some(_), None) => false,
                    })
                    .collect();
            }
            ChangeKind::Import | ChangeKind::Reorder => {}
        }
        info!(student = %change.student_name, kind = change.kind.label(), "change reverted");
        Ok(RevertOutcome {
            record: record.clone(),
            change,
            stale_ids,
        })
    }

    /// Sends one student's main file for commentary and attaches the result.
    pub fn generate_commentary(
        &mut self,
        generator: &dyn CommentaryGenerator,
        student: &str,
        prompt: Option<&str>,
    ) -> GradingResult<(Commentary, RosterRecord)> {
        let idx = self.student_index(student)?;
        let code = self.roster[idx]
            .submission_files
            .as_deref()
            .and_then(crate::model::main_file)
            .map(|f| f.content.clone())
            .ok_or_else(|| {
                GradingError::Validation(format!("No code submission found for {student}"))
            })?;
        let template = match prompt.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => custom_prompt(p),
            None => default_prompt(self.catalog.items()),
        };
        let commentary = generator.generate(&CommentaryRequest {
            code: &code,
            linter_output: "",
            prompt_template: &template,
            assignment_context: &self.assignment_name,
        })?;

        let record = &mut self.roster[idx];
        let before = record.feedback_state();
        let before_comments = ledger::applied_comments(&before.applied_ids, &self.catalog, None);
        record.ai_feedback = Some(commentary.clone());
        if !commentary.overall_comments.is_empty() {
            record.feedback = ledger::append_comment(
                &record.feedback,
                &commentary.overall_comments.join("\n"),
            );
        }
        let after = record.feedback_state();
        let updated = record.clone();
        if after != before {
            let mut change = ChangeRecord::feedback(student, before, after, before_comments);
            change.message = Some("AI feedback generated".to_string());
            self.log(change);
        }
        Ok((commentary, updated))
    }

    /// Commentary for every student with a submission, one at a time.
    pub fn commentary_batch(
        &mut self,
        generator: &dyn CommentaryGenerator,
        prompt: Option<&str>,
        delay: std::time::Duration,
    ) -> BatchReport {
        let students: Vec<String> = self
            .roster
            .iter()
            .filter(|r| r.has_submission())
            .map(|r| r.name.clone())
            .collect();
        info!(students = students.len(), "commentary batch started");
        run_batch(&students, delay, |name| {
            self.generate_commentary(generator, name, prompt).map(|_| ())
        })
    }

    pub fn suggestions(&self) -> &[SuggestedCriterion] {
        &self.suggestions
    }

    /// Samples up to ten submissions and asks for new feedback criteria.
    /// Returns only the criteria from this call; they are also kept for the
    /// rest of the session.
    pub fn suggest_feedback(
        &mut self,
        generator: &dyn CommentaryGenerator,
    ) -> GradingResult<Vec<SuggestedCriterion>> {
        let samples: Vec<&str> = self
            .roster
            .iter()
            .filter(|r| r.has_submission())
            .take(SUGGESTION_SAMPLE_LIMIT)
            .filter_map(|r| r.submission_files.as_deref().and_then(crate::model::main_file))
            .map(|f| f.content.as_str())
            .filter(|c| !c.is_empty())
            .collect();
        if samples.is_empty() {
            return Err(GradingError::Validation(
                "No student submissions found".to_string(),
            ));
        }
        let prompt = suggestion_prompt(&samples);
        let reply = generator.generate(&CommentaryRequest {
            code: "",
            linter_output: "",
            prompt_template: &prompt,
            assignment_context: &self.assignment_name,
        })?;
        info!(
            samples = samples.len(),
            suggestions = reply.suggestions.len(),
            "feedback suggestions generated"
        );
        self.suggestions.extend(reply.suggestions.iter().cloned());
        Ok(reply.suggestions)
    }

    pub fn dismiss_suggestion(&mut self, index: usize) -> GradingResult<SuggestedCriterion> {
        if index >= self.suggestions.len() {
            return Err(GradingError::NotFound(format!("suggestion {index}")));
        }
        Ok(self.suggestions.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commentary::CommentaryError;
    use crate::model::{FeedbackState, SubmissionFile};

    const ROSTER: &str = "Identifier,Full name,Email address,Grade,Maximum grade,Feedback comments\n\
Participant 1,Ann Smith,as7@uni.edu,,20,\n\
Participant 2,Bob Jones,bj2@uni.edu,,20,\n";

    fn session() -> Session {
        let config = Config {
            coalesce_ms: 0,
            ..Config::default()
        };
        let mut s = Session::new(&config);
        s.import_roster(ROSTER).expect("roster");
        s
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn newest_id(s: &Session) -> Uuid {
        s.history().list().next().map(|c| c.id).expect("history entry")
    }

    fn assert_grades_match_applied(s: &Session) {
        for r in s.roster() {
            assert_eq!(r.grade.is_empty(), r.applied_ids.is_empty(), "{r:?}");
        }
    }

    #[test]
    fn failed_roster_import_leaves_roster_untouched() {
        let mut s = session();
        let err = s
            .import_roster("Full name,Grade\nX,1\n")
            .expect_err("missing email column");
        assert_eq!(err.code(), "validation_failed");
        assert_eq!(s.roster().len(), 2);
        assert_eq!(s.roster()[0].name, "Ann Smith");
    }

    #[test]
    fn apply_then_revert_restores_and_shrinks_history() {
        let mut s = session();
        let before = s.student("Ann Smith").expect("ann").feedback_state();
        let len0 = s.history().len();

        s.apply_feedback(1, &names(&["Ann Smith"])).expect("apply");
        assert_eq!(s.student("Ann Smith").expect("ann").grade, "17");
        assert_eq!(s.history().len(), len0 + 1);
        assert_grades_match_applied(&s);

        let outcome = s.revert(newest_id(&s)).expect("revert");
        assert!(outcome.stale_ids.is_empty());
        assert_eq!(s.student("Ann Smith").expect("ann").feedback_state(), before);
        assert_eq!(s.history().len(), len0);
        assert_grades_match_applied(&s);
    }

    #[test]
    fn informational_and_unknown_changes_do_not_revert() {
        let mut s = session();
        let import_id = newest_id(&s);
        assert!(matches!(s.revert(import_id), Err(GradingError::NotRevertible(_))));
        assert!(matches!(s.revert(Uuid::new_v4()), Err(GradingError::NotFound(_))));
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn revert_for_missing_student_is_an_inconsistency() {
        let mut s = session();
        s.apply_feedback(2, &names(&["Bob Jones"])).expect("apply");
        let id = newest_id(&s);
        s.import_roster("Full name,Email address\nCy Lee,cl@uni.edu\n")
            .expect("second roster");

        assert!(matches!(s.revert(id), Err(GradingError::LedgerInconsistency(_))));
        assert!(s.history().get(id).is_some());
    }

    #[test]
    fn revert_reports_ids_missing_from_catalog() {
        let mut s = session();
        let ann = names(&["Ann Smith"]);
        s.apply_feedback(2, &ann).expect("apply 2");
        s.apply_feedback(1, &ann).expect("apply 1");
        let second = newest_id(&s);

        let affected = s.delete_feedback(2).expect("delete");
        assert_eq!(affected, vec!["Ann Smith".to_string()]);
        assert_eq!(s.student("Ann Smith").expect("ann").grade, "17");

        let outcome = s.revert(second).expect("revert");
        assert_eq!(outcome.stale_ids, vec![2]);
        assert_eq!(outcome.record.feedback, "Poor indentation");
        assert_eq!(outcome.record.grade, "18");
    }

    #[test]
    fn revert_flags_ids_reused_by_a_different_item() {
        let mut s = session();
        let ann = names(&["Ann Smith"]);
        s.apply_feedback(2, &ann).expect("apply 2");
        s.apply_feedback(1, &ann).expect("apply 1");
        let second = newest_id(&s);
        s.delete_feedback(2).expect("delete");
        let reused = s.create_feedback("Great naming", 10.0).expect("create");
        assert_eq!(reused.id, 2);

        let outcome = s.revert(second).expect("revert");
        assert_eq!(outcome.stale_ids, vec![2]);
        assert_eq!(outcome.record.feedback, "Poor indentation");
    }

    #[test]
    fn revert_flags_ids_whose_comment_was_edited() {
        let mut s = session();
        let bob = names(&["Bob Jones"]);
        s.apply_feedback(2, &bob).expect("apply 2");
        s.apply_feedback(1, &bob).expect("apply 1");
        let second = newest_id(&s);
        s.edit_feedback(2, "Indent consistently", 2.0).expect("edit");

        let outcome = s.revert(second).expect("revert");
        assert_eq!(outcome.stale_ids, vec![2]);

        s.apply_feedback(3, &bob).expect("apply 3");
        let third = newest_id(&s);
        let outcome = s.revert(third).expect("revert");
        assert!(outcome.stale_ids.is_empty());
    }

    #[test]
    fn rapid_changes_to_one_student_coalesce() {
        let mut s = Session::new(&Config::default());
        s.import_roster(ROSTER).expect("roster");
        let len0 = s.history().len();
        let ann = names(&["Ann Smith"]);
        s.apply_feedback(1, &ann).expect("apply");
        s.apply_feedback(2, &ann).expect("apply");
        assert_eq!(s.history().len(), len0 + 1);
    }

    #[test]
    fn edit_and_delete_keep_grades_consistent() {
        let mut s = session();
        s.apply_feedback(2, &names(&["Ann Smith", "Bob Jones"]))
            .expect("apply");
        let (item, affected) = s.edit_feedback(2, "Indent consistently", 4.0).expect("edit");
        assert_eq!(item.comment, "Indent consistently");
        assert_eq!(affected.len(), 2);
        assert_eq!(s.student("Bob Jones").expect("bob").grade, "16");
        assert_eq!(s.student("Bob Jones").expect("bob").feedback, "Indent consistently");

        s.delete_feedback(2).expect("delete");
        assert_eq!(s.student("Bob Jones").expect("bob").feedback_state(), FeedbackState::default());
        assert_eq!(s.create_feedback("Reuse me", 1.0).expect("create").id, 2);
        assert_grades_match_applied(&s);
    }

    #[test]
    fn max_points_change_recomputes() {
        let mut s = session();
        s.apply_feedback(1, &names(&["Ann Smith"])).expect("apply");
        let changed = s.update_assignment(Some(" HW 1 "), Some(10.0)).expect("update");
        assert_eq!(changed, 1);
        assert_eq!(s.student("Ann Smith").expect("ann").grade, "7");
        assert_eq!(s.export_file_name(), "hw_1_grades.csv");
        assert!(s.update_assignment(None, Some(0.0)).is_err());
    }

    #[test]
    fn manual_grade_is_recorded_and_revertible() {
        let mut s = session();
        let rec = s.set_grade("Ann Smith", "15.50").expect("set");
        assert_eq!(rec.grade, "15.5");
        let change = s.history().list().next().cloned().expect("entry");
        assert_eq!(change.message.as_deref(), Some("Ann Smith: 0 → 15.5 points"));

        s.revert(change.id).expect("revert");
        assert_eq!(s.student("Ann Smith").expect("ann").grade, "");
        assert!(matches!(s.set_grade("Ann Smith", "-1"), Err(GradingError::Validation(_))));
        assert!(matches!(s.set_grade("Nobody", "1"), Err(GradingError::NotFound(_))));
    }

    #[test]
    fn reorder_is_logged_as_informational() {
        let mut s = session();
        s.reorder_feedback(3, 0).expect("reorder");
        let change = s.history().list().next().cloned().expect("entry");
        assert_eq!(change.kind, ChangeKind::Reorder);
        assert_eq!(s.catalog().items()[0].id, 4);
    }

    struct FakeGenerator;

    impl CommentaryGenerator for FakeGenerator {
        fn generate(&self, req: &CommentaryRequest<'_>) -> Result<Commentary, CommentaryError> {
            if req.code.contains("boom") {
                return Err(CommentaryError::Server(500));
            }
            assert!(req.prompt_template.contains("{{code}}"));
            Ok(Commentary {
                overall_comments: vec!["Nice loop".to_string()],
                ..Commentary::default()
            })
        }
    }

    fn attach(s: &mut Session, student: &str, content: &str) {
        let idx = s.student_index(student).expect("student");
        s.roster[idx].submission_files = Some(vec![SubmissionFile {
            name: "main.py".into(),
            content: content.into(),
        }]);
    }

    #[test]
    fn batch_applies_successes_and_counts_failures() {
        let mut s = session();
        attach(&mut s, "Ann Smith", "print('hi')");
        attach(&mut s, "Bob Jones", "boom");

        let report = s.commentary_batch(&FakeGenerator, None, std::time::Duration::ZERO);
        assert_eq!(report.success, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.failures[0].student, "Bob Jones");

        let ann = s.student("Ann Smith").expect("ann");
        assert_eq!(ann.feedback, "Nice loop");
        assert!(ann.ai_feedback.is_some());
        assert!(s.student("Bob Jones").expect("bob").ai_feedback.is_none());
        let change = s.history().list().next().cloned().expect("entry");
        assert_eq!(change.message.as_deref(), Some("AI feedback generated"));
    }

    struct SuggestingGenerator {
        prompts: std::cell::RefCell<Vec<String>>,
    }

    impl CommentaryGenerator for SuggestingGenerator {
        fn generate(&self, req: &CommentaryRequest<'_>) -> Result<Commentary, CommentaryError> {
            self.prompts.borrow_mut().push(req.prompt_template.to_string());
            Ok(Commentary {
                suggestions: vec![SuggestedCriterion {
                    comment: "Handle empty input".into(),
                    grade: 2.0,
                }],
                ..Commentary::default()
            })
        }
    }

    #[test]
    fn suggestions_sample_submissions_and_stay_out_of_the_catalog() {
        let mut s = session();
        let gen = SuggestingGenerator {
            prompts: std::cell::RefCell::new(Vec::new()),
        };
        assert!(matches!(
            s.suggest_feedback(&gen),
            Err(GradingError::Validation(_))
        ));
        assert!(gen.prompts.borrow().is_empty());

        attach(&mut s, "Bob Jones", "def solve():\n    return 42");
        let catalog_len = s.catalog().items().len();
        let history_len = s.history().len();

        let got = s.suggest_feedback(&gen).expect("suggest");
        assert_eq!(got.len(), 1);
        s.suggest_feedback(&gen).expect("suggest again");
        assert_eq!(s.suggestions().len(), 2);
        assert_eq!(s.catalog().items().len(), catalog_len);
        assert_eq!(s.history().len(), history_len);

        let prompt = gen.prompts.borrow()[0].clone();
        assert!(prompt.contains("Analyze these 1 student code submissions"));
        assert!(prompt.contains("def solve():"));

        let dismissed = s.dismiss_suggestion(0).expect("dismiss");
        assert_eq!(dismissed.comment, "Handle empty input");
        assert_eq!(s.suggestions().len(), 1);
        assert!(matches!(s.dismiss_suggestion(5), Err(GradingError::NotFound(_))));

        s.update_assignment(Some("Lab 2"), None).expect("rename");
        s.reset();
        assert!(s.suggestions().is_empty());
        assert_eq!(s.assignment_name, DEFAULT_ASSIGNMENT_NAME);
        assert_eq!(s.export_file_name(), "assignment_1_grades.csv");
    }

    #[test]
    fn commentary_needs_a_submission() {
        let mut s = session();
        assert!(matches!(
            s.generate_commentary(&FakeGenerator, "Ann Smith", None),
            Err(GradingError::Validation(_))
        ));
    }
}
