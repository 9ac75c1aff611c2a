//! Moodle-style grading worksheet import and export.

use crate::error::{GradingError, GradingResult};
use crate::model::{format_points, RosterRecord};
use std::collections::HashMap;

pub const REQUIRED_HEADERS: [&str; 2] = ["Full name", "Email address"];

pub const EXPORT_HEADERS: [&str; 12] = [
    "Identifier",
    "Full name",
    "ID number",
    "Email address",
    "Status",
    "Grade",
    "Maximum Grade",
    "Grade can be changed",
    "Last modified (submission)",
    "Online text",
    "Last modified (grade)",
    "Feedback comments",
];

#[derive(Debug, Clone)]
pub struct RosterImport {
    pub records: Vec<RosterRecord>,
    /// First usable value of the maximum grade column, if any.
    pub max_points: Option<f64>,
    pub warnings: Vec<String>,
}

/// Splits CSV text into records. Quoted fields may contain commas, doubled
/// quotes and line breaks; blank lines are dropped.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    buf.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                buf.push(ch);
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut buf)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut buf));
                push_row(&mut rows, std::mem::take(&mut row));
            }
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() || !row.is_empty() {
        row.push(buf);
        push_row(&mut rows, row);
    }
    rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().all(|f| f.trim().is_empty()) {
        return;
    }
    rows.push(row);
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Keeps digits and dots only.
fn clean_numeric(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

pub fn parse_roster(text: &str) -> GradingResult<RosterImport> {
    let rows = parse_csv(text);
    let Some(header) = rows.first() else {
        return Err(GradingError::Validation("Empty CSV file".to_string()));
    };

    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .copied()
        .filter(|h| !header.iter().any(|f| f == h))
        .collect();
    if !missing.is_empty() {
        return Err(GradingError::Validation(format!(
            "Missing required columns: {}",
            missing.join(", ")
        )));
    }

    let mut idx = HashMap::<&str, usize>::new();
    for (i, f) in header.iter().enumerate() {
        idx.entry(f.as_str()).or_insert(i);
    }
    let max_col = idx
        .get("Maximum grade")
        .or_else(|| idx.get("Maximum Grade"))
        .copied();

    let max_found = max_col.and_then(|col| {
        rows.iter()
            .skip(1)
            .filter_map(|r| r.get(col))
            .map(|v| clean_numeric(v))
            .find(|v| !v.is_empty())
    });

    let mut warnings = Vec::new();
    let max_points = match max_found.as_deref() {
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v > 0.0 && v.is_finite() => Some(v),
            _ => {
                warnings.push(format!("Invalid maximum points value in CSV: {raw}"));
                None
            }
        },
        None => None,
    };

    let field = |row: &Vec<String>, name: &str| -> String {
        idx.get(name)
            .and_then(|i| row.get(*i))
            .cloned()
            .unwrap_or_default()
    };

    let records = rows
        .iter()
        .skip(1)
        .map(|row| {
            let own_max = max_col
                .and_then(|col| row.get(col))
                .map(|v| clean_numeric(v))
                .filter(|v| !v.is_empty());
            RosterRecord {
                identifier: field(row, "Identifier"),
                name: field(row, "Full name"),
                id_number: field(row, "ID number"),
                email: field(row, "Email address"),
                status: field(row, "Status"),
                grade: field(row, "Grade"),
                max_grade: own_max.or_else(|| max_found.clone()).unwrap_or_default(),
                grade_can_be_changed: field(row, "Grade can be changed"),
                last_modified_submission: field(row, "Last modified (submission)"),
                online_text: field(row, "Online text"),
                last_modified_grade: field(row, "Last modified (grade)"),
                feedback: field(row, "Feedback comments"),
                ..RosterRecord::default()
            }
        })
        .collect();

    Ok(RosterImport {
        records,
        max_points,
        warnings,
    })
}

pub fn export_roster(records: &[RosterRecord], max_points: f64) -> String {
    let mut out = String::new();
    out.push_str(&EXPORT_HEADERS.join(","));
    out.push('\n');
    for r in records {
        let max_grade = if r.max_grade.trim().is_empty() {
            format_points(max_points)
        } else {
            r.max_grade.clone()
        };
        let fields = [
            r.identifier.as_str(),
            r.name.as_str(),
            r.id_number.as_str(),
            r.email.as_str(),
            r.status.as_str(),
            r.grade.as_str(),
            max_grade.as_str(),
            r.grade_can_be_changed.as_str(),
            r.last_modified_submission.as_str(),
            r.online_text.as_str(),
            r.last_modified_grade.as_str(),
            r.feedback.as_str(),
        ];
        let line = fields
            .iter()
            .map(|f| csv_quote(f))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn export_file_name(assignment_name: &str) -> String {
    let slug = assignment_name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("{slug}_grades.csv")
}
