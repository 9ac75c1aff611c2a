//! Code commentary from an OpenAI-compatible chat-completions endpoint.
//!
//! The session only sees [`CommentaryGenerator`]; the HTTP client is one
//! implementation of it and tests substitute their own.

use crate::config::Config;
use crate::model::{FeedbackId, FeedbackItem};
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackResponse {
    Yes,
    No,
    Unsure,
}

impl FeedbackResponse {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            "unsure" => Some(Self::Unsure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commentary {
    pub line_comments: BTreeMap<i64, String>,
    pub overall_comments: Vec<String>,
    pub static_analysis_output: String,
    pub feedback_responses: BTreeMap<FeedbackId, FeedbackResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<SuggestedCriterion>,
}

/// A feedback criterion proposed by the model. Lives only in the session
/// until the instructor turns it into a catalog item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedCriterion {
    pub comment: String,
    pub grade: f64,
}

/// Characters of each sample sent when asking for new criteria.
pub const SUGGESTION_SAMPLE_CHARS: usize = 500;
/// Submissions sampled when asking for new criteria.
pub const SUGGESTION_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum CommentaryError {
    #[error("{0}")]
    Authentication(String),
    #[error("API rate limit exceeded. Please try again later.")]
    RateLimited,
    #[error("API server error ({0}). Please try again later.")]
    Server(u16),
    #[error("LLM returned invalid response format: {0}")]
    MalformedResponse(String),
    #[error("LLM integration failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy)]
pub struct CommentaryRequest<'a> {
    pub code: &'a str,
    pub linter_output: &'a str,
    pub prompt_template: &'a str,
    pub assignment_context: &'a str,
}

pub trait CommentaryGenerator {
    fn generate(&self, request: &CommentaryRequest<'_>) -> Result<Commentary, CommentaryError>;
}

pub struct OpenAiCommentary {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCommentary {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: config.llm_api_key.clone(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
        })
    }
}

impl CommentaryGenerator for OpenAiCommentary {
    fn generate(&self, request: &CommentaryRequest<'_>) -> Result<Commentary, CommentaryError> {
        if self.api_key.trim().is_empty() {
            return Err(CommentaryError::Authentication(
                "API key not configured. Please provide an API key.".to_string(),
            ));
        }
        let prompt = render_template(request);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.3,
            "max_tokens": 2000,
        });

        debug!(model = %self.model, "requesting commentary");
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| CommentaryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 => CommentaryError::Authentication(
                    "Invalid API key. Please check your configuration.".to_string(),
                ),
                429 => CommentaryError::RateLimited,
                code @ 500..=599 => CommentaryError::Server(code),
                code => {
                    let text = resp.text().unwrap_or_default();
                    CommentaryError::Transport(format!("HTTP {code}: {text}"))
                }
            });
        }

        let payload: Value = resp
            .json()
            .map_err(|e| CommentaryError::MalformedResponse(e.to_string()))?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                CommentaryError::MalformedResponse("no response content".to_string())
            })?;
        parse_llm_reply(content, request.linter_output)
    }
}

pub fn render_template(request: &CommentaryRequest<'_>) -> String {
    request
        .prompt_template
        .replace("{{code}}", request.code)
        .replace("{{linter_output}}", request.linter_output)
        .replace("{{assignment_context}}", request.assignment_context)
}

fn json_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("json span regex"))
}

/// Pulls the outermost `{...}` out of a chat reply and reads the snake_case
/// fields. Keys that aren't integers and unknown response values are dropped.
pub fn parse_llm_reply(content: &str, linter_output: &str) -> Result<Commentary, CommentaryError> {
    let span = json_span_re()
        .find(content)
        .map(|m| m.as_str())
        .unwrap_or(content);
    let value: Value = serde_json::from_str(span)
        .map_err(|e| CommentaryError::MalformedResponse(e.to_string()))?;
    let obj = value.as_object().ok_or_else(|| {
        CommentaryError::MalformedResponse("expected a JSON object".to_string())
    })?;

    let mut commentary = Commentary {
        static_analysis_output: linter_output.to_string(),
        ..Commentary::default()
    };
    if let Some(lines) = obj.get("line_comments").and_then(|v| v.as_object()) {
        for (k, v) in lines {
            if let (Ok(line), Some(text)) = (k.trim().parse::<i64>(), v.as_str()) {
                commentary.line_comments.insert(line, text.to_string());
            }
        }
    }
    if let Some(items) = obj.get("overall_comments").and_then(|v| v.as_array()) {
        commentary.overall_comments = items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }
    if let Some(responses) = obj.get("feedback_responses").and_then(|v| v.as_object()) {
        for (k, v) in responses {
            let id = k.trim().parse::<FeedbackId>().ok();
            let response = v.as_str().and_then(FeedbackResponse::parse);
            if let (Some(id), Some(response)) = (id, response) {
                commentary.feedback_responses.insert(id, response);
            }
        }
    }
    commentary.reasoning = obj
        .get("reasoning")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    if let Some(items) = obj.get("suggestions").and_then(|v| v.as_array()) {
        commentary.suggestions = items
            .iter()
            .filter(|v| v.is_object())
            .map(parse_suggestion)
            .collect();
    }
    Ok(commentary)
}

fn parse_suggestion(value: &Value) -> SuggestedCriterion {
    let comment = value
        .get("comment")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("AI-suggested feedback");
    let grade = value
        .get("grade")
        .and_then(|v| v.as_f64())
        .filter(|g| g.is_finite() && *g >= 0.0)
        .unwrap_or(0.0);
    SuggestedCriterion {
        comment: comment.to_string(),
        grade,
    }
}

/// Per-student prompt asking for a yes/no/unsure verdict on each catalog item.
pub fn default_prompt(items: &[FeedbackItem]) -> String {
    let criteria = items
        .iter()
        .map(|i| format!("{}. \"{}\"", i.id, i.comment))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"You are a computer science grading assistant. Analyze the following Python code submission and evaluate it against specific feedback criteria.

For each feedback criterion below, respond with "yes", "no", or "unsure":
- **yes**: The feedback clearly applies to this code
- **no**: The feedback does NOT apply to this code
- **unsure**: You're not certain whether this feedback applies

Feedback criteria to evaluate:
{criteria}

Code:
```python
{{{{code}}}}
```

Respond ONLY with valid JSON in this exact format:
{{
  "line_comments": {{
    "3": "Example comment for line 3"
  }},
  "overall_comments": [
    "Brief overall assessment"
  ],
  "feedback_responses": {{
    "1": "yes",
    "2": "no",
    "3": "unsure"
  }},
  "reasoning": "Explanation of your assessment for each feedback criterion"
}}

Guidelines:
- Be objective and specific in your evaluation
- Only mark "yes" if the feedback clearly and definitely applies
- Use "unsure" when the feedback might apply but you need more context
- Provide brief, helpful line_comments for specific issues
- Keep overall_comments concise and constructive"#
    )
}

/// Asks for 3-5 new criteria from the start of each sampled submission.
pub fn suggestion_prompt(samples: &[&str]) -> String {
    let snippets = samples
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let head: String = code.chars().take(SUGGESTION_SAMPLE_CHARS).collect();
            format!("\n--- Student {} ---\n{head}\n", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"You are a computer science grading assistant. Analyze these {count} student code submissions and suggest 3-5 new feedback criteria that would be useful for grading.

Code samples:
{snippets}

Respond ONLY with valid JSON in this format:
{{
  "suggestions": [
    {{"comment": "Brief feedback criterion", "grade": 2}},
    {{"comment": "Another feedback criterion", "grade": 3}}
  ],
  "reasoning": "Why these criteria would be useful"
}}

Focus on common patterns, issues, or good practices you observe across submissions."#,
        count = samples.len()
    )
}

/// Wraps an instructor-written prompt with the code and the reply format.
pub fn custom_prompt(instructions: &str) -> String {
    format!(
        "{instructions}\n\nCode to evaluate:\n```python\n{{{{code}}}}\n```\n\n\
Provide your evaluation as JSON: {{\"overall_comments\": [\"comment1\"], \"line_comments\": {{\"1\": \"comment\"}}, \"reasoning\": \"explanation\"}}"
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub student: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: usize,
    pub errors: usize,
    pub failures: Vec<BatchFailure>,
}

/// Runs `step` for each student in order, sleeping `delay` between requests.
/// A failing student is counted and the rest still run.
pub fn run_batch<F, E>(students: &[String], delay: Duration, mut step: F) -> BatchReport
where
    F: FnMut(&str) -> Result<(), E>,
    E: Display,
{
    let mut report = BatchReport::default();
    for (i, student) in students.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            std::thread::sleep(delay);
        }
        match step(student) {
            Ok(()) => {
                report.success += 1;
                debug!(student = %student, done = report.success, total = students.len(), "commentary generated");
            }
            Err(e) => {
                warn!(student = %student, error = %e, "commentary failed");
                report.errors += 1;
                report.failures.push(BatchFailure {
                    student: student.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
    info!(success = report.success, errors = report.errors, "commentary batch complete");
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_with_surrounding_text_is_parsed() {
        let reply = r#"Sure! Here you go:
{"line_comments": {"3": "rename x", "abc": "dropped", "7": 5},
 "overall_comments": ["Solid work", 4, "Add docstrings"],
 "feedback_responses": {"1": "yes", "2": "maybe", "x": "no", "4": "unsure"},
 "reasoning": "because"}
Thanks."#;
        let c = parse_llm_reply(reply, "lint ok").expect("parse");
        assert_eq!(c.line_comments, BTreeMap::from([(3, "rename x".to_string())]));
        assert_eq!(c.overall_comments, vec!["Solid work", "Add docstrings"]);
        assert_eq!(
            c.feedback_responses,
            BTreeMap::from([(1, FeedbackResponse::Yes), (4, FeedbackResponse::Unsure)])
        );
        assert_eq!(c.reasoning.as_deref(), Some("because"));
        assert_eq!(c.static_analysis_output, "lint ok");
    }

    #[test]
    fn suggestions_fill_in_missing_fields() {
        let reply = r#"{"suggestions": [
            {"comment": "Check edge cases", "grade": 2},
            {"grade": -1},
            "not an object",
            {"comment": "  Name constants  ", "grade": "3"}
        ], "reasoning": "common gaps"}"#;
        let c = parse_llm_reply(reply, "").expect("parse");
        let got: Vec<(&str, f64)> = c
            .suggestions
            .iter()
            .map(|s| (s.comment.as_str(), s.grade))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Check edge cases", 2.0),
                ("AI-suggested feedback", 0.0),
                ("Name constants", 0.0),
            ]
        );
        assert!(c.overall_comments.is_empty());
    }

    #[test]
    fn suggestion_prompt_truncates_samples() {
        let long = "x".repeat(SUGGESTION_SAMPLE_CHARS + 50);
        let p = suggestion_prompt(&[&long, "print(2)"]);
        assert!(p.contains("Analyze these 2 student code submissions"));
        assert!(p.contains(&format!("--- Student 1 ---\n{}\n", "x".repeat(SUGGESTION_SAMPLE_CHARS))));
        assert!(!p.contains(&"x".repeat(SUGGESTION_SAMPLE_CHARS + 1)));
        assert!(p.contains("--- Student 2 ---\nprint(2)\n"));
        assert!(p.contains("\"suggestions\": ["));
    }

    #[test]
    fn non_json_reply_is_malformed() {
        assert!(matches!(
            parse_llm_reply("I cannot help with that", ""),
            Err(CommentaryError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_llm_reply("{not json}", ""),
            Err(CommentaryError::MalformedResponse(_))
        ));
    }

    #[test]
    fn template_variables_are_substituted() {
        let req = CommentaryRequest {
            code: "print(1)",
            linter_output: "E501",
            prompt_template: "{{code}} | {{linter_output}} | {{assignment_context}} | {{code}}",
            assignment_context: "HW1",
        };
        assert_eq!(render_template(&req), "print(1) | E501 | HW1 | print(1)");
    }

    #[test]
    fn prompts_keep_code_placeholder() {
        let items = vec![FeedbackItem {
            id: 7,
            comment: "Use functions".into(),
            grade: 2.0,
        }];
        let p = default_prompt(&items);
        assert!(p.contains("7. \"Use functions\""));
        assert!(p.contains("```python\n{{code}}\n```"));
        assert!(p.contains("\"feedback_responses\": {"));

        let c = custom_prompt("Check naming.");
        assert!(c.starts_with("Check naming.\n\nCode to evaluate:"));
        assert!(c.contains("{{code}}"));
        assert!(c.ends_with("\"reasoning\": \"explanation\"}"));
    }

    #[test]
    fn missing_key_fails_without_network() {
        let config = Config {
            llm_api_key: String::new(),
            llm_base_url: "http://127.0.0.1:9".into(),
            ..Config::default()
        };
        let gen = OpenAiCommentary::new(&config).expect("client");
        let req = CommentaryRequest {
            code: "",
            linter_output: "",
            prompt_template: "",
            assignment_context: "",
        };
        assert!(matches!(
            gen.generate(&req),
            Err(CommentaryError::Authentication(_))
        ));
    }

    #[test]
    fn batch_counts_failures_and_continues() {
        let students: Vec<String> = ["Ann", "Bob", "Cy"].iter().map(|s| s.to_string()).collect();
        let mut seen = Vec::new();
        let report = run_batch(&students, Duration::ZERO, |s| {
            seen.push(s.to_string());
            if s == "Bob" {
                Err(CommentaryError::RateLimited)
            } else {
                Ok(())
            }
        });
        assert_eq!(seen, students);
        assert_eq!(report.success, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.failures[0].student, "Bob");
        assert!(report.failures[0].message.contains("rate limit"));
    }
}
