use crate::archive::ArchiveOptions;

/// Process settings, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// History entries kept; older ones are dropped.
    pub max_history: usize,
    /// Same-student same-type changes closer than this collapse into one entry.
    pub coalesce_ms: i64,
    /// Spacing between commentary requests in a batch.
    pub request_delay_ms: u64,
    pub code_extensions: Vec<String>,
    pub default_max_points: f64,
    // --- commentary endpoint ---
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_history: 50,
            coalesce_ms: 1000,
            request_delay_ms: 1000,
            code_extensions: vec!["py".to_string()],
            default_max_points: 20.0,
            llm_api_key: String::new(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_timeout_secs: 60,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_history: env_parse("GRADINGD_MAX_HISTORY")
                .filter(|v| *v > 0)
                .unwrap_or(default.max_history),
            coalesce_ms: env_parse("GRADINGD_COALESCE_MS")
                .filter(|v| *v >= 0)
                .unwrap_or(default.coalesce_ms),
            request_delay_ms: env_parse("GRADINGD_REQUEST_DELAY_MS")
                .unwrap_or(default.request_delay_ms),
            code_extensions: env_string("GRADINGD_CODE_EXTENSIONS")
                .map(|v| parse_extensions(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(default.code_extensions),
            default_max_points: env_parse("GRADINGD_DEFAULT_MAX_POINTS")
                .filter(|v: &f64| v.is_finite() && *v > 0.0)
                .unwrap_or(default.default_max_points),
            llm_api_key: env_string("GRADINGD_LLM_API_KEY")
                .or_else(|| env_string("OPENAI_API_KEY"))
                .unwrap_or(default.llm_api_key),
            llm_base_url: env_string("GRADINGD_LLM_BASE_URL").unwrap_or(default.llm_base_url),
            llm_model: env_string("GRADINGD_LLM_MODEL").unwrap_or(default.llm_model),
            llm_timeout_secs: env_parse("GRADINGD_LLM_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(default.llm_timeout_secs),
        }
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            code_extensions: self.code_extensions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_normalized() {
        assert_eq!(parse_extensions(" .PY, java,,"), vec!["py", "java"]);
        assert!(parse_extensions(" , ").is_empty());
    }
}
