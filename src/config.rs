use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NimbyError, Result};
use crate::llm::client::MessageOptions;
use crate::schema::AccuracyTable;

/// Text encoding of the dataset file. The REPD is published as Windows-1252.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    Utf8,
    #[default]
    Windows1252,
}

impl FromStr for TextEncoding {
    type Err = NimbyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "windows-1252" | "cp1252" | "1252" => Ok(TextEncoding::Windows1252),
            other => Err(NimbyError::Config(format!("unsupported encoding '{}'", other))),
        }
    }
}

/// What the orchestrator does when one record's model call or validation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole batch and report the failing record.
    Abort,
    /// Log the failure, leave the record out and keep going.
    #[default]
    SkipAndLog,
}

impl FromStr for FailurePolicy {
    type Err = NimbyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip" | "skip_and_log" | "skip-and-log" => Ok(FailurePolicy::SkipAndLog),
            other => Err(NimbyError::Config(format!("unknown failure policy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetConfig {
    pub path: PathBuf,
    pub encoding: TextEncoding,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/repd-q3-oct-2025.csv"),
            encoding: TextEncoding::Windows1252,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// How many filtered records a batch analyses, taken in dataset order.
    pub max_records: usize,
    pub temperature: f32,
    pub timeout: Duration,
    pub analysis_max_tokens: u32,
    pub evaluation_max_tokens: u32,
    pub failure_policy: FailurePolicy,
    pub accuracy_table: AccuracyTable,
    /// Line-delimited JSON file run summaries are appended to.
    pub eval_log_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_records: 15,
            temperature: 1.0,
            timeout: Duration::from_secs(60),
            analysis_max_tokens: 1000,
            evaluation_max_tokens: 150,
            failure_policy: FailurePolicy::SkipAndLog,
            accuracy_table: AccuracyTable::default(),
            eval_log_path: PathBuf::from("eval_log.json"),
        }
    }
}

impl AgentConfig {
    pub fn analysis_options(&self) -> MessageOptions {
        MessageOptions {
            max_tokens: self.analysis_max_tokens,
            temperature: self.temperature,
            timeout: Some(self.timeout),
        }
    }

    pub fn evaluation_options(&self) -> MessageOptions {
        MessageOptions {
            max_tokens: self.evaluation_max_tokens,
            temperature: self.temperature,
            timeout: Some(self.timeout),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .finish()
    }
}

/// Everything a run needs, gathered up front and passed into each component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub dataset: DatasetConfig,
    pub agent: AgentConfig,
    pub provider: ProviderConfig,
}

impl Settings {
    /// Load settings from `REPD_`-prefixed environment variables.
    ///
    /// Required:
    /// - `REPD_API_KEY` (falls back to `CLAUDE_API_KEY`)
    ///
    /// Optional:
    /// - `REPD_CSV_PATH`, `REPD_CSV_ENCODING`
    /// - `REPD_MODEL`, `REPD_BATCH_SIZE`, `REPD_TEMPERATURE`, `REPD_TIMEOUT_SECS`
    /// - `REPD_ANALYSIS_MAX_TOKENS`, `REPD_EVAL_MAX_TOKENS`, `REPD_MAX_RETRIES`
    /// - `REPD_FAILURE_POLICY` (`abort` or `skip`)
    /// - `REPD_ACCURACY_TABLE` (e.g. `certain=100,high=80,medium=40,low=0`)
    /// - `REPD_EVAL_LOG_PATH`
    pub fn from_env(default_model: &str) -> Result<Self> {
        Self::from_lookup(default_model, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(default_model: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("REPD_API_KEY")
            .or_else(|| lookup("CLAUDE_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                NimbyError::Config(
                    "REPD_API_KEY (or CLAUDE_API_KEY) environment variable is required"
                        .to_string(),
                )
            })?;

        let mut dataset = DatasetConfig::default();
        if let Some(path) = lookup("REPD_CSV_PATH") {
            dataset.path = PathBuf::from(path);
        }
        if let Some(encoding) = lookup("REPD_CSV_ENCODING") {
            dataset.encoding = encoding.parse()?;
        }

        let mut agent = AgentConfig::default();
        if let Some(n) = parse_var(&lookup, "REPD_BATCH_SIZE")? {
            agent.max_records = n;
        }
        if let Some(t) = parse_var(&lookup, "REPD_TEMPERATURE")? {
            agent.temperature = t;
        }
        if let Some(secs) = parse_var(&lookup, "REPD_TIMEOUT_SECS")? {
            agent.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var(&lookup, "REPD_ANALYSIS_MAX_TOKENS")? {
            agent.analysis_max_tokens = n;
        }
        if let Some(n) = parse_var(&lookup, "REPD_EVAL_MAX_TOKENS")? {
            agent.evaluation_max_tokens = n;
        }
        if let Some(policy) = lookup("REPD_FAILURE_POLICY") {
            agent.failure_policy = policy.parse()?;
        }
        if let Some(table) = lookup("REPD_ACCURACY_TABLE") {
            agent.accuracy_table = parse_accuracy_table(&table)?;
        }
        if let Some(path) = lookup("REPD_EVAL_LOG_PATH") {
            agent.eval_log_path = PathBuf::from(path);
        }

        let model = lookup("REPD_MODEL").unwrap_or_else(|| default_model.to_string());
        let mut provider = ProviderConfig::new(api_key, model);
        provider.timeout = agent.timeout;
        if let Some(n) = parse_var(&lookup, "REPD_MAX_RETRIES")? {
            provider.max_retries = n;
        }

        Ok(Self {
            dataset,
            agent,
            provider,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| NimbyError::Config(format!("{} has invalid value '{}': {}", key, raw, e)))
        })
        .transpose()
}

/// Parses `label=score` pairs. Labels not mentioned keep their default score.
pub fn parse_accuracy_table(raw: &str) -> Result<AccuracyTable> {
    let mut table = AccuracyTable::default();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (label, score) = pair
            .split_once('=')
            .ok_or_else(|| NimbyError::Config(format!("accuracy table entry '{}' is not label=score", pair)))?;
        let score: f64 = score
            .trim()
            .parse()
            .map_err(|_| NimbyError::Config(format!("accuracy score '{}' is not a number", score)))?;
        match label.trim() {
            "certain" => table.certain = score,
            "high" => table.high = score,
            "medium" => table.medium = score,
            "low" => table.low = score,
            other => {
                return Err(NimbyError::Config(format!(
                    "unknown accuracy label '{}'",
                    other
                )))
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_api_key_is_required() {
        let err = Settings::from_lookup("m", lookup_from(&[])).unwrap_err();
        assert!(matches!(err, NimbyError::Config(_)));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup("claude", lookup_from(&[("CLAUDE_API_KEY", "k")])).unwrap();
        assert_eq!(settings.provider.api_key, "k");
        assert_eq!(settings.provider.model, "claude");
        assert_eq!(settings.dataset.encoding, TextEncoding::Windows1252);
        assert_eq!(settings.agent.max_records, 15);
        assert_eq!(settings.agent.failure_policy, FailurePolicy::SkipAndLog);
        assert_eq!(settings.agent.accuracy_table, AccuracyTable::default());
        assert_eq!(settings.agent.evaluation_options().max_tokens, 150);
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(
            "claude",
            lookup_from(&[
                ("REPD_API_KEY", "k"),
                ("REPD_CSV_ENCODING", "utf-8"),
                ("REPD_BATCH_SIZE", "2"),
                ("REPD_TIMEOUT_SECS", "5"),
                ("REPD_FAILURE_POLICY", "abort"),
                ("REPD_ACCURACY_TABLE", "certain=90, low=10"),
                ("REPD_MODEL", "other-model"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.dataset.encoding, TextEncoding::Utf8);
        assert_eq!(settings.agent.max_records, 2);
        assert_eq!(settings.agent.timeout, Duration::from_secs(5));
        assert_eq!(settings.provider.timeout, Duration::from_secs(5));
        assert_eq!(settings.agent.failure_policy, FailurePolicy::Abort);
        assert_eq!(settings.agent.accuracy_table.certain, 90.0);
        assert_eq!(settings.agent.accuracy_table.high, 80.0);
        assert_eq!(settings.agent.accuracy_table.low, 10.0);
        assert_eq!(settings.provider.model, "other-model");
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = Settings::from_lookup(
            "m",
            lookup_from(&[("REPD_API_KEY", "k"), ("REPD_BATCH_SIZE", "lots")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("REPD_BATCH_SIZE"));
        assert!(parse_accuracy_table("great=100").is_err());
        assert!(parse_accuracy_table("high").is_err());
    }

    #[test]
    fn test_provider_debug_redacts_key() {
        let provider = ProviderConfig::new("sk-secret", "m");
        assert!(!format!("{:?}", provider).contains("sk-secret"));
    }
}
