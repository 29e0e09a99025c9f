use crate::types::QuestionId;
use std::env;
use std::str::FromStr;

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub sandbox: SandboxConfig,
    pub reasoning: ReasoningConfig,
    /// Questions every candidate is expected to attempt
    pub expected_question_ids: Vec<QuestionId>,
    pub metrics_port: u16,
}

/// Limits applied to every sandboxed invocation
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub memory_limit_mb: u64,
    pub nano_cpus: i64,
    pub pids_limit: i64,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub max_source_bytes: usize,
    pub max_parallel_tests: usize,
    pub allow_mock_fallback: bool,
    pub python_bin: String,
}

/// External reasoning service; no endpoint means fallback-only
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_ms: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a comma separated id list, skipping junk entries
pub fn parse_question_ids(raw: &str) -> Vec<QuestionId> {
    let mut ids: Vec<QuestionId> = raw
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

impl SandboxConfig {
    pub fn from_env() -> Self {
        Self {
            image: env::var("SANDBOX_IMAGE").unwrap_or_else(|_| "python:3.11-alpine".to_string()),
            memory_limit_mb: env_or("SANDBOX_MEMORY_MB", 128),
            nano_cpus: env_or("SANDBOX_NANO_CPUS", 500_000_000),
            pids_limit: env_or("SANDBOX_PIDS_LIMIT", 64),
            default_timeout_ms: env_or("DEFAULT_TIMEOUT_MS", 5000),
            max_timeout_ms: env_or("MAX_TIMEOUT_MS", 10000),
            max_source_bytes: env_or("MAX_SOURCE_BYTES", 64 * 1024),
            max_parallel_tests: env_or("MAX_PARALLEL_TESTS", 4),
            allow_mock_fallback: env_or("ALLOW_MOCK_FALLBACK", true),
            python_bin: env::var("PYTHON_BIN").unwrap_or_else(|_| "python3".to_string()),
        }
    }

    /// Clamp a requested per-test timeout to the configured ceiling
    pub fn effective_timeout_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|ms| *ms > 0)
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms)
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb * 1024 * 1024
    }
}

impl ReasoningConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env_opt("REASONING_ENDPOINT"),
            api_key: env_opt("REASONING_API_KEY"),
            model: env::var("REASONING_MODEL").unwrap_or_else(|_| "default".to_string()),
            timeout_ms: env_or("REASONING_TIMEOUT_MS", 20000),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            sandbox: SandboxConfig::from_env(),
            reasoning: ReasoningConfig::from_env(),
            expected_question_ids: parse_question_ids(
                &env::var("EXPECTED_QUESTION_IDS").unwrap_or_else(|_| "1,2".to_string()),
            ),
            metrics_port: env_or("METRICS_PORT", 9100),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.sandbox.default_timeout_ms, 5000);
        assert_eq!(config.sandbox.max_timeout_ms, 10000);
        assert_eq!(config.sandbox.memory_limit_mb, 128);
        assert_eq!(config.expected_question_ids, vec![1, 2]);
        assert!(config.reasoning.endpoint.is_none());
    }

    #[test]
    fn test_effective_timeout_is_clamped() {
        let sandbox = SandboxConfig::from_env();
        assert_eq!(sandbox.effective_timeout_ms(None), 5000);
        assert_eq!(sandbox.effective_timeout_ms(Some(0)), 5000);
        assert_eq!(sandbox.effective_timeout_ms(Some(2000)), 2000);
        assert_eq!(sandbox.effective_timeout_ms(Some(60_000)), 10000);
    }

    #[test]
    fn test_parse_question_ids() {
        assert_eq!(parse_question_ids("2, 1,x,2"), vec![1, 2]);
        assert!(parse_question_ids("").is_empty());
    }
}
