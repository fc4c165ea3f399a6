use std::env;
use std::time::Duration;

use crate::error::{GenieChatError, Result};

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;
const DEFAULT_MAX_RESULT_ROWS: usize = 50;
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8787";

/// Immutable configuration for the chat service, built once at startup and
/// passed to each component at construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub genie: GenieConfig,
    pub http_bind: String,
    /// Raises log verbosity only; no effect on the data flow.
    pub debug_mode: bool,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct GenieConfig {
    pub host: String,
    pub token: String,
    pub space_id: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub max_result_rows: usize,
}

impl Config {
    /// Load configuration from `.env` (if present) and the process
    /// environment. Fails fast on any missing required variable so the
    /// process refuses to start before any external call is attempted.
    pub fn load() -> Result<Self> {
        if dotenvy::dotenv().is_ok() {
            tracing::info!("Loaded .env from current directory");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Tests inject maps here
    /// instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| GenieChatError::Config(format!("{key} is not set")))
        };

        let api_key = required("OPENAI_API_KEY")?;
        let token = required("DATABRICKS_TOKEN")?;
        let host = required("DATABRICKS_HOST")?;
        let space_id = required("GENIE_SPACE_ID")?;

        let poll_interval_ms = parse_or_default(
            lookup("GENIE_POLL_INTERVAL_MS"),
            "GENIE_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?;
        let max_poll_attempts = parse_or_default(
            lookup("GENIE_MAX_POLL_ATTEMPTS"),
            "GENIE_MAX_POLL_ATTEMPTS",
            DEFAULT_MAX_POLL_ATTEMPTS,
        )?;
        let max_result_rows = parse_or_default(
            lookup("GENIE_MAX_RESULT_ROWS"),
            "GENIE_MAX_RESULT_ROWS",
            DEFAULT_MAX_RESULT_ROWS,
        )?;

        let debug_mode = lookup("DEBUG_MODE")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let config = Self {
            openai: OpenAiConfig {
                api_key,
                api_url: lookup("OPENAI_API_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string()),
                model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
            genie: GenieConfig {
                // Trailing slash would break endpoint joins
                host: host.trim_end_matches('/').to_string(),
                token,
                space_id,
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_poll_attempts,
                max_result_rows,
            },
            http_bind: lookup("CHAT_HTTP_BIND").unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string()),
            debug_mode,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.genie.max_poll_attempts == 0 {
            return Err(GenieChatError::Config(
                "GENIE_MAX_POLL_ATTEMPTS cannot be 0".to_string(),
            ));
        }
        if !self.genie.host.starts_with("http://") && !self.genie.host.starts_with("https://") {
            return Err(GenieChatError::Config(format!(
                "DATABRICKS_HOST must be a base URL, got '{}'",
                self.genie.host
            )));
        }
        Ok(())
    }
}

fn parse_or_default<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| GenieChatError::Config(format!("{key} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("DATABRICKS_TOKEN", "dapi-test"),
            ("DATABRICKS_HOST", "https://adb-123.azuredatabricks.net"),
            ("GENIE_SPACE_ID", "space-1"),
        ])
    }

    fn load(env: &HashMap<&str, &str>) -> Result<Config> {
        Config::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn loads_with_all_required_vars_and_defaults() {
        let config = load(&full_env()).expect("full env should load");
        assert_eq!(config.openai.model, "gpt-4");
        assert_eq!(config.genie.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.genie.max_poll_attempts, 30);
        assert_eq!(config.genie.max_result_rows, 50);
        assert_eq!(config.http_bind, "127.0.0.1:8787");
        assert!(!config.debug_mode);
    }

    #[test]
    fn each_missing_required_var_fails() {
        for missing in [
            "OPENAI_API_KEY",
            "DATABRICKS_TOKEN",
            "DATABRICKS_HOST",
            "GENIE_SPACE_ID",
        ] {
            let mut env = full_env();
            env.remove(missing);
            let err = load(&env).expect_err("missing var should fail");
            assert!(
                matches!(err, GenieChatError::Config(ref msg) if msg.contains(missing)),
                "expected Config error naming {missing}, got {err}"
            );
        }
    }

    #[test]
    fn empty_required_var_fails() {
        let mut env = full_env();
        env.insert("DATABRICKS_TOKEN", "");
        assert!(load(&env).is_err());
    }

    #[test]
    fn host_trailing_slash_is_trimmed() {
        let mut env = full_env();
        env.insert("DATABRICKS_HOST", "https://dbx.example.com/");
        let config = load(&env).expect("should load");
        assert_eq!(config.genie.host, "https://dbx.example.com");
    }

    #[test]
    fn overrides_apply() {
        let mut env = full_env();
        env.insert("GENIE_POLL_INTERVAL_MS", "100");
        env.insert("GENIE_MAX_POLL_ATTEMPTS", "5");
        env.insert("DEBUG_MODE", "true");
        let config = load(&env).expect("should load");
        assert_eq!(config.genie.poll_interval, Duration::from_millis(100));
        assert_eq!(config.genie.max_poll_attempts, 5);
        assert!(config.debug_mode);
    }

    #[test]
    fn invalid_numeric_override_fails() {
        let mut env = full_env();
        env.insert("GENIE_MAX_POLL_ATTEMPTS", "lots");
        assert!(load(&env).is_err());
    }

    #[test]
    fn zero_poll_attempts_rejected() {
        let mut env = full_env();
        env.insert("GENIE_MAX_POLL_ATTEMPTS", "0");
        assert!(load(&env).is_err());
    }

    #[test]
    fn non_url_host_rejected() {
        let mut env = full_env();
        env.insert("DATABRICKS_HOST", "adb-123.azuredatabricks.net");
        assert!(load(&env).is_err());
    }
}
