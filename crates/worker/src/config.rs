//! Worker configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tunegen_pipeline::OrchestratorConfig;
use tunegen_provider::api::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Provider API base URL.
    pub provider_url: String,
    /// Bearer token for the provider, if it requires one.
    pub provider_api_key: Option<String>,
    /// Per-request timeout for provider and artifact calls.
    pub provider_timeout: Duration,
    /// Directory materialized artifacts are written to.
    pub artifact_dir: PathBuf,
    /// Credit balance; `None` means unmetered.
    pub generation_credits: Option<u64>,
    pub log_format: LogFormat,
    pub orchestrator: OrchestratorConfig,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                 | Default                      |
    /// |-------------------------|------------------------------|
    /// | `PROVIDER_URL`          | required                     |
    /// | `PROVIDER_API_KEY`      | unset                        |
    /// | `PROVIDER_TIMEOUT_SECS` | `30`                         |
    /// | `ARTIFACT_DIR`          | `./artifacts`                |
    /// | `CONCURRENCY_LIMIT`     | `3`                          |
    /// | `QUEUE_CAPACITY`        | `100`                        |
    /// | `GENERATION_CREDITS`    | unset (unmetered)            |
    /// | `STANDARD_ATTEMPTS`     | `30`                         |
    /// | `STANDARD_POLL_SECS`    | `5`                          |
    /// | `EXTENDED_ATTEMPTS`     | `60`                         |
    /// | `EXTENDED_POLL_SECS`    | `10`                         |
    /// | `NOTIFICATION_TTL_SECS` | `5`                          |
    /// | `LOG_FORMAT`            | `text` (`text` or `json`)    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider_url = get("PROVIDER_URL").ok_or(ConfigError::Missing("PROVIDER_URL"))?;
        if !provider_url.starts_with("http://") && !provider_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "PROVIDER_URL",
                value: provider_url,
                reason: "expected an http(s) URL".into(),
            });
        }

        let defaults = OrchestratorConfig::default();
        let mut orchestrator = defaults.clone();

        orchestrator.concurrency_limit =
            parse_or(&get, "CONCURRENCY_LIMIT", defaults.concurrency_limit)?;
        if orchestrator.concurrency_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "CONCURRENCY_LIMIT",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        orchestrator.queue_capacity = parse_or(&get, "QUEUE_CAPACITY", defaults.queue_capacity)?;

        let standard = &mut orchestrator.profiles.standard;
        standard.attempt_budget = parse_or(&get, "STANDARD_ATTEMPTS", standard.attempt_budget)?;
        standard.poll_interval = secs_or(&get, "STANDARD_POLL_SECS", standard.poll_interval)?;

        let extended = &mut orchestrator.profiles.extended;
        extended.attempt_budget = parse_or(&get, "EXTENDED_ATTEMPTS", extended.attempt_budget)?;
        extended.poll_interval = secs_or(&get, "EXTENDED_POLL_SECS", extended.poll_interval)?;

        orchestrator.notification_ttl =
            secs_or(&get, "NOTIFICATION_TTL_SECS", defaults.notification_ttl)?;

        let log_format = match get("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            None => LogFormat::Text,
            Some(v) if v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: v,
                    reason: "expected `text` or `json`".into(),
                })
            }
        };

        Ok(Self {
            provider_url,
            provider_api_key: get("PROVIDER_API_KEY"),
            provider_timeout: secs_or(&get, "PROVIDER_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?,
            artifact_dir: get("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./artifacts")),
            generation_credits: get("GENERATION_CREDITS")
                .map(|v| parse("GENERATION_CREDITS", v))
                .transpose()?,
            log_format,
            orchestrator,
        })
    }
}

// ---- private helpers ----

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key).map_or(Ok(default), |v| parse(key, v))
}

fn secs_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    get(key).map_or(Ok(default), |v| parse(key, v).map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let config = load(&[("PROVIDER_URL", "https://api.test/v1")]).unwrap();

        assert_eq!(config.provider_url, "https://api.test/v1");
        assert!(config.provider_api_key.is_none());
        assert_eq!(config.provider_timeout, Duration::from_secs(30));
        assert_eq!(config.artifact_dir, PathBuf::from("./artifacts"));
        assert!(config.generation_credits.is_none());
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.orchestrator.concurrency_limit, 3);
        assert_eq!(config.orchestrator.queue_capacity, 100);
        assert_eq!(config.orchestrator.profiles.standard.attempt_budget, 30);
        assert_eq!(config.orchestrator.profiles.extended.attempt_budget, 60);
        assert_eq!(config.orchestrator.notification_ttl, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("PROVIDER_URL", "http://localhost:8080"),
            ("PROVIDER_API_KEY", "secret"),
            ("CONCURRENCY_LIMIT", "5"),
            ("GENERATION_CREDITS", " 12 "),
            ("EXTENDED_POLL_SECS", "20"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(config.provider_api_key.as_deref(), Some("secret"));
        assert_eq!(config.orchestrator.concurrency_limit, 5);
        assert_eq!(config.generation_credits, Some(12));
        assert_eq!(
            config.orchestrator.profiles.extended.poll_interval,
            Duration::from_secs(20)
        );
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn missing_url_is_an_error() {
        assert_matches!(load(&[]), Err(ConfigError::Missing("PROVIDER_URL")));
        assert_matches!(
            load(&[("PROVIDER_URL", "  ")]),
            Err(ConfigError::Missing("PROVIDER_URL"))
        );
    }

    #[test]
    fn malformed_values_are_errors_not_panics() {
        let url = ("PROVIDER_URL", "https://api.test");

        assert_matches!(
            load(&[url, ("CONCURRENCY_LIMIT", "many")]),
            Err(ConfigError::Invalid { key: "CONCURRENCY_LIMIT", .. })
        );
        assert_matches!(
            load(&[url, ("CONCURRENCY_LIMIT", "0")]),
            Err(ConfigError::Invalid { key: "CONCURRENCY_LIMIT", .. })
        );
        assert_matches!(
            load(&[url, ("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid { key: "LOG_FORMAT", .. })
        );
        assert_matches!(
            load(&[("PROVIDER_URL", "ftp://api.test")]),
            Err(ConfigError::Invalid { key: "PROVIDER_URL", .. })
        );
    }
}
