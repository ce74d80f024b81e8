use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::content::validation::MismatchPolicy;
use crate::resilience::RetryPolicy;

/// Retry tuning per call site. All three go through the same orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResilienceTuning {
    pub quiz: RetryPolicy,
    pub plan: RetryPolicy,
    pub sync: RetryPolicy,
}

impl Default for ResilienceTuning {
    fn default() -> Self {
        Self {
            quiz: RetryPolicy::content_fetch(),
            plan: RetryPolicy::plan_fetch(),
            sync: RetryPolicy::sync_replay(),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub remote_url: String,
    pub store_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
    pub tuning: ResilienceTuning,
    pub mismatch_policy: MismatchPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ResilienceTuning::default();

        let quiz = defaults
            .quiz
            .with_max_attempts(parse_or(&lookup, "QUIZ_FETCH_ATTEMPTS", defaults.quiz.max_attempts)?)
            .with_timeout(millis_or(
                &lookup,
                "QUIZ_FETCH_TIMEOUT_MS",
                defaults.quiz.per_attempt_timeout,
            )?)
            .with_backoff(millis_or(
                &lookup,
                "QUIZ_FETCH_BACKOFF_MS",
                defaults.quiz.backoff,
            )?);
        let plan = defaults.plan.with_timeout(millis_or(
            &lookup,
            "PLAN_FETCH_TIMEOUT_MS",
            defaults.plan.per_attempt_timeout,
        )?);
        let sync = defaults.sync.with_timeout(millis_or(
            &lookup,
            "SYNC_TIMEOUT_MS",
            defaults.sync.per_attempt_timeout,
        )?);

        Ok(Config {
            remote_url: require(&lookup, "COACH_REMOTE_URL")?,
            store_dir: lookup("COACH_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".coach")),
            port: parse_or(&lookup, "PORT", 8787)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            tuning: ResilienceTuning { quiz, plan, sync },
            mismatch_policy: match lookup("MISMATCH_POLICY") {
                Some(raw) => raw.parse().map_err(|e: String| anyhow!(e))?,
                None => MismatchPolicy::default(),
            },
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Ok(Duration::from_millis(parse_or(lookup, key, default_ms)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config =
            Config::from_lookup(lookup_from(&[("COACH_REMOTE_URL", "http://backend")])).unwrap();
        assert_eq!(config.port, 8787);
        assert_eq!(config.store_dir, PathBuf::from(".coach"));
        assert_eq!(config.tuning, ResilienceTuning::default());
        assert_eq!(config.mismatch_policy, MismatchPolicy::Marker);
    }

    #[test]
    fn test_missing_remote_url_fails() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("COACH_REMOTE_URL"));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("COACH_REMOTE_URL", "http://backend"),
            ("PORT", "9000"),
            ("QUIZ_FETCH_ATTEMPTS", "6"),
            ("QUIZ_FETCH_TIMEOUT_MS", "2500"),
            ("PLAN_FETCH_TIMEOUT_MS", "120000"),
            ("MISMATCH_POLICY", "overlap"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.tuning.quiz.max_attempts, 6);
        assert_eq!(
            config.tuning.quiz.per_attempt_timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(config.tuning.plan.max_attempts, 1);
        assert_eq!(
            config.tuning.plan.per_attempt_timeout,
            Duration::from_secs(120)
        );
        assert_eq!(config.mismatch_policy, MismatchPolicy::Overlap);
    }

    #[test]
    fn test_invalid_number_fails() {
        let err = Config::from_lookup(lookup_from(&[
            ("COACH_REMOTE_URL", "http://backend"),
            ("QUIZ_FETCH_ATTEMPTS", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("QUIZ_FETCH_ATTEMPTS"));
    }

    #[test]
    fn test_invalid_policy_fails() {
        assert!(Config::from_lookup(lookup_from(&[
            ("COACH_REMOTE_URL", "http://backend"),
            ("MISMATCH_POLICY", "paranoid"),
        ]))
        .is_err());
    }
}
