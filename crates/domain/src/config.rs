//! Engine configuration loaded from environment variables.

use std::time::Duration;

use crate::money::Money;
use crate::retry::RetryPolicy;

/// How order and payment status updates are checked against their
/// transition tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Only transitions in the table are accepted.
    #[default]
    Strict,
    /// Any change to a different status is accepted and recorded as an
    /// operator override.
    OperatorOverride,
}

impl TransitionPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "override" | "operator_override" => Some(Self::OperatorOverride),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Engine settings with sensible defaults.
///
/// Reads from environment variables:
/// - `ENGINE_MAX_COMMIT_ATTEMPTS`: conflict retries per operation (default: `5`)
/// - `ENGINE_RETRY_BACKOFF_MS`: linear backoff step (default: `10`)
/// - `ENGINE_TRANSITION_POLICY`: `strict` or `override` (default: `strict`)
/// - `ENGINE_DELIVERY_FEE_CENTS`: fee when a create request names none (default: `0`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub transition_policy: TransitionPolicy,
    pub default_delivery_fee: Money,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl EngineConfig {
    /// Loads configuration from the process environment, falling back to
    /// defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup` instead of the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            retry: RetryPolicy {
                max_attempts: lookup("ENGINE_MAX_COMMIT_ATTEMPTS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.retry.max_attempts),
                backoff: lookup("ENGINE_RETRY_BACKOFF_MS")
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff),
            },
            transition_policy: lookup("ENGINE_TRANSITION_POLICY")
                .and_then(|v| TransitionPolicy::parse(&v))
                .unwrap_or(defaults.transition_policy),
            default_delivery_fee: lookup("ENGINE_DELIVERY_FEE_CENTS")
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|cents| *cents >= 0)
                .map(Money::from_cents)
                .unwrap_or(defaults.default_delivery_fee),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            transition_policy: TransitionPolicy::Strict,
            default_delivery_fee: Money::zero(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}
