//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Admission webhook is validating Composable templates
    /// When false the reconciler validates templates itself before resolving them
    pub admission_control: bool,
    /// Maximum concurrent reconciliations
    /// Limits how many Composables can be reconciled simultaneously
    pub max_concurrent_reconciliations: u16,
    /// Fibonacci backoff starting value (seconds)
    /// First requeue delay after a retryable failure
    pub backoff_min_secs: u64,
    /// Fibonacci backoff maximum value (seconds)
    pub backoff_max_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// HTTP server port for metrics and probes
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            admission_control: false,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        Self {
            admission_control: env_var_or_default_bool(&lookup, "ADMISSION_CONTROL", false),
            max_concurrent_reconciliations: env_var_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            backoff_min_secs: env_var_or_default(
                &lookup,
                "RECONCILE_BACKOFF_MIN_SECS",
                DEFAULT_BACKOFF_MIN_SECS,
            ),
            backoff_max_secs: env_var_or_default(
                &lookup,
                "RECONCILE_BACKOFF_MAX_SECS",
                DEFAULT_BACKOFF_MAX_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            metrics_port: env_var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str(&lookup, "LOG_FORMAT", "text"),
        }
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.trim().to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}
