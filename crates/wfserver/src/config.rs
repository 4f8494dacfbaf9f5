//! Service configuration from environment variables.
//!
//! A `.env` file in the working directory is loaded first when present.

use std::env;
use std::time::Duration;
use wfactivities::DEFAULT_ACTIVITY_DELAY;
use wfruntime::{RetryPolicy, RuntimeConfig};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub dapr_grpc_port: u16,
    pub dapr_http_port: u16,
    /// Record per-activity history in workflow results
    pub debug_mode: bool,
    pub activity_delay: Duration,
    pub activity_timeout: Option<Duration>,
    pub activity_max_attempts: u32,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let debug_mode = lookup("DEBUG_MODE")
            .or_else(|| lookup("DEBUG"))
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("APP_PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            dapr_grpc_port: lookup("DAPR_GRPC_PORT").and_then(|v| v.parse().ok()).unwrap_or(50001),
            dapr_http_port: lookup("DAPR_HTTP_PORT").and_then(|v| v.parse().ok()).unwrap_or(3500),
            debug_mode,
            activity_delay: parsed("ACTIVITY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_ACTIVITY_DELAY),
            activity_timeout: parsed("ACTIVITY_TIMEOUT_MS").map(Duration::from_millis),
            activity_max_attempts: parsed("ACTIVITY_MAX_ATTEMPTS")
                .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(1),
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        let retry_policy = if self.activity_max_attempts > 1 {
            RetryPolicy {
                max_attempts: self.activity_max_attempts,
                ..RetryPolicy::default()
            }
        } else {
            RetryPolicy::none()
        };

        RuntimeConfig {
            activity_timeout: self.activity_timeout,
            retry_policy,
            ..RuntimeConfig::default()
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.dapr_grpc_port, 50001);
        assert_eq!(config.dapr_http_port, 3500);
        assert!(!config.debug_mode);
        assert_eq!(config.activity_delay, Duration::from_millis(2000));
        assert!(config.activity_timeout.is_none());
        assert_eq!(config.runtime_config().retry_policy.max_attempts, 1);
    }

    #[test]
    fn test_debug_flag_accepts_legacy_name() {
        assert!(config(&[("DEBUG_MODE", "TRUE")]).debug_mode);
        assert!(config(&[("DEBUG", "true")]).debug_mode);
        assert!(!config(&[("DEBUG_MODE", "false"), ("DEBUG", "true")]).debug_mode);
        assert!(!config(&[("DEBUG_MODE", "1")]).debug_mode);
    }

    #[test]
    fn test_runtime_settings() {
        let config = config(&[
            ("APP_PORT", "9000"),
            ("ACTIVITY_DELAY_MS", "10"),
            ("ACTIVITY_TIMEOUT_MS", "500"),
            ("ACTIVITY_MAX_ATTEMPTS", "4"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.activity_delay, Duration::from_millis(10));

        let runtime = config.runtime_config();
        assert_eq!(runtime.activity_timeout, Some(Duration::from_millis(500)));
        assert_eq!(runtime.retry_policy.max_attempts, 4);
        assert_eq!(runtime.retry_policy.delay_ms, 1000);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config(&[("APP_PORT", "http"), ("ACTIVITY_MAX_ATTEMPTS", "0")]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.activity_max_attempts, 1);
    }
}
