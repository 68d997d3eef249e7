//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::config::env::{env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use crate::config::ConfigError;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cluster domain used for APIRule hosts
    pub domain: String,
    /// Requeue interval while the EventMesh subscription is not active (seconds)
    pub requeue_after_secs: u64,
    /// Grace period before an inactive EventMesh subscription is an error (seconds)
    pub activation_timeout_secs: u64,
    /// Upper bound of the mapped EventMesh subscription name
    pub max_subscription_name_length: usize,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciles: u16,
    /// Fibonacci backoff floor for failed reconciliations (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff ceiling for failed reconciliations (seconds)
    pub backoff_max_secs: u64,
    /// Delay before restarting the controller stream after it ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: String,
    /// JWKS endpoint used by the JWT access strategy
    pub jwks_uri: String,
    /// Issuer trusted by the JWT access strategy
    pub trusted_issuer: String,
    /// Whether EventMesh authenticates webhook calls with its own client
    pub feature_flags: FeatureFlags,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            domain: String::new(),
            requeue_after_secs: DEFAULT_REQUEUE_AFTER_SECS,
            activation_timeout_secs: DEFAULT_ACTIVATION_TIMEOUT_SECS,
            max_subscription_name_length: MAX_SUBSCRIPTION_NAME_LENGTH,
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: "text".to_string(),
            jwks_uri: String::new(),
            trusted_issuer: String::new(),
            feature_flags: FeatureFlags::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Returns an error when `DOMAIN` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        use crate::constants::*;
        let config = Self {
            domain: env_var_or_default_str("DOMAIN", ""),
            requeue_after_secs: env_var_or_default(
                "REQUEUE_AFTER_SECS",
                DEFAULT_REQUEUE_AFTER_SECS,
            ),
            activation_timeout_secs: env_var_or_default(
                "ACTIVATION_TIMEOUT_SECS",
                DEFAULT_ACTIVATION_TIMEOUT_SECS,
            ),
            max_subscription_name_length: MAX_SUBSCRIPTION_NAME_LENGTH,
            max_concurrent_reconciles: env_var_or_default(
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
            jwks_uri: env_var_or_default_str("JWKS_URI", ""),
            trusted_issuer: env_var_or_default_str("TRUSTED_ISSUER", ""),
            feature_flags: FeatureFlags::new(env_var_or_default_bool(
                "WEBHOOK_AUTH_ENABLED",
                false,
            )),
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error when a required value is missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::Missing("DOMAIN"));
        }
        Ok(())
    }

    /// Get the requeue interval used while waiting for activation
    pub fn requeue_after_duration(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    /// Get the activation grace period
    pub fn activation_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.activation_timeout_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Feature switches of the reconciler and the EventMesh engine, fixed at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    webhook_auth_enabled: bool,
}

impl FeatureFlags {
    #[must_use]
    pub fn new(webhook_auth_enabled: bool) -> Self {
        Self {
            webhook_auth_enabled,
        }
    }

    #[must_use]
    pub fn webhook_auth_enabled(&self) -> bool {
        self.webhook_auth_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.requeue_after_duration(), Duration::from_secs(2));
        assert_eq!(config.activation_timeout_duration(), Duration::from_secs(30));
        assert_eq!(config.max_subscription_name_length, 50);
        assert!(!config.feature_flags.webhook_auth_enabled());
    }

    #[test]
    fn test_validate_requires_domain() {
        let config = ControllerConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("DOMAIN"))));

        let config = ControllerConfig {
            domain: "example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feature_flags_keep_startup_value() {
        assert!(FeatureFlags::new(true).webhook_auth_enabled());
        assert!(!FeatureFlags::new(false).webhook_auth_enabled());
        assert_eq!(FeatureFlags::default(), FeatureFlags::new(false));
    }
}
