//! Runtime configuration.
//!
//! Loaded from YAML. Every field has a default, so an empty document is a
//! valid configuration. Durations are written the human way (`"5s"`,
//! `"2m"`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use wayfarer_core::ValidationPolicy;

use crate::dependencies::DependencyKey;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Errors loading or checking configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Retry policy for every dependency without an override
    pub retry: RetryPolicy,

    /// Per-dependency retry policies
    pub retry_overrides: BTreeMap<DependencyKey, RetryPolicy>,

    pub breaker: CircuitBreakerConfig,

    pub validation: ValidationPolicy,

    /// Time budget for the automated phases of one planning run
    #[serde(with = "human_duration")]
    pub run_deadline: Duration,

    /// Search queries in flight at once
    pub max_concurrency: usize,

    pub cache: CacheConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            retry_overrides: BTreeMap::new(),
            breaker: CircuitBreakerConfig::default(),
            validation: ValidationPolicy::default(),
            run_deadline: Duration::from_secs(30),
            max_concurrency: 4,
            cache: CacheConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Retry policy for `key`.
    pub fn policy_for(&self, key: &DependencyKey) -> &RetryPolicy {
        self.retry_overrides.get(key).unwrap_or(&self.retry)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        std::iter::once(("retry".to_string(), &self.retry))
            .chain(
                self.retry_overrides
                    .iter()
                    .map(|(key, policy)| (format!("retry_overrides.{key}"), policy)),
            )
            .try_for_each(|(name, policy)| {
                policy
                    .validate()
                    .map_err(|reason| ConfigError::Invalid(format!("{name}: {reason}")))
            })?;

        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.breaker.window.is_zero() {
            return Err(ConfigError::Invalid("breaker.window must be positive".to_string()));
        }
        if !(self.validation.budget_headroom.is_finite() && self.validation.budget_headroom > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "validation.budget_headroom must be positive, got {}",
                self.validation.budget_headroom
            )));
        }
        if self.run_deadline.is_zero() {
            return Err(ConfigError::Invalid("run_deadline must be positive".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Last-known-good result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,

    #[serde(with = "human_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Serde adapter for `"1m 30s"`-style durations.
pub(crate) mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config.run_deadline, Duration::from_secs(30));
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.cooldown, Duration::from_secs(120));
        assert_eq!(config.validation.min_sources, 2);
    }

    #[test]
    fn test_human_durations_and_overrides() {
        let yaml = r#"
retry:
  max_attempts: 4
  per_attempt_timeout: 2s
  base_backoff: 250ms
breaker:
  cooldown: 2m
retry_overrides:
  currency:
    max_attempts: 1
run_deadline: 45s
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.per_attempt_timeout, Duration::from_secs(2));
        assert_eq!(config.retry.base_backoff, Duration::from_millis(250));
        assert_eq!(config.breaker.cooldown, Duration::from_secs(120));
        assert_eq!(config.run_deadline, Duration::from_secs(45));

        assert_eq!(config.policy_for(&DependencyKey::currency()).max_attempts, 1);
        assert_eq!(config.policy_for(&DependencyKey::search()).max_attempts, 4);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = RuntimeConfig::from_yaml("retry:\n  max_attempts: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_override() {
        let yaml = "retry_overrides:\n  search:\n    jitter_fraction: 1.5\n";
        let err = RuntimeConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("retry_overrides.search"));
    }

    #[test]
    fn test_rejects_bad_duration() {
        let err = RuntimeConfig::from_yaml("run_deadline: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_shipped_config_parses() {
        let config =
            RuntimeConfig::from_yaml(include_str!("../../../config/wayfarer.yaml")).unwrap();
        assert_eq!(config.policy_for(&DependencyKey::synthesis()).max_attempts, 2);
        assert_eq!(config.policy_for(&DependencyKey::calculator()).max_attempts, 2);
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_serializes_back_to_yaml() {
        let yaml = serde_yaml::to_string(&RuntimeConfig::default()).unwrap();
        assert!(yaml.contains("run_deadline: 30s"));
        let parsed = RuntimeConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.breaker.window, Duration::from_secs(60));
    }
}
