use crate::core::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_DEBOUNCE_MS: &str = "AGENTCONF_DEBOUNCE_MS";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "AGENTCONF_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "AGENTCONF_RETRY_BASE_DELAY_MS";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "AGENTCONF_RETRY_MAX_DELAY_MS";
pub const ENV_OPERATION_RETENTION_MS: &str = "AGENTCONF_OPERATION_RETENTION_MS";
pub const ENV_MAX_OPERATIONS: &str = "AGENTCONF_MAX_OPERATIONS";

/// Configuration for automatic retries of failed saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of automatic retries after the initial attempt.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Tunables of a collection store.
///
/// Loadable from JSON (missing keys fall back to defaults) and overridable
/// through `AGENTCONF_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorePolicy {
    /// Quiet period after the last mutation before changes are written.
    pub debounce_ms: u64,
    pub retry: RetryPolicy,
    /// How long settled operations stay in the pending operation log.
    pub operation_retention_ms: u64,
    /// Soft cap on the pending operation log; only settled entries are evicted.
    pub max_operations: usize,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            retry: RetryPolicy::default(),
            operation_retention_ms: 60_000,
            max_operations: 100,
        }
    }
}

impl StorePolicy {
    pub fn debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn max_retry_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn retry_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.retry.base_delay_ms = base_delay_ms;
        self
    }

    pub fn retry_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.retry.max_delay_ms = max_delay_ms;
        self
    }

    pub fn operation_retention_ms(mut self, retention_ms: u64) -> Self {
        self.operation_retention_ms = retention_ms;
        self
    }

    pub fn max_operations(mut self, max_operations: usize) -> Self {
        self.max_operations = max_operations;
        self
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn operation_retention(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.operation_retention_ms).unwrap_or(i64::MAX))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let policy: Self = serde_json::from_str(json)
            .map_err(|err| StoreError::Config(format!("invalid store policy: {err}")))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            StoreError::Config(format!(
                "Failed to read store policy '{}': {}",
                path.display(),
                err
            ))
        })?;
        Self::from_json_str(&raw)
    }

    /// Applies `AGENTCONF_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(&lookup, ENV_DEBOUNCE_MS)? {
            self.debounce_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_RETRY_MAX_ATTEMPTS)? {
            self.retry.max_attempts = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_RETRY_BASE_DELAY_MS)? {
            self.retry.base_delay_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_RETRY_MAX_DELAY_MS)? {
            self.retry.max_delay_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_OPERATION_RETENTION_MS)? {
            self.operation_retention_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_MAX_OPERATIONS)? {
            self.max_operations = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts > 0 && self.retry.base_delay_ms == 0 {
            return Err(StoreError::Config(
                "retry.base_delay_ms must be greater than 0 when retries are enabled".to_string(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(StoreError::Config(
                "retry.max_delay_ms cannot be less than retry.base_delay_ms".to_string(),
            ));
        }

        if self.max_operations == 0 {
            return Err(StoreError::Config(
                "max_operations must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| StoreError::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_policy() {
        let policy = StorePolicy::default();
        assert_eq!(policy.debounce_ms, 500);
        assert_eq!(policy.retry.max_attempts, 3);
        assert_eq!(policy.retry.base_delay_ms, 1_000);
        assert_eq!(policy.operation_retention_ms, 60_000);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let policy = StorePolicy::default()
            .debounce_ms(250)
            .max_retry_attempts(5)
            .retry_base_delay_ms(10)
            .operation_retention_ms(5_000);

        assert_eq!(policy.debounce_window(), Duration::from_millis(250));
        assert_eq!(policy.retry.max_attempts, 5);
        assert_eq!(policy.retry.base_delay_ms, 10);
        assert_eq!(policy.operation_retention(), chrono::Duration::seconds(5));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let policy = StorePolicy::from_json_str(r#"{ "debounce_ms": 50, "retry": { "max_attempts": 1 } }"#)
            .expect("parse policy");
        assert_eq!(policy.debounce_ms, 50);
        assert_eq!(policy.retry.max_attempts, 1);
        assert_eq!(policy.retry.base_delay_ms, 1_000);
        assert_eq!(policy.max_operations, 100);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_DEBOUNCE_MS, "20"),
            (ENV_RETRY_BASE_DELAY_MS, "5"),
            (ENV_RETRY_MAX_DELAY_MS, ""),
        ]);
        let policy = StorePolicy::default()
            .with_overrides_from(|key| vars.get(key).map(|value| value.to_string()))
            .expect("apply overrides");
        assert_eq!(policy.debounce_ms, 20);
        assert_eq!(policy.retry.base_delay_ms, 5);
        assert_eq!(policy.retry.max_delay_ms, 30_000);

        let err = StorePolicy::default()
            .with_overrides_from(|key| (key == ENV_MAX_OPERATIONS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_validate() {
        assert!(StorePolicy::default().max_operations(0).validate().is_err());
        assert!(
            StorePolicy::default()
                .retry_base_delay_ms(2_000)
                .retry_max_delay_ms(1_000)
                .validate()
                .is_err()
        );
        assert!(
            StorePolicy::default()
                .max_retry_attempts(0)
                .retry_base_delay_ms(0)
                .retry_max_delay_ms(0)
                .validate()
                .is_ok()
        );
    }
}
