//! Configuration for container clients.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::executor::RetryPolicy;

/// Options applied to every operation of a [`Container`](crate::Container).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerOptions {
    /// Wait before retrying a throttled request when the store gives no hint (ms)
    pub default_retry_delay_ms: u64,
    /// Backoff growth per retry; negative values count as zero
    pub backoff_factor: f64,
    /// Throttling retries before giving up; `None` retries forever
    pub max_retries: Option<u32>,
    /// Total time allowed for one operation including waits (ms)
    pub max_retry_elapsed_ms: Option<u64>,
    /// Default page size for queries
    pub max_item_count: Option<u32>,
    /// Whether reads and deletes of missing items are errors
    pub throw_if_not_found: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            default_retry_delay_ms: 5000,
            backoff_factor: 0.2,
            max_retries: Some(20),
            max_retry_elapsed_ms: None,
            max_item_count: None,
            throw_if_not_found: true,
        }
    }
}

impl ContainerOptions {
    /// Load options from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn with_default_retry_delay(mut self, delay: Duration) -> Self {
        self.default_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_retry_elapsed(mut self, elapsed: Option<Duration>) -> Self {
        self.max_retry_elapsed_ms = elapsed.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_max_item_count(mut self, count: u32) -> Self {
        self.max_item_count = Some(count);
        self
    }

    pub fn with_throw_if_not_found(mut self, throw: bool) -> Self {
        self.throw_if_not_found = throw;
        self
    }

    /// Retry policy described by these options.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            default_retry_delay: Duration::from_millis(self.default_retry_delay_ms),
            backoff_factor: self.backoff_factor.max(0.0),
            max_retries: self.max_retries,
            max_elapsed: self.max_retry_elapsed_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ContainerOptions::default();
        let policy = options.retry_policy();

        assert_eq!(policy.default_retry_delay, Duration::from_secs(5));
        assert_eq!(policy.max_retries, Some(20));
        assert!(options.throw_if_not_found);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let options = ContainerOptions::from_yaml("defaultRetryDelayMs: 250\nmaxItemCount: 20\n").unwrap();

        assert_eq!(options.default_retry_delay_ms, 250);
        assert_eq!(options.max_item_count, Some(20));
        assert_eq!(options.max_retries, Some(20));
    }

    #[test]
    fn test_negative_backoff_factor_is_clamped() {
        let options = ContainerOptions::from_yaml("backoffFactor: -0.5\n").unwrap();
        let policy = options.retry_policy();

        assert_eq!(policy.backoff_factor, 0.0);
        let delays: Vec<Duration> = (0..5).map(|retry| policy.delay_for(retry, None)).collect();
        assert!(delays.iter().all(|d| *d == Duration::from_secs(5)));
    }

    #[test]
    fn test_yaml_round_trip() {
        let options = ContainerOptions::default()
            .with_max_retries(None)
            .with_max_retry_elapsed(Some(Duration::from_secs(30)));

        let yaml = options.to_yaml().unwrap();
        assert_eq!(ContainerOptions::from_yaml(&yaml).unwrap(), options);
    }
}
