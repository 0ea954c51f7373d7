//! Controller configuration.
//!
//! Read once at startup from environment variables. Unparseable values fail startup
//! rather than silently falling back to defaults.

use crate::error::ControllerError;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Runtime configuration of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Partition this instance owns (`kubernetes.auth0.com/partition` annotation)
    pub partition: Option<String>,
    /// Requeue interval for settled resources
    pub reconcile_interval: Duration,
    /// Bound on every Management API request
    pub remote_timeout: Duration,
    /// First transient retry delay
    pub backoff_base: Duration,
    /// Cap on transient retry delays
    pub backoff_max: Duration,
    /// How long failures may persist before `Failing` is raised
    pub staleness_budget: Duration,
    /// Concurrent reconciliations per kind
    pub worker_concurrency: u16,
    /// Quiet period before a changed object is reconciled
    pub debounce: Duration,
    /// Port of the metrics and probes server
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            partition: None,
            reconcile_interval: Duration::from_secs(30),
            remote_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            staleness_budget: Duration::from_secs(900),
            worker_concurrency: 3,
            debounce: Duration::from_secs(5),
            metrics_port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            partition: non_empty("PARTITION"),
            reconcile_interval: seconds(&lookup, "RECONCILE_INTERVAL_SECS", defaults.reconcile_interval)?,
            remote_timeout: seconds(&lookup, "REMOTE_TIMEOUT_SECS", defaults.remote_timeout)?,
            backoff_base: seconds(&lookup, "BACKOFF_BASE_SECS", defaults.backoff_base)?,
            backoff_max: seconds(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max)?,
            staleness_budget: seconds(&lookup, "STALENESS_BUDGET_SECS", defaults.staleness_budget)?,
            worker_concurrency: parse(&lookup, "WORKER_CONCURRENCY", defaults.worker_concurrency)?,
            debounce: seconds(&lookup, "DEBOUNCE_SECS", defaults.debounce)?,
            metrics_port: parse(&lookup, "METRICS_PORT", defaults.metrics_port)?,
        };

        if config.backoff_base > config.backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_BASE_SECS ({}) exceeds BACKOFF_MAX_SECS ({})",
                config.backoff_base.as_secs(),
                config.backoff_max.as_secs()
            )));
        }
        if config.worker_concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "WORKER_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Log the effective configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!(
            "  Namespace: {}",
            self.watch_namespace.as_deref().unwrap_or("all namespaces")
        );
        info!(
            "  Partition: {}",
            self.partition.as_deref().unwrap_or("unpartitioned resources")
        );
        info!("  Reconcile interval: {}s", self.reconcile_interval.as_secs());
        info!("  Remote timeout: {}s", self.remote_timeout.as_secs());
        info!(
            "  Backoff: {}s..{}s, staleness budget {}s",
            self.backoff_base.as_secs(),
            self.backoff_max.as_secs(),
            self.staleness_budget.as_secs()
        );
        info!(
            "  Workers per kind: {}, debounce {}s",
            self.worker_concurrency,
            self.debounce.as_secs()
        );
        info!("  Metrics port: {}", self.metrics_port);
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ControllerError> {
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{name} has an invalid value: {raw:?}"))
        }),
        _ => Ok(default),
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ControllerError> {
    parse(lookup, name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.worker_concurrency, 3);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("WATCH_NAMESPACE", "identity"),
            ("PARTITION", "blue"),
            ("BACKOFF_BASE_SECS", "2"),
            ("WORKER_CONCURRENCY", "8"),
            ("METRICS_PORT", "9090"),
        ]))
        .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("identity"));
        assert_eq!(config.partition.as_deref(), Some("blue"));
        assert_eq!(config.backoff_base, Duration::from_secs(2));
        assert_eq!(config.worker_concurrency, 8);
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = Config::from_lookup(lookup(&[("PARTITION", ""), ("METRICS_PORT", " ")])).unwrap();
        assert_eq!(config.partition, None);
        assert_eq!(config.metrics_port, 8080);
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = Config::from_lookup(lookup(&[("RECONCILE_INTERVAL_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("RECONCILE_INTERVAL_SECS")));
    }

    #[test]
    fn test_base_above_max_is_rejected() {
        let err = Config::from_lookup(lookup(&[("BACKOFF_BASE_SECS", "600")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let err = Config::from_lookup(lookup(&[("WORKER_CONCURRENCY", "0")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
