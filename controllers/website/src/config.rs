//! Controller configuration.
//!
//! All settings come from environment variables and are read once at startup.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Runtime settings for the Website Controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace to watch (`None` watches all namespaces)
    pub namespace: Option<String>,
    /// Listen address of the metrics/probe server
    pub metrics_addr: SocketAddr,
    /// Maximum number of sites reconciled at the same time
    pub concurrency: u16,
    /// Quiet period after the last event before a site is reconciled
    pub debounce: Duration,
    /// Delay before a site is retried after a version conflict
    pub conflict_requeue: Duration,
    /// First delay of the error backoff
    pub backoff_min: Duration,
    /// Cap of the error backoff
    pub backoff_max: Duration,
    /// Skip verifying that the Website CRD is installed
    pub skip_crd_check: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            concurrency: 3,
            debounce: Duration::from_secs(1),
            conflict_requeue: Duration::from_secs(1),
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            skip_crd_check: false,
        }
    }
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let metrics_addr = parse_or(&lookup, "METRICS_ADDR", defaults.metrics_addr)?;
        let concurrency = parse_or(&lookup, "RECONCILE_CONCURRENCY", defaults.concurrency)?;
        let debounce = secs_or(&lookup, "RECONCILE_DEBOUNCE_SECS", defaults.debounce)?;
        let conflict_requeue = secs_or(&lookup, "CONFLICT_REQUEUE_SECS", defaults.conflict_requeue)?;
        let backoff_min = secs_or(&lookup, "BACKOFF_MIN_SECS", defaults.backoff_min)?;
        let backoff_max = secs_or(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max)?;
        let skip_crd_check = parse_or(&lookup, "SKIP_CRD_CHECK", defaults.skip_crd_check)?;

        if backoff_min.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "BACKOFF_MIN_SECS must be greater than 0".to_string(),
            ));
        }
        if backoff_max < backoff_min {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MAX_SECS ({}) must not be below BACKOFF_MIN_SECS ({})",
                backoff_max.as_secs(),
                backoff_min.as_secs()
            )));
        }

        Ok(Self {
            namespace,
            metrics_addr,
            concurrency,
            debounce,
            conflict_requeue,
            backoff_min,
            backoff_max,
            skip_crd_check,
        })
    }

    /// Logs the effective configuration.
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Namespace: {}", self.namespace.as_deref().unwrap_or("all namespaces"));
        info!("  Metrics address: {}", self.metrics_addr);
        info!("  Concurrency: {}", self.concurrency);
        info!("  Debounce: {:?}", self.debounce);
        info!("  Conflict requeue: {:?}", self.conflict_requeue);
        info!("  Error backoff: {:?} .. {:?}", self.backoff_min, self.backoff_max);
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{key}={raw:?} is invalid: {e}"))
        }),
    }
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ControllerError> {
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}
