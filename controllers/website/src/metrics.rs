//! Prometheus metrics for the reconcile loop.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Reconcile duration buckets in seconds.
const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Metrics recorded by the controller, backed by a private registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconciles: IntCounterVec,
    reconcile_duration: HistogramVec,
    applies: IntCounterVec,
}

impl Metrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciles = IntCounterVec::new(
            Opts::new("website_reconcile_total", "Website reconciliations by outcome"),
            &["outcome"],
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "website_reconcile_duration_seconds",
                "Duration of Website reconciliations in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["outcome"],
        )?;
        let applies = IntCounterVec::new(
            Opts::new("website_apply_total", "Derived resource writes by kind and result"),
            &["kind", "result"],
        )?;

        registry.register(Box::new(reconciles.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(applies.clone()))?;

        Ok(Self {
            registry,
            reconciles,
            reconcile_duration,
            applies,
        })
    }

    /// Records one finished reconciliation.
    pub fn observe_reconcile(&self, outcome: &str, elapsed: Duration) {
        self.reconciles.with_label_values(&[outcome]).inc();
        self.reconcile_duration
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }

    /// Records one apply step of a derived resource.
    pub fn observe_apply(&self, kind: &str, result: &str) {
        self.applies.with_label_values(&[kind, result]).inc();
    }

    /// Number of reconciliations recorded with the given outcome.
    #[cfg(test)]
    pub fn reconcile_count(&self, outcome: &str) -> u64 {
        self.reconciles.with_label_values(&[outcome]).get()
    }

    /// Number of apply steps recorded for the given kind and result.
    #[cfg(test)]
    pub fn apply_count(&self, kind: &str, result: &str) -> u64 {
        self.applies.with_label_values(&[kind, result]).get()
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_rendered() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_reconcile("converged", Duration::from_millis(20));
        metrics.observe_apply("Deployment", "created");
        metrics.observe_apply("Deployment", "created");

        assert_eq!(metrics.reconcile_count("converged"), 1);
        assert_eq!(metrics.apply_count("Deployment", "created"), 2);

        let text = metrics.render().unwrap();
        assert!(text.contains("website_reconcile_total{outcome=\"converged\"} 1"));
        assert!(text.contains("website_apply_total{kind=\"Deployment\",result=\"created\"} 2"));
        assert!(text.contains("website_reconcile_duration_seconds_bucket"));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.observe_reconcile("requeue", Duration::ZERO);
        assert_eq!(b.reconcile_count("requeue"), 0);
    }
}
