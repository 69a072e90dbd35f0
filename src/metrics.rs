use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::lookup::ExecutorPolicy;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize Prometheus recorder and expose static gauges for the
    /// lookup policy currently in force.
    pub fn init(policy: &ExecutorPolicy) -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let builder = PrometheusBuilder::new();

        let handle = builder.install_recorder()?;

        gauge!("lookup_overall_timeout_ms").set(policy.overall_timeout.as_millis() as f64);
        gauge!("lookup_per_provider_timeout_ms")
            .set(policy.per_provider_timeout.as_millis() as f64);
        gauge!("lookup_cache_ttl_secs").set(policy.cache_ttl.as_secs() as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
