//! # Prometheus Metrics
//!
//! Operational counters for the signing node, scraped at `/metrics`.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Transactions signed successfully.
    pub signatures_total: IntCounter,
    /// Signing attempts that failed, labelled by error kind.
    pub sign_failures_total: IntCounterVec,
    /// Authentication attempts, labelled `success` or `failure`.
    pub authentications_total: IntCounterVec,
    /// The ledger's last accepted nonce (-1 while the ledger is empty).
    pub last_accepted_nonce: IntGauge,
    /// Latency of the full signing path in seconds.
    pub sign_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("warden".into()), None)
            .expect("failed to create prometheus registry");

        let signatures_total =
            IntCounter::new("signatures_total", "Transactions signed successfully")
                .expect("metric creation");
        registry
            .register(Box::new(signatures_total.clone()))
            .expect("metric registration");

        let sign_failures_total = IntCounterVec::new(
            Opts::new("sign_failures_total", "Signing attempts that failed"),
            &["kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(sign_failures_total.clone()))
            .expect("metric registration");

        let authentications_total = IntCounterVec::new(
            Opts::new("authentications_total", "User authentication attempts"),
            &["result"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(authentications_total.clone()))
            .expect("metric registration");

        let last_accepted_nonce = IntGauge::new(
            "last_accepted_nonce",
            "Last nonce accepted by the ledger (-1 while empty)",
        )
        .expect("metric creation");
        last_accepted_nonce.set(-1);
        registry
            .register(Box::new(last_accepted_nonce.clone()))
            .expect("metric registration");

        let sign_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sign_latency_seconds",
                "Validation, durable nonce commit, and signing latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(sign_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            signatures_total,
            sign_failures_total,
            authentications_total,
            last_accepted_nonce,
            sign_latency_seconds,
        }
    }

    /// Record the outcome of one `sign` call.
    pub fn record_sign(&self, result: Result<(), &'static str>) {
        match result {
            Ok(()) => self.signatures_total.inc(),
            Err(kind) => self.sign_failures_total.with_label_values(&[kind]).inc(),
        }
    }

    /// Mirror the ledger position. Nonces consumed by failed signs count.
    pub fn set_last_accepted(&self, last_accepted: Option<u64>) {
        let value = last_accepted.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        self.last_accepted_nonce.set(value);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
