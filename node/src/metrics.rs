//! # Prometheus Metrics
//!
//! Operational metrics for the ledger service, scraped at `/metrics` on the
//! metrics listener. Everything is registered in a dedicated registry with
//! the `prism` prefix so nothing collides with the default global registry.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use prism_contracts::{EventRecord, LedgerEvent};

/// Prometheus handles for the node. Cloning shares the underlying metrics.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub ledgers_created_total: IntCounter,
    pub transfers_total: IntCounter,
    pub claims_total: IntCounter,
    /// Rejected API operations, labelled by error kind.
    pub rejected_operations_total: IntCounterVec,
    pub tokens_burned_total: IntCounter,
    pub reflection_pooled_total: IntCounter,
    pub tokens_claimed_total: IntCounter,
    /// Ledgers currently registered.
    pub ledger_count: IntGauge,
    /// Latency of ledger operations as seen by the API, in seconds.
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("prism".into()), None)
            .expect("failed to create prometheus registry");

        let ledgers_created_total =
            IntCounter::new("ledgers_created_total", "Total number of ledgers created")
                .expect("metric creation");
        registry
            .register(Box::new(ledgers_created_total.clone()))
            .expect("metric registration");

        let transfers_total = IntCounter::new(
            "transfers_total",
            "Total number of transfers applied, delegated ones included",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transfers_total.clone()))
            .expect("metric registration");

        let claims_total = IntCounter::new("claims_total", "Total number of successful claims")
            .expect("metric creation");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("metric registration");

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rejected_operations_total",
                "Ledger operations rejected by the engine",
            ),
            &["kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejected_operations_total.clone()))
            .expect("metric registration");

        let tokens_burned_total = IntCounter::new(
            "tokens_burned_total",
            "Smallest units destroyed by burn fees",
        )
        .expect("metric creation");
        registry
            .register(Box::new(tokens_burned_total.clone()))
            .expect("metric registration");

        let reflection_pooled_total = IntCounter::new(
            "reflection_pooled_total",
            "Smallest units moved into reflection pools",
        )
        .expect("metric creation");
        registry
            .register(Box::new(reflection_pooled_total.clone()))
            .expect("metric registration");

        let tokens_claimed_total = IntCounter::new(
            "tokens_claimed_total",
            "Smallest units paid out of reflection pools",
        )
        .expect("metric creation");
        registry
            .register(Box::new(tokens_claimed_total.clone()))
            .expect("metric registration");

        let ledger_count = IntGauge::new("ledger_count", "Number of registered ledgers")
            .expect("metric creation");
        registry
            .register(Box::new(ledger_count.clone()))
            .expect("metric registration");

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Ledger operation latency in seconds",
            )
            .buckets(vec![
                0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            ledgers_created_total,
            transfers_total,
            claims_total,
            rejected_operations_total,
            tokens_burned_total,
            reflection_pooled_total,
            tokens_claimed_total,
            ledger_count,
            operation_latency_seconds,
        }
    }

    /// Folds committed ledger events into the counters.
    pub fn observe_events(&self, events: &[EventRecord]) {
        for record in events {
            match &record.event {
                LedgerEvent::LedgerCreated { .. } => self.ledgers_created_total.inc(),
                LedgerEvent::Burned { amount, .. } => self.tokens_burned_total.inc_by(*amount),
                LedgerEvent::ReflectionPooled { amount, .. } => {
                    self.reflection_pooled_total.inc_by(*amount)
                }
                LedgerEvent::Transferred { .. } => self.transfers_total.inc(),
                LedgerEvent::Claimed { amount, .. } => {
                    self.claims_total.inc();
                    self.tokens_claimed_total.inc_by(*amount);
                }
                LedgerEvent::Approval { .. } | LedgerEvent::OwnershipTransferred { .. } => {}
            }
        }
    }

    pub fn record_rejection(&self, kind: &str) {
        self.rejected_operations_total
            .with_label_values(&[kind])
            .inc();
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

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

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
