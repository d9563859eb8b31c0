//! # Prometheus Metrics
//!
//! Counters for the scan → submit pipeline. The console prints them on exit
//! when asked; embedders can gather the registry themselves.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles for one client instance.
#[derive(Clone)]
pub struct ClientMetrics {
    registry: Registry,
    /// Non-empty payloads decoded from camera frames.
    pub payloads_decoded_total: IntCounter,
    /// Payloads that matched no accepted encoding.
    pub payloads_rejected_total: IntCounter,
    /// Requests actually sent to the backend.
    pub submissions_total: IntCounter,
    /// Submissions that ended in a remote or transport failure.
    pub submissions_failed_total: IntCounter,
    /// Triggers dropped because the action was already in flight.
    pub submissions_suppressed_total: IntCounter,
    /// Round-trip latency of backend submissions.
    pub submission_latency_seconds: Histogram,
}

impl ClientMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("arcade".into()), None)
            .expect("failed to create prometheus registry");

        let payloads_decoded_total = counter(
            &registry,
            "payloads_decoded_total",
            "Non-empty QR payloads decoded from camera frames",
        );
        let payloads_rejected_total = counter(
            &registry,
            "payloads_rejected_total",
            "Payloads that matched no accepted encoding",
        );
        let submissions_total = counter(
            &registry,
            "submissions_total",
            "Transaction requests sent to the backend",
        );
        let submissions_failed_total = counter(
            &registry,
            "submissions_failed_total",
            "Transaction requests that failed remotely or in transport",
        );
        let submissions_suppressed_total = counter(
            &registry,
            "submissions_suppressed_total",
            "Triggers ignored because the action was already in flight",
        );

        let submission_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "submission_latency_seconds",
                "Backend round-trip latency for transaction submissions",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(submission_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            payloads_decoded_total,
            payloads_rejected_total,
            submissions_total,
            submissions_failed_total,
            submissions_suppressed_total,
            submission_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("metric creation");
    registry
        .register(Box::new(c.clone()))
        .expect("metric registration");
    c
}

/// Shared handle passed to the scanner and submitter.
pub type SharedMetrics = Arc<ClientMetrics>;
