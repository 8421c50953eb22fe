//! Prometheus metrics for the queue service.
//!
//! Metrics live in a registry owned by [`ServiceMetrics`] rather than the
//! process-global default, so several instances (one per test router, for
//! example) never collide on registration.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Outcome label values for `claim_requests_total`
pub const CLAIM_OUTCOME_CLAIMED: &str = "claimed";
pub const CLAIM_OUTCOME_EMPTY: &str = "empty";
pub const CLAIM_OUTCOME_ERROR: &str = "error";

/// Service metrics for observability
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    pub messages_published_total: IntCounter,
    pub messages_claimed_total: IntCounter,
    pub claim_requests_total: IntCounterVec,
    pub messages_removed_total: IntCounter,
    pub errors_total: IntCounterVec,
    pub http_request_duration: HistogramVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some("lean_queue".to_string()), None)?;

        let messages_published_total = IntCounter::new(
            "messages_published_total",
            "Messages accepted by publish",
        )?;
        let messages_claimed_total = IntCounter::new(
            "messages_claimed_total",
            "Messages handed out under a lease",
        )?;
        let claim_requests_total = IntCounterVec::new(
            Opts::new("claim_requests_total", "Reserve requests by outcome"),
            &["outcome"],
        )?;
        let messages_removed_total = IntCounter::new(
            "messages_removed_total",
            "Messages deleted by remove",
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Queue operation failures by kind"),
            &["kind"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["method", "path", "status"],
        )?;

        registry.register(Box::new(messages_published_total.clone()))?;
        registry.register(Box::new(messages_claimed_total.clone()))?;
        registry.register(Box::new(claim_requests_total.clone()))?;
        registry.register(Box::new(messages_removed_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Arc::new(Self {
            registry,
            messages_published_total,
            messages_claimed_total,
            claim_requests_total,
            messages_removed_total,
            errors_total,
            http_request_duration,
        }))
    }

    pub fn record_publish(&self) {
        self.messages_published_total.inc();
    }

    /// Record a successful reserve call that handed out `claimed` messages
    pub fn record_claim(&self, claimed: usize) {
        let outcome = if claimed == 0 {
            CLAIM_OUTCOME_EMPTY
        } else {
            CLAIM_OUTCOME_CLAIMED
        };
        self.claim_requests_total
            .with_label_values(&[outcome])
            .inc();
        self.messages_claimed_total.inc_by(claimed as u64);
    }

    pub fn record_claim_failure(&self) {
        self.claim_requests_total
            .with_label_values(&[CLAIM_OUTCOME_ERROR])
            .inc();
    }

    /// Only deletions of an existing message are counted
    pub fn record_remove(&self, existed: bool) {
        if existed {
            self.messages_removed_total.inc();
        }
    }

    pub fn record_error(&self, kind: &str) {
        self.errors_total.with_label_values(&[kind]).inc();
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        let status = status.to_string();
        self.http_request_duration
            .with_label_values(&[method, path, status.as_str()])
            .observe(duration.as_secs_f64());
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
