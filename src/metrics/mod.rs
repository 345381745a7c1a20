// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order creation (accepted, rejected by reason, duration)
// - Payment requests (sent, failed)
// - Ticket issuance and the check-in scanner (scans by outcome,
//   redemptions, undos)
// - Notification delivery failures (best-effort sends)
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_created: IntCounter,
    pub orders_rejected: IntCounterVec,
    pub order_creation_duration: Histogram,

    // Payment Metrics
    pub payment_requests_sent: IntCounter,
    pub payment_request_failures: IntCounter,

    // Check-in Metrics
    pub tickets_generated: IntCounter,
    pub scans_total: IntCounterVec,
    pub redemptions_total: IntCounter,
    pub redemption_undos: IntCounter,

    // Notification Metrics
    pub notification_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total ticket orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("orders_rejected_total", "Order creation attempts rejected"),
            &["reason"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let order_creation_duration = Histogram::with_opts(
            HistogramOpts::new("order_creation_duration_seconds", "Order creation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(order_creation_duration.clone()))?;

        let payment_requests_sent = IntCounter::new(
            "payment_requests_sent_total",
            "Payment requests created and sent",
        )?;
        registry.register(Box::new(payment_requests_sent.clone()))?;

        let payment_request_failures = IntCounter::new(
            "payment_request_failures_total",
            "Per-order failures during payment request processing",
        )?;
        registry.register(Box::new(payment_request_failures.clone()))?;

        let tickets_generated = IntCounter::new(
            "tickets_generated_total",
            "Orders whose tickets were generated and released",
        )?;
        registry.register(Box::new(tickets_generated.clone()))?;

        let scans_total = IntCounterVec::new(
            Opts::new("ticket_scans_total", "Ticket scans by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(scans_total.clone()))?;

        let redemptions_total =
            IntCounter::new("ticket_redemptions_total", "Tickets redeemed at the door")?;
        registry.register(Box::new(redemptions_total.clone()))?;

        let redemption_undos =
            IntCounter::new("redemption_undos_total", "Redemptions reverted by operators")?;
        registry.register(Box::new(redemption_undos.clone()))?;

        let notification_failures = IntCounter::new(
            "notification_failures_total",
            "Best-effort notification sends that failed",
        )?;
        registry.register(Box::new(notification_failures.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_rejected,
            order_creation_duration,
            payment_requests_sent,
            payment_request_failures,
            tickets_generated,
            scans_total,
            redemptions_total,
            redemption_undos,
            notification_failures,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self, duration_secs: f64) {
        self.orders_created.inc();
        self.order_creation_duration.observe(duration_secs);
    }

    pub fn record_order_rejected(&self, reason: &str) {
        self.orders_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_scan(&self, outcome: &str) {
        self.scans_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.registry.gather().len() > 0);
    }

    #[test]
    fn test_record_order_lifecycle() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_created(0.02);
        metrics.record_order_rejected("capacity");
        metrics.record_order_rejected("capacity");

        let gathered = metrics.registry.gather();
        let created = gathered
            .iter()
            .find(|m| m.name() == "orders_created_total")
            .unwrap();
        assert_eq!(created.metric[0].counter.value, Some(1.0));

        let rejected = gathered
            .iter()
            .find(|m| m.name() == "orders_rejected_total")
            .unwrap();
        assert_eq!(rejected.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_record_scans_by_outcome() {
        let metrics = Metrics::new().unwrap();
        metrics.record_scan("valid");
        metrics.record_scan("invalid");
        metrics.record_scan("already_redeemed");

        let gathered = metrics.registry.gather();
        let scans = gathered
            .iter()
            .find(|m| m.name() == "ticket_scans_total")
            .unwrap();
        assert_eq!(scans.metric.len(), 3); // Three different outcome labels
    }
}
