use std::sync::Arc;
use std::time::Duration;

use super::MetricsRegistry;
use crate::modules::task::model::TaskKey;

/// Records collector loop activity
#[derive(Clone)]
pub struct CollectorMetrics {
    metrics: Arc<MetricsRegistry>,
}

impl CollectorMetrics {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }

    pub fn set_running(&self, running: bool) {
        self.metrics
            .collector_running
            .set(if running { 1.0 } else { 0.0 });
    }

    pub fn record_fetch(&self, key: TaskKey, outcome: &str, elapsed: Duration) {
        let server = key.server_type.to_string();
        let product = key.product_type.to_string();

        self.metrics
            .collector_fetch_total
            .with_label_values(&[&server, &product, outcome])
            .inc();

        self.metrics
            .collector_fetch_duration_seconds
            .with_label_values(&[&server, &product])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_merge(&self, key: TaskKey, inserted: usize, updated: usize) {
        let server = key.server_type.to_string();
        let product = key.product_type.to_string();

        self.metrics
            .collector_records_merged_total
            .with_label_values(&[&server, &product, "insert"])
            .inc_by(inserted as f64);

        self.metrics
            .collector_records_merged_total
            .with_label_values(&[&server, &product, "update"])
            .inc_by(updated as f64);
    }

    pub fn record_cycle_error(&self, kind: &str) {
        self.metrics
            .collector_cycle_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_rotation(&self) {
        self.metrics.collector_rotations_total.inc();
    }
}
