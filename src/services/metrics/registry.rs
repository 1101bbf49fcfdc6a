use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Central metrics registry for the collector service
pub struct MetricsRegistry {
    registry: Registry,

    // HTTP Metrics
    pub http_requests_total: CounterVec,
    pub http_request_duration_seconds: HistogramVec,

    // Collector Metrics
    pub collector_running: Gauge,
    pub collector_fetch_total: CounterVec,
    pub collector_fetch_duration_seconds: HistogramVec,
    pub collector_records_merged_total: CounterVec,
    pub collector_cycle_errors_total: CounterVec,
    pub collector_rotations_total: IntCounter,
}

impl MetricsRegistry {
    pub fn new() -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        // HTTP Metrics
        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests").namespace("market"),
            &["method", "endpoint", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration")
                .namespace("market")
                .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["method", "endpoint"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        // Collector Metrics
        let collector_running = Gauge::with_opts(
            Opts::new("collector_running", "1 while the collector loop is alive").namespace("market"),
        )?;
        registry.register(Box::new(collector_running.clone()))?;

        let collector_fetch_total = CounterVec::new(
            Opts::new("collector_fetch_total", "Market API requests by outcome").namespace("market"),
            &["server_type", "product_type", "outcome"],
        )?;
        registry.register(Box::new(collector_fetch_total.clone()))?;

        let collector_fetch_duration_seconds = HistogramVec::new(
            HistogramOpts::new("collector_fetch_duration_seconds", "Market API request duration")
                .namespace("market")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0]),
            &["server_type", "product_type"],
        )?;
        registry.register(Box::new(collector_fetch_duration_seconds.clone()))?;

        let collector_records_merged_total = CounterVec::new(
            Opts::new("collector_records_merged_total", "Market records written").namespace("market"),
            &["server_type", "product_type", "operation"],
        )?;
        registry.register(Box::new(collector_records_merged_total.clone()))?;

        let collector_cycle_errors_total = CounterVec::new(
            Opts::new("collector_cycle_errors_total", "Collector loop errors by kind").namespace("market"),
            &["kind"],
        )?;
        registry.register(Box::new(collector_cycle_errors_total.clone()))?;

        let collector_rotations_total = IntCounter::with_opts(
            Opts::new("collector_rotations_total", "Completed passes through the plan").namespace("market"),
        )?;
        registry.register(Box::new(collector_rotations_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            collector_running,
            collector_fetch_total,
            collector_fetch_duration_seconds,
            collector_records_merged_total,
            collector_cycle_errors_total,
            collector_rotations_total,
        }))
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
