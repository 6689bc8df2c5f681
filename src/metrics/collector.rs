//! Metrics collection using Prometheus
//!
//! Counters and gauges for collection runs, per-player fetches, report
//! generation and delivery.

use crate::types::{OutputFormat, Period};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome label for one player's fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    Unranked,
    Failed,
}

impl FetchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchOutcome::Success => "success",
            FetchOutcome::Unranked => "unranked",
            FetchOutcome::Failed => "failed",
        }
    }
}

/// Main metrics collector for the tracker
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Collection run metrics
    collection_metrics: CollectionMetrics,

    /// Report metrics
    report_metrics: ReportMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Collection run metrics
#[derive(Clone)]
pub struct CollectionMetrics {
    /// Collection runs by trigger (`scheduled`, `report`, `manual`)
    pub runs_total: IntCounterVec,

    /// Per-player fetch outcomes
    pub player_fetches_total: IntCounterVec,

    /// Unix timestamp of the last finished collection
    pub last_collection_timestamp: IntGauge,

    /// Wall time of a full collection run
    pub run_duration_seconds: Histogram,
}

/// Report metrics
#[derive(Clone)]
pub struct ReportMetrics {
    /// Reports generated by period and format
    pub reports_generated_total: IntCounterVec,

    /// Report deliveries by sink and status
    pub deliveries_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let collection_metrics = CollectionMetrics::new(&registry)?;
        let report_metrics = ReportMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            collection_metrics,
            report_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn collection(&self) -> &CollectionMetrics {
        &self.collection_metrics
    }

    pub fn report(&self) -> &ReportMetrics {
        &self.report_metrics
    }

    /// Record a finished collection run
    pub fn record_collection_run(&self, trigger: &str, duration: Duration, finished_at: i64) {
        self.collection_metrics
            .runs_total
            .with_label_values(&[trigger])
            .inc();
        self.collection_metrics
            .run_duration_seconds
            .observe(duration.as_secs_f64());
        self.collection_metrics
            .last_collection_timestamp
            .set(finished_at);
    }

    pub fn record_player_fetch(&self, outcome: FetchOutcome) {
        self.collection_metrics
            .player_fetches_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_report(&self, period: Period, format: OutputFormat) {
        self.report_metrics
            .reports_generated_total
            .with_label_values(&[period.as_str(), format.as_str()])
            .inc();
    }

    pub fn record_delivery(&self, sink: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.report_metrics
            .deliveries_total
            .with_label_values(&[sink, status])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let health_status = IntGauge::new(
            "rank_tracker_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("rank_tracker_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            health_status,
            component_health,
        })
    }
}

impl CollectionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let runs_total = IntCounterVec::new(
            Opts::new("rank_tracker_collection_runs_total", "Total collection runs"),
            &["trigger"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let player_fetches_total = IntCounterVec::new(
            Opts::new(
                "rank_tracker_player_fetches_total",
                "Per-player fetch outcomes",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(player_fetches_total.clone()))?;

        let last_collection_timestamp = IntGauge::new(
            "rank_tracker_last_collection_timestamp",
            "Unix timestamp of the last finished collection run",
        )?;
        registry.register(Box::new(last_collection_timestamp.clone()))?;

        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "rank_tracker_collection_duration_seconds",
                "Collection run duration",
            )
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        Ok(Self {
            runs_total,
            player_fetches_total,
            last_collection_timestamp,
            run_duration_seconds,
        })
    }
}

impl ReportMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let reports_generated_total = IntCounterVec::new(
            Opts::new(
                "rank_tracker_reports_generated_total",
                "Total reports generated",
            ),
            &["period", "format"],
        )?;
        registry.register(Box::new(reports_generated_total.clone()))?;

        let deliveries_total = IntCounterVec::new(
            Opts::new("rank_tracker_report_deliveries_total", "Report deliveries"),
            &["sink", "status"],
        )?;
        registry.register(Box::new(deliveries_total.clone()))?;

        Ok(Self {
            reports_generated_total,
            deliveries_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().unwrap();
        assert!(!collector.registry().gather().is_empty());
    }

    #[test]
    fn test_collection_metrics_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_player_fetch(FetchOutcome::Success);
        collector.record_player_fetch(FetchOutcome::Success);
        collector.record_player_fetch(FetchOutcome::Failed);
        collector.record_collection_run("manual", Duration::from_secs(12), 1_700_000_000);

        let fetches = &collector.collection().player_fetches_total;
        assert_eq!(fetches.with_label_values(&["success"]).get(), 2);
        assert_eq!(fetches.with_label_values(&["failed"]).get(), 1);
        assert_eq!(fetches.with_label_values(&["unranked"]).get(), 0);
        assert_eq!(
            collector
                .collection()
                .runs_total
                .with_label_values(&["manual"])
                .get(),
            1
        );
        assert_eq!(
            collector.collection().last_collection_timestamp.get(),
            1_700_000_000
        );
    }

    #[test]
    fn test_report_metrics_recording() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_report(Period::Weekly, OutputFormat::Graph);
        collector.record_delivery("webhook", false);

        assert_eq!(
            collector
                .report()
                .reports_generated_total
                .with_label_values(&["weekly", "graph"])
                .get(),
            1
        );
        assert_eq!(
            collector
                .report()
                .deliveries_total
                .with_label_values(&["webhook", "error"])
                .get(),
            1
        );
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.stop() >= Duration::from_millis(5));
    }
}
