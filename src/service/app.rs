//! Main application state and service coordination
//!
//! AppState wires the history store, the stats provider, the collector,
//! report generation, and the scheduler together and owns the background
//! tasks of a running tracker.

use crate::collector::{CollectorSettings, RankCollector};
use crate::config::AppConfig;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::provider::{OpggClient, SnapshotProvider};
use crate::rank::RankScale;
use crate::report::ReportService;
use crate::scheduler::{LogSink, ScheduleTiming, Scheduler, SharedSink, WebhookSink};
use crate::service::health::{HealthCheck, ServiceStatus};
use crate::storage::{HistoryStore, ScheduleStore, SqliteStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the running scheduler re-reads schedules from the store
const SCHEDULE_REFRESH: Duration = Duration::from_secs(60);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    history: Arc<dyn HistoryStore>,
    schedules: Arc<dyn ScheduleStore>,

    collector: Arc<RankCollector>,
    reports: Arc<ReportService>,
    scheduler: Arc<Scheduler>,
    sink: SharedSink,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Shared with the health endpoints
    status: Arc<ServiceStatus>,

    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Build every component against the live stats provider
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        let provider = OpggClient::new(&config.provider).map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create stats provider client: {}", e),
            }
        })?;
        Self::with_provider(config, Arc::new(provider)).await
    }

    /// Build every component against the given provider
    pub async fn with_provider(
        config: AppConfig,
        provider: Arc<dyn SnapshotProvider>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing {} service", config.service.name);
        info!(
            "Configuration: database={}, region={}, utc_offset={:+}h",
            config.storage.database_path, config.provider.region, config.scheduler.utc_offset_hours
        );

        let store = Arc::new(SqliteStore::open(&config.storage.database_path).map_err(|e| {
            ServiceError::Storage {
                message: format!(
                    "Failed to open database {}: {}",
                    config.storage.database_path, e
                ),
            }
        })?);
        let history: Arc<dyn HistoryStore> = store.clone();
        let schedules: Arc<dyn ScheduleStore> = store;

        let metrics_service = Self::initialize_metrics(&config)?;
        let metrics = metrics_service.collector();

        let settings = CollectorSettings::from_config(&config).map_err(configuration)?;
        let utc_offset = settings.utc_offset;
        let collector = Arc::new(
            RankCollector::new(provider, history.clone(), settings).with_metrics(metrics.clone()),
        );

        let reports = Arc::new(
            ReportService::new(
                history.clone(),
                RankScale::new(config.rank.apex_policy),
                utc_offset,
            )
            .with_metrics(metrics.clone()),
        );

        let sink = Self::initialize_sink(&config)?;
        let timing = ScheduleTiming::from_config(&config).map_err(configuration)?;
        let scheduler = Arc::new(
            Scheduler::new(
                collector.clone(),
                reports.clone(),
                schedules.clone(),
                sink.clone(),
                timing,
            )
            .with_metrics(metrics),
        );

        let status = Arc::new(
            ServiceStatus::new(config.service.name.clone())
                .with_store(history.clone())
                .with_scheduler(scheduler.clone()),
        );

        Ok(Self {
            config,
            history,
            schedules,
            collector,
            reports,
            scheduler,
            sink,
            metrics_service,
            status,
            background_tasks: Vec::new(),
        })
    }

    /// Start the health server, the scheduler, and the health metrics task
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} service", self.config.service.name);

        self.status.set_running(true);

        self.start_metrics_service().await?;

        info!(
            "Starting scheduler (daily collection at {})",
            self.config.scheduler.collection_time
        );
        self.background_tasks.push(self.scheduler.spawn());

        self.start_background_tasks();

        info!("✅ {} service started successfully", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        self.status.set_running(false);
        self.scheduler.shutdown();

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        self.stop_background_tasks().await;

        if let Some(summary) = self.scheduler.last_collection() {
            info!(
                "Last collection: {} players, {} ok, {} unranked, {} failed",
                summary.total, summary.success, summary.unranked, summary.failed
            );
        }
        info!("✅ {} shutdown completed", self.config.service.name);
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        self.history.clone()
    }

    pub fn schedules(&self) -> Arc<dyn ScheduleStore> {
        self.schedules.clone()
    }

    pub fn collector(&self) -> Arc<RankCollector> {
        self.collector.clone()
    }

    pub fn reports(&self) -> Arc<ReportService> {
        self.reports.clone()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    pub fn sink(&self) -> SharedSink {
        self.sink.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    pub fn status(&self) -> Arc<ServiceStatus> {
        self.status.clone()
    }

    fn initialize_metrics(config: &AppConfig) -> Result<Arc<MetricsService>, ServiceError> {
        info!(
            "Initializing metrics service on port {}",
            config.service.health_port
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };

        let health_server = Arc::new(HealthServer::new(health_config, metrics_collector.clone()));
        Ok(Arc::new(MetricsService::new(metrics_collector, health_server)))
    }

    /// Webhooks when any are configured, otherwise the log
    fn initialize_sink(config: &AppConfig) -> Result<SharedSink, ServiceError> {
        let delivery = &config.delivery;
        if delivery.webhooks.is_empty() && delivery.default_webhook.is_none() {
            info!("No webhooks configured, reports will be written to the log");
            return Ok(Arc::new(LogSink));
        }

        info!(
            "Delivering reports to {} channel webhooks (default: {})",
            delivery.webhooks.len(),
            if delivery.default_webhook.is_some() { "yes" } else { "no" }
        );
        let sink = WebhookSink::new(delivery.clone(), config.provider_timeout()).map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create webhook client: {}", e),
            }
        })?;
        Ok(Arc::new(sink))
    }

    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        // The running server reads live status; rebuild it with the status attached
        let collector = self.metrics_service.collector();
        let health_config = self.metrics_service.health_server().config().clone();
        let port = health_config.port;
        let health_server = Arc::new(
            HealthServer::new(health_config, collector.clone()).with_status(self.status.clone()),
        );
        self.metrics_service = Arc::new(MetricsService::new(collector, health_server));

        let metrics_service = self.metrics_service.clone();
        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        info!("Starting health metrics task (60s interval)...");
        let metrics_collector = self.metrics_service.collector();
        let status = self.status.clone();

        let health_metrics_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            info!("Health metrics task started");

            while status.is_running() {
                interval.tick().await;

                match HealthCheck::check(&status).await {
                    Ok(health) => {
                        metrics_collector.update_health_status(health.status.gauge_value());
                        for check in &health.checks {
                            metrics_collector.update_component_health(
                                &check.name,
                                check.status.gauge_value() > 0,
                            );
                        }
                        debug!("Updated service health metrics: {}", health.status);
                    }
                    Err(e) => {
                        warn!("Health check failed during metrics update: {}", e);
                        metrics_collector.update_health_status(0);
                    }
                }
            }

            info!("Health metrics task stopped");
        });

        self.background_tasks.push(health_metrics_task);

        // Schedules may be edited from another process sharing the database
        let scheduler = self.scheduler.clone();
        let status = self.status.clone();
        let refresh_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SCHEDULE_REFRESH);
            interval.tick().await;
            while status.is_running() {
                interval.tick().await;
                scheduler.reload();
            }
        });
        self.background_tasks.push(refresh_task);
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        // The scheduler was asked to stop; give an in-flight job a moment
        let grace = self.config.shutdown_timeout();
        let deadline = tokio::time::Instant::now() + grace;
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            if task.is_finished() {
                continue;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                debug!("Aborting background task {}/{}", i + 1, task_count);
                task.abort();
                continue;
            }
            let abort = task.abort_handle();
            if tokio::time::timeout(remaining.min(Duration::from_millis(500)), task)
                .await
                .is_err()
            {
                debug!("Aborting background task {}/{}", i + 1, task_count);
                abort.abort();
            }
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

fn configuration(e: anyhow::Error) -> ServiceError {
    ServiceError::Configuration {
        message: e.to_string(),
    }
}
