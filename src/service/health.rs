//! Health checks
//!
//! Liveness only asks whether the service is running. Readiness also
//! probes the history store and looks at the last collection run.

use crate::collector::CollectionSummary;
use crate::scheduler::Scheduler;
use crate::storage::HistoryStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value (0=unhealthy, 1=degraded, 2=healthy)
    pub fn gauge_value(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// Worse of two statuses
    fn combine(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// What the health endpoints can see of the running service
pub struct ServiceStatus {
    name: String,
    started_at: DateTime<Utc>,
    running: AtomicBool,
    store: Option<Arc<dyn HistoryStore>>,
    scheduler: Option<Arc<Scheduler>>,
}

impl ServiceStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Utc::now(),
            running: AtomicBool::new(false),
            store: None,
            scheduler: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    pub fn last_collection(&self) -> Option<CollectionSummary> {
        self.scheduler.as_ref().and_then(|s| s.last_collection())
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub uptime_seconds: i64,
    pub registered_players: Option<usize>,
    pub last_collection: Option<CollectionSummary>,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(status: &ServiceStatus) -> Result<Self> {
        let mut checks = vec![Self::check_service_running(status)];
        let (store_check, registered_players) = Self::check_store(status);
        checks.push(store_check);
        checks.push(Self::check_collection(status));

        let overall = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.combine(check.status));

        Ok(HealthCheck {
            status: overall,
            service: status.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            checks,
            stats: ServiceStats {
                uptime_seconds: status.uptime_seconds(),
                registered_players,
                last_collection: status.last_collection(),
            },
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(status: &ServiceStatus) -> Result<HealthStatus> {
        if status.is_running() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - running, store reachable, collection not failing
    pub async fn readiness_check(status: &ServiceStatus) -> Result<HealthStatus> {
        if !status.is_running() {
            return Ok(HealthStatus::Unhealthy);
        }

        let (store_check, _) = Self::check_store(status);
        Ok(store_check.status.combine(Self::check_collection(status).status))
    }

    fn check_service_running(status: &ServiceStatus) -> ComponentCheck {
        let running = status.is_running();
        ComponentCheck {
            name: "service".to_string(),
            status: if running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: (!running).then(|| "Service is not running".to_string()),
            duration_ms: 0,
        }
    }

    fn check_store(status: &ServiceStatus) -> (ComponentCheck, Option<usize>) {
        let started = Instant::now();
        let Some(store) = &status.store else {
            return (
                ComponentCheck {
                    name: "history_store".to_string(),
                    status: HealthStatus::Degraded,
                    message: Some("No history store attached".to_string()),
                    duration_ms: 0,
                },
                None,
            );
        };

        let result = store.players(None);
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(players) => {
                debug!("History store check passed ({} players)", players.len());
                (
                    ComponentCheck {
                        name: "history_store".to_string(),
                        status: HealthStatus::Healthy,
                        message: None,
                        duration_ms,
                    },
                    Some(players.len()),
                )
            }
            Err(e) => {
                error!("History store check failed: {}", e);
                (
                    ComponentCheck {
                        name: "history_store".to_string(),
                        status: HealthStatus::Unhealthy,
                        message: Some(e.to_string()),
                        duration_ms,
                    },
                    None,
                )
            }
        }
    }

    /// Degraded when the last run attempted players and none succeeded
    fn check_collection(status: &ServiceStatus) -> ComponentCheck {
        let (health, message) = match status.last_collection() {
            Some(summary) if summary.total > 0 && summary.success == 0 && summary.failed > 0 => (
                HealthStatus::Degraded,
                Some(format!(
                    "Last collection failed for all {} players",
                    summary.failed
                )),
            ),
            _ => (HealthStatus::Healthy, None),
        };

        ComponentCheck {
            name: "collection".to_string(),
            status: health,
            message,
            duration_ms: 0,
        }
    }
}
