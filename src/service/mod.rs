//! Service layer for the rank tracker
//!
//! Application state, background task management, and health checks for
//! the long-running service.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{ComponentCheck, HealthCheck, HealthStatus, ServiceStats, ServiceStatus};
