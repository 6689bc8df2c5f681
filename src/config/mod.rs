//! Configuration management for the rank tracker
//!
//! This module handles configuration loading from files and environment
//! variables, validation, and default values.

pub mod app;

// Re-export commonly used types
pub use app::{
    parse_clock_time, validate_config, AppConfig, DeliverySettings, ProviderSettings,
    RankSettings, SchedulerSettings, ServiceSettings, StorageSettings,
};
