//! Main application configuration
//!
//! Defaults are overridden by a TOML file or by environment variables, then
//! validated before the service starts.

use crate::rank::ApexPolicy;
use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub provider: ProviderSettings,
    pub storage: StorageSettings,
    pub scheduler: SchedulerSettings,
    pub delivery: DeliverySettings,
    pub rank: RankSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Stats provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL of the summoner API
    pub base_url: String,
    /// Provider region code
    pub region: String,
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Wait after a batch of renewal requests before fetching
    pub renewal_settle_seconds: u64,
    /// Wait after a single renewal before fetching that player
    pub single_renewal_wait_seconds: u64,
    /// Pause between consecutive player fetches
    pub fetch_delay_ms: u64,
}

/// History store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite file path, or `:memory:`
    pub database_path: String,
}

/// Scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Offset of the wall clock schedules are written in
    pub utc_offset_hours: i32,
    /// Daily roster collection time (HH:MM)
    pub collection_time: String,
}

/// Report delivery settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Channel id -> webhook URL
    pub webhooks: HashMap<String, String>,
    /// Used for channels without their own webhook
    pub default_webhook: Option<String>,
}

/// Rank scale settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RankSettings {
    pub apex_policy: ApexPolicy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "rank-tracker".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://lol-api-summoner.op.gg/api".to_string(),
            region: "jp".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout_seconds: 30,
            renewal_settle_seconds: 10,
            single_renewal_wait_seconds: 8,
            fetch_delay_ms: 1000,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "rank-tracker.db".to_string(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            utc_offset_hours: 9,
            collection_time: "23:55".to_string(),
        }
    }
}

impl DeliverySettings {
    pub fn webhook_for(&self, channel_id: u64) -> Option<&str> {
        self.webhooks
            .get(&channel_id.to_string())
            .or(self.default_webhook.as_ref())
            .map(String::as_str)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load a TOML file; environment variables still override it
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = parse_env("HEALTH_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_env("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Provider settings
        if let Ok(url) = env::var("PROVIDER_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Ok(region) = env::var("PROVIDER_REGION") {
            self.provider.region = region;
        }
        if let Ok(timeout) = env::var("PROVIDER_TIMEOUT_SECONDS") {
            self.provider.timeout_seconds = parse_env("PROVIDER_TIMEOUT_SECONDS", &timeout)?;
        }
        if let Ok(settle) = env::var("RENEWAL_SETTLE_SECONDS") {
            self.provider.renewal_settle_seconds = parse_env("RENEWAL_SETTLE_SECONDS", &settle)?;
        }
        if let Ok(wait) = env::var("SINGLE_RENEWAL_WAIT_SECONDS") {
            self.provider.single_renewal_wait_seconds =
                parse_env("SINGLE_RENEWAL_WAIT_SECONDS", &wait)?;
        }
        if let Ok(delay) = env::var("FETCH_DELAY_MS") {
            self.provider.fetch_delay_ms = parse_env("FETCH_DELAY_MS", &delay)?;
        }

        // Storage settings
        if let Ok(path) = env::var("DATABASE_PATH") {
            self.storage.database_path = path;
        }

        // Scheduler settings
        if let Ok(offset) = env::var("UTC_OFFSET_HOURS") {
            self.scheduler.utc_offset_hours = parse_env("UTC_OFFSET_HOURS", &offset)?;
        }
        if let Ok(time) = env::var("COLLECTION_TIME") {
            self.scheduler.collection_time = time;
        }

        // Delivery settings
        if let Ok(url) = env::var("DEFAULT_WEBHOOK_URL") {
            self.delivery.default_webhook = Some(url);
        }

        // Rank settings
        if let Ok(policy) = env::var("APEX_POLICY") {
            self.rank.apex_policy = match policy.to_lowercase().as_str() {
                "raw" => ApexPolicy::Raw,
                "clamped" => ApexPolicy::Clamped,
                _ => return Err(anyhow!("Invalid APEX_POLICY value: {}", policy)),
            };
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_seconds)
    }

    pub fn renewal_settle(&self) -> Duration {
        Duration::from_secs(self.provider.renewal_settle_seconds)
    }

    pub fn single_renewal_wait(&self) -> Duration {
        Duration::from_secs(self.provider.single_renewal_wait_seconds)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.provider.fetch_delay_ms)
    }

    /// Wall-clock offset schedules are evaluated in
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.scheduler.utc_offset_hours * 3600)
            .ok_or_else(|| anyhow!("Invalid UTC offset: {}h", self.scheduler.utc_offset_hours))
    }

    pub fn collection_time(&self) -> Result<NaiveTime> {
        parse_clock_time(&self.scheduler.collection_time)
            .ok_or_else(|| anyhow!("Invalid collection time: {}", self.scheduler.collection_time))
    }
}

/// Parse `HH:MM` or `HH:MM:SS`
pub fn parse_clock_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .ok()
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.provider.base_url.is_empty() {
        return Err(anyhow!("Provider base URL cannot be empty"));
    }
    if config.provider.region.is_empty() {
        return Err(anyhow!("Provider region cannot be empty"));
    }
    if config.provider.timeout_seconds == 0 {
        return Err(anyhow!("Provider timeout must be greater than 0"));
    }

    if config.storage.database_path.is_empty() {
        return Err(anyhow!("Database path cannot be empty"));
    }

    if !(-12..=14).contains(&config.scheduler.utc_offset_hours) {
        return Err(anyhow!(
            "UTC offset must be between -12 and 14 hours, got {}",
            config.scheduler.utc_offset_hours
        ));
    }
    config.collection_time()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.renewal_settle(), Duration::from_secs(10));
        assert_eq!(config.fetch_delay(), Duration::from_millis(1000));
        assert_eq!(
            config.collection_time().unwrap(),
            NaiveTime::from_hms_opt(23, 55, 0).unwrap()
        );
        assert_eq!(config.utc_offset().unwrap().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.scheduler.collection_time = "noon".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.scheduler.utc_offset_hours = 20;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
database_path = ":memory:"

[rank]
apex_policy = "clamped"

[delivery.webhooks]
"42" = "https://example.invalid/hook"
"#
        )
        .unwrap();

        let config: AppConfig =
            toml::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(config.storage.database_path, ":memory:");
        assert_eq!(config.rank.apex_policy, ApexPolicy::Clamped);
        assert_eq!(config.service.health_port, 8080);
        assert_eq!(
            config.delivery.webhook_for(42),
            Some("https://example.invalid/hook")
        );
        assert_eq!(config.delivery.webhook_for(7), None);
    }

    #[test]
    fn test_parse_clock_time() {
        assert_eq!(parse_clock_time("21:00"), NaiveTime::from_hms_opt(21, 0, 0));
        assert_eq!(parse_clock_time("09:30:15"), NaiveTime::from_hms_opt(9, 30, 15));
        assert_eq!(parse_clock_time("25:00"), None);
        assert_eq!(parse_clock_time("2100"), None);
    }
}
