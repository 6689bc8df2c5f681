//! Error types for the rank tracker
//!
//! Fallible operations return `anyhow` results at the service boundary;
//! the variants below are the specific failures callers may want to match on.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific tracker scenarios
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Unrecognized tier: {name}")]
    UnrecognizedTier { name: String },

    #[error("Unrecognized division: {name}")]
    UnrecognizedDivision { name: String },

    #[error("Invalid Riot ID: {input}")]
    InvalidRiotId { input: String },

    #[error("Player not found: {riot_id}")]
    PlayerNotFound { riot_id: String },

    #[error("Schedule not found: {local_id}")]
    ScheduleNotFound { local_id: u32 },

    #[error("Invalid schedule input: {reason}")]
    InvalidScheduleInput { reason: String },

    #[error("Stats provider error: {message}")]
    ProviderError { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

/// Strict tier parse failure, kept separate so the rank core does not
/// depend on the service-wide error enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized tier name '{0}'")]
pub struct UnrecognizedTier(pub String);

impl From<UnrecognizedTier> for TrackerError {
    fn from(err: UnrecognizedTier) -> Self {
        TrackerError::UnrecognizedTier { name: err.0 }
    }
}
