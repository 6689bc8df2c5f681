//! Rank Tracker - ranked ladder history for registered players
//!
//! Collects each player's solo-queue rank from the stats provider once a
//! day, keeps the history in SQLite, and turns it into roster tables,
//! per-player reports, and rank charts delivered on a schedule.

pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod rank;
pub mod report;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod types;

// Re-export commonly used types and traits
pub use error::{Result, TrackerError, UnrecognizedTier};
pub use types::*;

// Re-export key components
pub use collector::{CollectionSummary, RankCollector};
pub use provider::{SnapshotProvider, StaticSnapshotProvider};
pub use rank::{RankDelta, RankScale, TotalPoints};
pub use report::{RenderedReport, ReportRequest, ReportService};
pub use storage::{HistoryStore, InMemoryStore, ScheduleStore, SqliteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
