//! Rank normalisation and comparison
//!
//! `scale` maps tier/division/points onto one ordered integer and back,
//! `delta` compares two snapshots, `display` holds the label vocabulary
//! shared with renderers and `history` picks the snapshots a comparison
//! should be fed.

pub mod delta;
pub mod display;
pub mod history;
pub mod scale;

// Re-export commonly used types
pub use delta::{DeltaOutcome, GameRecord, RankDelta, RankDeltaResult, NO_DATA};
pub use display::{format_points_delta, format_rank_display, short_form};
pub use history::{bucket_latest, nearest_on_or_before, nearest_in_slice};
pub use scale::{ApexPolicy, RankLabel, RankScale, TotalPoints, DIVISION_WIDTH, TIER_BAND_WIDTH};
