//! Comparison of two snapshots taken at different times

use super::display::{format_points_delta, short_form};
use super::scale::RankScale;
use crate::types::RankSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder rendered when one side of a comparison has no data
pub const NO_DATA: &str = "-";

const NO_CHANGE: &str = "no change";

/// Games played between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub games: i64,
    pub wins: i64,
    pub losses: i64,
    /// `floor(wins / games * 100)`
    pub win_rate: u32,
}

impl GameRecord {
    /// `None` when no games were played or the counters went backwards
    /// (upstream counter reset)
    pub fn between(before: &RankSnapshot, after: &RankSnapshot) -> Option<Self> {
        let wins = after.wins.checked_sub(before.wins)?;
        let losses = after.losses.checked_sub(before.losses)?;
        let games = wins.checked_add(losses)?;

        if games <= 0 || wins < 0 || losses < 0 {
            return None;
        }

        let win_rate = u32::try_from(i128::from(wins) * 100 / i128::from(games)).ok()?;
        Some(Self {
            games,
            wins,
            losses,
            win_rate,
        })
    }

    /// `4 games, 3 wins (75%)`
    pub fn fragment(&self) -> String {
        format!("{} games, {} wins ({}%)", self.games, self.wins, self.win_rate)
    }

    /// Narrow column form: `4 games 3W (75%)`
    pub fn compact(&self) -> String {
        format!("{} games {}W ({}%)", self.games, self.wins, self.win_rate)
    }
}

/// Outcome of comparing two present snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankDeltaResult {
    /// `encode(after) - encode(before)`
    pub points_delta: i64,
    /// Whether the normalised tier or division differ (points ignored)
    pub rank_changed: bool,
    /// Tier/LP part only, e.g. `Tier SIII → SII LP: +110LP`
    pub transition: String,
    /// `transition` followed by the games fragment when games were played
    pub transition_label: String,
    pub record: Option<GameRecord>,
}

impl RankDeltaResult {
    pub fn win_rate(&self) -> Option<u32> {
        self.record.map(|r| r.win_rate)
    }
}

/// Comparison result, or the sentinel for a missing snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOutcome {
    Compared(RankDeltaResult),
    NoData,
}

impl DeltaOutcome {
    pub fn result(&self) -> Option<&RankDeltaResult> {
        match self {
            DeltaOutcome::Compared(result) => Some(result),
            DeltaOutcome::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, DeltaOutcome::NoData)
    }
}

impl fmt::Display for DeltaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaOutcome::Compared(result) => f.write_str(&result.transition_label),
            DeltaOutcome::NoData => f.write_str(NO_DATA),
        }
    }
}

/// Computes deltas between chronologically ordered snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct RankDelta {
    scale: RankScale,
}

impl RankDelta {
    pub fn new(scale: RankScale) -> Self {
        Self { scale }
    }

    /// Compare `before` with `after`. Either side missing yields
    /// [`DeltaOutcome::NoData`].
    ///
    /// `include_prefix` selects the sentence form
    /// (`Tier SIII → SII LP: +110LP`) over the bare form (`SIII → SII +110LP`);
    /// the numbers are identical in both.
    pub fn compare(
        &self,
        before: Option<&RankSnapshot>,
        after: Option<&RankSnapshot>,
        include_prefix: bool,
    ) -> DeltaOutcome {
        match (before, after) {
            (Some(before), Some(after)) => {
                DeltaOutcome::Compared(self.compare_snapshots(before, after, include_prefix))
            }
            _ => DeltaOutcome::NoData,
        }
    }

    pub fn compare_snapshots(
        &self,
        before: &RankSnapshot,
        after: &RankSnapshot,
        include_prefix: bool,
    ) -> RankDeltaResult {
        let points_delta =
            self.scale.encode_snapshot(after) - self.scale.encode_snapshot(before);
        let delta_text = format_points_delta(points_delta);

        let old_identity = self.scale.identity(before.tier, before.division);
        let new_identity = self.scale.identity(after.tier, after.division);
        let rank_changed = old_identity != new_identity;
        let old_rank = short_form(old_identity.0, old_identity.1);
        let new_rank = short_form(new_identity.0, new_identity.1);

        let transition = match (rank_changed, include_prefix) {
            (false, true) => format!("Tier: {} LP: {}", NO_CHANGE, delta_text),
            (false, false) => format!("{} {}", NO_CHANGE, delta_text),
            (true, true) => format!("Tier {} → {} LP: {}", old_rank, new_rank, delta_text),
            (true, false) => format!("{} → {} {}", old_rank, new_rank, delta_text),
        };

        let record = GameRecord::between(before, after);
        let transition_label = match &record {
            Some(record) => format!("{}, {}", transition, record.fragment()),
            None => transition.clone(),
        };

        RankDeltaResult {
            points_delta,
            rank_changed,
            transition,
            transition_label,
            record,
        }
    }
}
