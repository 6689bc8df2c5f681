//! Total-points scale
//!
//! Every tier owns a band of 400 units, ordered Iron (band 0) to
//! Challenger (band 9). Non-apex tiers split their band into four
//! divisions of 100 units each; apex tiers add raw points to the band base.
//!
//! Known limitation: with [`ApexPolicy::Raw`] an apex player's points are
//! not capped, so a Master player above 399 points encodes into the space
//! of Grandmaster. Cross-tier monotonicity only holds below that boundary.

use crate::error::UnrecognizedTier;
use crate::types::{Division, RankSnapshot, Tier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

/// Width of one tier band
pub const TIER_BAND_WIDTH: i64 = 400;

/// Width of one division inside a non-apex band
pub const DIVISION_WIDTH: i64 = 100;

/// How apex-tier points beyond one band width are encoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApexPolicy {
    /// Keep raw totals; high apex points overflow into the next band
    #[default]
    Raw,
    /// Cap apex points at the top of their own band
    Clamped,
}

/// Globally ordered rank value
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TotalPoints(pub i64);

impl TotalPoints {
    /// Returned by the soft encoders for unrecognized tiers; aliases Iron IV 0LP
    pub const UNRANKED: TotalPoints = TotalPoints(0);

    pub fn value(self) -> i64 {
        self.0
    }

    fn saturating_add(self, points: i64) -> Self {
        TotalPoints(self.0.saturating_add(points))
    }
}

impl Sub for TotalPoints {
    type Output = i64;

    fn sub(self, rhs: Self) -> i64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for TotalPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Approximate rank recovered from a total, used for axis labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankLabel {
    pub tier: Tier,
    pub division: Option<Division>,
}

impl RankLabel {
    /// Compact form, e.g. `GII` or `GM`
    pub fn short(&self) -> String {
        super::display::short_form(self.tier, self.division)
    }
}

impl fmt::Display for RankLabel {
    /// `GOLD II` for divided tiers, the bare tier name for apex tiers
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.division {
            Some(division) => write!(f, "{} {}", self.tier, division),
            None => write!(f, "{}", self.tier),
        }
    }
}

/// Bidirectional mapping between structured ranks and [`TotalPoints`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankScale {
    apex_policy: ApexPolicy,
}

impl RankScale {
    pub fn new(apex_policy: ApexPolicy) -> Self {
        Self { apex_policy }
    }

    pub fn apex_policy(&self) -> ApexPolicy {
        self.apex_policy
    }

    /// Encode a rank. Points are not validated; a missing division on a
    /// non-apex tier counts as IV.
    pub fn encode(&self, tier: Tier, division: Option<Division>, points: i64) -> TotalPoints {
        let base = tier.band_index() * TIER_BAND_WIDTH;

        if tier.is_apex() {
            let points = match self.apex_policy {
                ApexPolicy::Raw => points,
                ApexPolicy::Clamped => points.min(TIER_BAND_WIDTH - 1),
            };
            return TotalPoints(base.saturating_add(points));
        }

        let weight = division.map_or(0, Division::weight);
        TotalPoints(base + weight * DIVISION_WIDTH).saturating_add(points)
    }

    /// Tier and division as [`Self::encode`] sees them: apex tiers carry no
    /// division, a missing division on a non-apex tier is IV
    pub fn identity(&self, tier: Tier, division: Option<Division>) -> (Tier, Option<Division>) {
        if tier.is_apex() {
            (tier, None)
        } else {
            (tier, Some(division.unwrap_or(Division::IV)))
        }
    }

    pub fn encode_snapshot(&self, snapshot: &RankSnapshot) -> TotalPoints {
        self.encode(snapshot.tier, snapshot.division, snapshot.points)
    }

    /// Strict encode from provider strings
    pub fn try_encode_str(
        &self,
        tier: &str,
        division: &str,
        points: i64,
    ) -> Result<TotalPoints, UnrecognizedTier> {
        let tier: Tier = tier.parse()?;
        Ok(self.encode(tier, division.parse().ok(), points))
    }

    /// Soft encode from provider strings: unrecognized tiers yield
    /// [`TotalPoints::UNRANKED`] so batch work never aborts on one record
    pub fn encode_str(&self, tier: &str, division: &str, points: i64) -> TotalPoints {
        self.try_encode_str(tier, division, points)
            .unwrap_or(TotalPoints::UNRANKED)
    }

    /// Recover the tier and division a total falls in. Totals beyond
    /// Challenger's band stay Challenger, negative totals read as Iron IV.
    pub fn decode(&self, total: TotalPoints) -> RankLabel {
        let last_band = Tier::Challenger.band_index();
        let band = total.0.div_euclid(TIER_BAND_WIDTH).clamp(0, last_band);
        let tier = Tier::from_band(band).unwrap_or(Tier::Iron);

        if tier.is_apex() {
            return RankLabel {
                tier,
                division: None,
            };
        }

        let remainder = total.0 - band * TIER_BAND_WIDTH;
        let weight = remainder.div_euclid(DIVISION_WIDTH).clamp(0, 3);

        RankLabel {
            tier,
            division: Division::from_weight(weight),
        }
    }
}
