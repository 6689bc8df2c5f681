//! Common types used throughout the rank tracker

use crate::error::{TrackerError, UnrecognizedTier};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chat server (guild) identifier
pub type ServerId = u64;

/// Chat user identifier
pub type UserId = u64;

/// Chat channel identifier
pub type ChannelId = u64;

/// Ranked tier, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Iron,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
    Master,
    Grandmaster,
    Challenger,
}

impl Tier {
    /// All tiers in canonical order
    pub const ALL: [Tier; 10] = [
        Tier::Iron,
        Tier::Bronze,
        Tier::Silver,
        Tier::Gold,
        Tier::Platinum,
        Tier::Emerald,
        Tier::Diamond,
        Tier::Master,
        Tier::Grandmaster,
        Tier::Challenger,
    ];

    /// Position in the canonical ordering (Iron = 0, Challenger = 9)
    pub fn band_index(self) -> i64 {
        self as i64
    }

    /// Tier occupying the given band, if any
    pub fn from_band(index: i64) -> Option<Tier> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Master, Grandmaster and Challenger have no divisions
    pub fn is_apex(self) -> bool {
        matches!(self, Tier::Master | Tier::Grandmaster | Tier::Challenger)
    }

    /// The next tier up, `None` for Challenger
    pub fn next(self) -> Option<Tier> {
        Self::from_band(self.band_index() + 1)
    }

    /// Upper-case name as the provider reports it
    pub fn name(self) -> &'static str {
        match self {
            Tier::Iron => "IRON",
            Tier::Bronze => "BRONZE",
            Tier::Silver => "SILVER",
            Tier::Gold => "GOLD",
            Tier::Platinum => "PLATINUM",
            Tier::Emerald => "EMERALD",
            Tier::Diamond => "DIAMOND",
            Tier::Master => "MASTER",
            Tier::Grandmaster => "GRANDMASTER",
            Tier::Challenger => "CHALLENGER",
        }
    }

    /// Short display form used in tables and transition labels
    pub fn abbreviation(self) -> &'static str {
        match self {
            Tier::Iron => "I",
            Tier::Bronze => "B",
            Tier::Silver => "S",
            Tier::Gold => "G",
            Tier::Platinum => "P",
            Tier::Emerald => "E",
            Tier::Diamond => "D",
            Tier::Master => "M",
            Tier::Grandmaster => "GM",
            Tier::Challenger => "C",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = UnrecognizedTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|tier| tier.name() == upper)
            .ok_or_else(|| UnrecognizedTier(s.to_string()))
    }
}

/// Sub-rank inside a non-apex tier, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Division {
    IV,
    III,
    II,
    I,
}

impl Division {
    pub const ALL: [Division; 4] = [Division::IV, Division::III, Division::II, Division::I];

    /// Ordinal weight: IV = 0 .. I = 3
    pub fn weight(self) -> i64 {
        self as i64
    }

    pub fn from_weight(weight: i64) -> Option<Division> {
        usize::try_from(weight)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn roman(self) -> &'static str {
        match self {
            Division::IV => "IV",
            Division::III => "III",
            Division::II => "II",
            Division::I => "I",
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.roman())
    }
}

impl FromStr for Division {
    type Err = TrackerError;

    /// Accepts Roman numerals or the digits 1-4 the provider sometimes sends
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "I" | "1" => Ok(Division::I),
            "II" | "2" => Ok(Division::II),
            "III" | "3" => Ok(Division::III),
            "IV" | "4" => Ok(Division::IV),
            _ => Err(TrackerError::UnrecognizedDivision {
                name: s.to_string(),
            }),
        }
    }
}

/// Riot account identifier (`Name#Tag`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiotId {
    pub game_name: String,
    pub tag_line: String,
}

impl RiotId {
    pub fn new(game_name: impl Into<String>, tag_line: impl Into<String>) -> Self {
        Self {
            game_name: game_name.into(),
            tag_line: tag_line.into().to_uppercase(),
        }
    }

    /// Parse `Name#Tag` or an op.gg profile URL such as
    /// `https://www.op.gg/summoners/jp/Name-Tag`
    pub fn parse(input: &str) -> Result<Self, TrackerError> {
        let input = input.trim();
        let invalid = || TrackerError::InvalidRiotId {
            input: input.to_string(),
        };

        let (name, tag) = if input.contains("op.gg") {
            Self::split_profile_url(input).ok_or_else(invalid)?
        } else if let Some((name, tag)) = input.split_once('#') {
            (name.to_string(), tag.to_string())
        } else {
            return Err(invalid());
        };

        if name.trim().is_empty() || tag.trim().is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(name.trim(), tag.trim()))
    }

    fn split_profile_url(url: &str) -> Option<(String, String)> {
        let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
        let path = without_scheme.split_once('/').map(|(_, path)| path)?;
        let path = path.split(['?', '#']).next().unwrap_or_default();

        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 || parts[0] != "summoners" {
            return None;
        }

        let decoded = urlencoding::decode(parts[parts.len() - 1]).ok()?;
        let (name, tag) = decoded.rsplit_once('-')?;
        Some((name.to_string(), tag.to_string()))
    }

    /// Name shown in report rows (part before `#`)
    pub fn display_name(&self) -> &str {
        &self.game_name
    }
}

impl fmt::Display for RiotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.game_name, self.tag_line)
    }
}

impl FromStr for RiotId {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One recorded observation of a player's ranked standing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSnapshot {
    pub tier: Tier,
    pub division: Option<Division>,
    pub points: i64,
    pub wins: i64,
    pub losses: i64,
    pub observed_at: DateTime<Utc>,
}

impl RankSnapshot {
    /// Build a snapshot; any division given for an apex tier is dropped
    pub fn new(
        tier: Tier,
        division: Option<Division>,
        points: i64,
        wins: i64,
        losses: i64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tier,
            division: if tier.is_apex() { None } else { division },
            points,
            wins,
            losses,
            observed_at,
        }
    }

    /// Build from provider strings. Only the tier is strict; an unreadable
    /// division is treated as absent.
    pub fn from_raw(
        tier: &str,
        division: &str,
        points: i64,
        wins: i64,
        losses: i64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, UnrecognizedTier> {
        let tier: Tier = tier.parse()?;
        let division = division.parse::<Division>().ok();
        Ok(Self::new(tier, division, points, wins, losses, observed_at))
    }

    pub fn games(&self) -> i64 {
        self.wins + self.losses
    }
}

/// A snapshot as stored in the history, keyed by collection date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedSnapshot {
    pub date: NaiveDate,
    pub snapshot: RankSnapshot,
}

/// Reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    /// How far back a report for this period looks
    pub fn lookback_days(self) -> i64 {
        match self {
            Period::Daily => 7,
            Period::Weekly => 60,
            Period::Monthly => 180,
        }
    }

    /// Offset used for the "recent" diff column
    pub fn recent_offset_days(self) -> i64 {
        match self {
            Period::Daily => 1,
            Period::Weekly => 7,
            Period::Monthly => 30,
        }
    }

    pub fn recent_diff_label(self) -> &'static str {
        match self {
            Period::Daily => "vs prev day",
            Period::Weekly => "vs prev week",
            Period::Monthly => "vs prev month",
        }
    }

    pub fn span_diff_label(self) -> &'static str {
        match self {
            Period::Daily => "vs 7 days",
            Period::Weekly => "vs 2 months",
            Period::Monthly => "vs 6 months",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Period::Daily),
            "weekly" | "w" => Ok(Period::Weekly),
            "monthly" | "m" => Ok(Period::Monthly),
            _ => Err(TrackerError::InvalidScheduleInput {
                reason: "period must be one of `daily`, `weekly`, `monthly`".to_string(),
            }),
        }
    }
}

/// How a report is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Table,
    Graph,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Graph => "graph",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "graph" => Ok(OutputFormat::Graph),
            _ => Err(TrackerError::InvalidScheduleInput {
                reason: "output format must be `table` or `graph`".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleStatus {
    Enabled,
    Disabled,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Enabled => "ENABLED",
            ScheduleStatus::Disabled => "DISABLED",
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ENABLED" => Ok(ScheduleStatus::Enabled),
            "DISABLED" => Ok(ScheduleStatus::Disabled),
            other => Err(TrackerError::StorageError {
                message: format!("unknown schedule status '{}'", other),
            }),
        }
    }
}

/// Identity of a tracked account inside one server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerKey {
    pub server_id: ServerId,
    pub discord_id: UserId,
    pub riot_id: String,
}

/// A registered (tracked) player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredPlayer {
    pub server_id: ServerId,
    pub discord_id: UserId,
    pub riot_id: RiotId,
    /// Provider-side summoner id captured at registration
    pub summoner_id: Option<String>,
    /// Per-server sequential id shown to users (1..n)
    pub local_id: u32,
    pub registered_at: DateTime<Utc>,
}

impl RegisteredPlayer {
    pub fn key(&self) -> PlayerKey {
        PlayerKey {
            server_id: self.server_id,
            discord_id: self.discord_id,
            riot_id: self.riot_id.to_string(),
        }
    }
}

/// User-supplied schedule fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub time: NaiveTime,
    pub channel_id: ChannelId,
    pub period: Period,
    pub format: OutputFormat,
}

/// A stored reporting schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub server_id: ServerId,
    pub local_id: u32,
    pub time: NaiveTime,
    pub channel_id: ChannelId,
    pub created_by: UserId,
    pub period: Period,
    pub format: OutputFormat,
    pub status: ScheduleStatus,
}

impl Schedule {
    pub fn is_enabled(&self) -> bool {
        self.status == ScheduleStatus::Enabled
    }
}
