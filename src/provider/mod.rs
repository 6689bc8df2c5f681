//! Stats provider interface and implementations
//!
//! The collector talks to the provider only through [`SnapshotProvider`].
//! [`OpggClient`] is the live HTTP adapter; [`StaticSnapshotProvider`] serves
//! canned readings for tests and local runs.

pub mod client;
pub mod parse;

pub use client::OpggClient;

use crate::error::{TrackerError, UnrecognizedTier};
use crate::types::{RankSnapshot, RiotId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Provider-side handle for a resolved account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummonerRef {
    pub summoner_id: String,
    pub riot_id: RiotId,
}

/// Rank fields exactly as the provider reports them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRank {
    pub tier: String,
    /// Roman numeral, or empty for apex tiers
    pub division: String,
    pub points: i64,
    pub wins: i64,
    pub losses: i64,
}

impl RawRank {
    pub fn new(tier: impl Into<String>, division: impl Into<String>, points: i64) -> Self {
        Self {
            tier: tier.into(),
            division: division.into(),
            points,
            wins: 0,
            losses: 0,
        }
    }

    pub fn with_record(mut self, wins: i64, losses: i64) -> Self {
        self.wins = wins;
        self.losses = losses;
        self
    }

    pub fn into_snapshot(self, observed_at: DateTime<Utc>) -> Result<RankSnapshot, UnrecognizedTier> {
        RankSnapshot::from_raw(
            &self.tier,
            &self.division,
            self.points,
            self.wins,
            self.losses,
            observed_at,
        )
    }
}

/// Current solo-queue standing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankReading {
    Ranked(RawRank),
    Unranked,
}

/// One entry of the provider's own tier history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalReading {
    pub rank: RawRank,
    pub observed_at: DateTime<Utc>,
}

/// Trait for fetching ranked standings from an external stats site
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Resolve a Riot id to the provider's summoner handle
    async fn lookup(&self, riot_id: &RiotId) -> crate::error::Result<Option<SummonerRef>>;

    /// Ask the provider to refresh its cached data; `true` when accepted
    async fn renew(&self, summoner: &SummonerRef) -> crate::error::Result<bool>;

    /// Current solo-queue rank
    async fn current_rank(&self, summoner: &SummonerRef) -> crate::error::Result<RankReading>;

    /// The provider's recorded tier history, oldest first
    async fn tier_history(
        &self,
        summoner: &SummonerRef,
    ) -> crate::error::Result<Vec<HistoricalReading>>;
}

#[derive(Debug, Clone)]
struct StaticEntry {
    summoner: SummonerRef,
    reading: RankReading,
    history: Vec<HistoricalReading>,
    renewable: bool,
}

/// In-memory provider for tests and development
#[derive(Debug, Default)]
pub struct StaticSnapshotProvider {
    entries: RwLock<HashMap<String, StaticEntry>>,
    renewals: RwLock<Vec<String>>,
}

impl StaticSnapshotProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a player's current reading
    pub fn set_reading(&self, riot_id: &RiotId, reading: RankReading) -> crate::error::Result<()> {
        let mut entries = self.write_entries()?;
        let next_id = entries.len() + 1;
        entries
            .entry(riot_id.to_string())
            .and_modify(|entry| entry.reading = reading.clone())
            .or_insert_with(|| StaticEntry {
                summoner: SummonerRef {
                    summoner_id: format!("static-{}", next_id),
                    riot_id: riot_id.clone(),
                },
                reading,
                history: Vec::new(),
                renewable: true,
            });
        Ok(())
    }

    pub fn set_rank(&self, riot_id: &RiotId, rank: RawRank) -> crate::error::Result<()> {
        self.set_reading(riot_id, RankReading::Ranked(rank))
    }

    pub fn set_history(
        &self,
        riot_id: &RiotId,
        history: Vec<HistoricalReading>,
    ) -> crate::error::Result<()> {
        let mut entries = self.write_entries()?;
        let entry = entries
            .get_mut(&riot_id.to_string())
            .ok_or_else(|| TrackerError::PlayerNotFound {
                riot_id: riot_id.to_string(),
            })?;
        entry.history = history;
        Ok(())
    }

    /// Make renewal requests for this player get rejected
    pub fn refuse_renewal(&self, riot_id: &RiotId) -> crate::error::Result<()> {
        let mut entries = self.write_entries()?;
        if let Some(entry) = entries.get_mut(&riot_id.to_string()) {
            entry.renewable = false;
        }
        Ok(())
    }

    /// Summoner ids that were sent a renewal request, in call order
    pub fn renewals(&self) -> crate::error::Result<Vec<String>> {
        let renewals = self.renewals.read().map_err(|_| TrackerError::InternalError {
            message: "Failed to acquire renewals read lock".to_string(),
        })?;
        Ok(renewals.clone())
    }

    fn write_entries(
        &self,
    ) -> crate::error::Result<std::sync::RwLockWriteGuard<'_, HashMap<String, StaticEntry>>> {
        self.entries.write().map_err(|_| {
            TrackerError::InternalError {
                message: "Failed to acquire provider write lock".to_string(),
            }
            .into()
        })
    }

    fn entry(&self, key: &str) -> crate::error::Result<Option<StaticEntry>> {
        let entries = self.entries.read().map_err(|_| TrackerError::InternalError {
            message: "Failed to acquire provider read lock".to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    fn known_entry(&self, summoner: &SummonerRef) -> crate::error::Result<StaticEntry> {
        self.entry(&summoner.riot_id.to_string())?
            .ok_or_else(|| {
                TrackerError::ProviderError {
                    message: format!("unknown summoner {}", summoner.summoner_id),
                }
                .into()
            })
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn lookup(&self, riot_id: &RiotId) -> crate::error::Result<Option<SummonerRef>> {
        Ok(self.entry(&riot_id.to_string())?.map(|entry| entry.summoner))
    }

    async fn renew(&self, summoner: &SummonerRef) -> crate::error::Result<bool> {
        let entry = self.known_entry(summoner)?;
        let mut renewals = self.renewals.write().map_err(|_| TrackerError::InternalError {
            message: "Failed to acquire renewals write lock".to_string(),
        })?;
        renewals.push(summoner.summoner_id.clone());
        Ok(entry.renewable)
    }

    async fn current_rank(&self, summoner: &SummonerRef) -> crate::error::Result<RankReading> {
        Ok(self.known_entry(summoner)?.reading)
    }

    async fn tier_history(
        &self,
        summoner: &SummonerRef,
    ) -> crate::error::Result<Vec<HistoricalReading>> {
        Ok(self.known_entry(summoner)?.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Division, Tier};

    #[test]
    fn test_raw_rank_into_snapshot() {
        let snapshot = RawRank::new("emerald", "III", 42)
            .with_record(10, 8)
            .into_snapshot(Utc::now())
            .unwrap();
        assert_eq!(snapshot.tier, Tier::Emerald);
        assert_eq!(snapshot.division, Some(Division::III));
        assert_eq!(snapshot.games(), 18);

        assert!(RawRank::new("UNRANKED", "", 0).into_snapshot(Utc::now()).is_err());
    }

    #[tokio::test]
    async fn test_static_provider_lookup_and_rank() {
        let provider = StaticSnapshotProvider::new();
        let id = RiotId::new("alice", "jp1");
        provider.set_rank(&id, RawRank::new("GOLD", "II", 50)).unwrap();

        let summoner = provider.lookup(&id).await.unwrap().unwrap();
        assert_eq!(summoner.summoner_id, "static-1");
        assert!(provider.renew(&summoner).await.unwrap());
        assert_eq!(
            provider.current_rank(&summoner).await.unwrap(),
            RankReading::Ranked(RawRank::new("GOLD", "II", 50))
        );
        assert_eq!(provider.renewals().unwrap(), vec!["static-1".to_string()]);

        let missing = RiotId::new("bob", "jp1");
        assert!(provider.lookup(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_static_provider_refused_renewal() {
        let provider = StaticSnapshotProvider::new();
        let id = RiotId::new("carol", "kr");
        provider.set_reading(&id, RankReading::Unranked).unwrap();
        provider.refuse_renewal(&id).unwrap();

        let summoner = provider.lookup(&id).await.unwrap().unwrap();
        assert!(!provider.renew(&summoner).await.unwrap());
        assert_eq!(
            provider.current_rank(&summoner).await.unwrap(),
            RankReading::Unranked
        );
    }
}
