//! Rank collection runs
//!
//! A full run has three phases: resolve and renew every player
//! concurrently, give the provider time to refresh, then fetch and record
//! each renewed player one at a time. A single player's failure is counted
//! and logged but never aborts the run.

use crate::config::AppConfig;
use crate::metrics::{FetchOutcome, MetricsCollector};
use crate::provider::{RankReading, SnapshotProvider, SummonerRef};
use crate::storage::HistoryStore;
use crate::types::{RankSnapshot, RegisteredPlayer, ServerId};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Timing knobs for a collection run
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Wait after the renewal batch before fetching
    pub renewal_settle: Duration,
    /// Wait after renewing a single player
    pub single_renewal_wait: Duration,
    /// Pause between consecutive fetches
    pub fetch_delay: Duration,
    /// Offset that decides which calendar day a snapshot belongs to
    pub utc_offset: FixedOffset,
}

impl CollectorSettings {
    pub fn from_config(config: &AppConfig) -> crate::error::Result<Self> {
        Ok(Self {
            renewal_settle: config.renewal_settle(),
            single_renewal_wait: config.single_renewal_wait(),
            fetch_delay: config.fetch_delay(),
            utc_offset: config.utc_offset()?,
        })
    }

    /// No waits; for tests and offline providers
    pub fn immediate(utc_offset: FixedOffset) -> Self {
        Self {
            renewal_settle: Duration::ZERO,
            single_renewal_wait: Duration::ZERO,
            fetch_delay: Duration::ZERO,
            utc_offset,
        }
    }
}

/// Result of a full collection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub success: usize,
    pub unranked: usize,
    pub failed: usize,
    /// Riot ids that failed, without duplicates
    pub failed_players: Vec<String>,
    /// History entries written by backfill
    pub backfilled: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Why a player could not be collected
#[derive(Debug, Clone, PartialEq, Eq)]
enum Skip {
    NotFound,
    RenewalRefused,
    Error(String),
}

/// Collects current ranks from a provider into a history store
pub struct RankCollector {
    provider: Arc<dyn SnapshotProvider>,
    store: Arc<dyn HistoryStore>,
    settings: CollectorSettings,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RankCollector {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        store: Arc<dyn HistoryStore>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Calendar date of `now` in the configured offset
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.settings.utc_offset).date_naive()
    }

    /// Collect every registered player (optionally one server's)
    pub async fn collect_all(
        &self,
        server_id: Option<ServerId>,
        backfill: bool,
    ) -> crate::error::Result<CollectionSummary> {
        self.collect_all_at(server_id, backfill, "manual", Utc::now())
            .await
    }

    /// Full run as of `now`; `trigger` only labels metrics
    pub async fn collect_all_at(
        &self,
        server_id: Option<ServerId>,
        backfill: bool,
        trigger: &str,
        now: DateTime<Utc>,
    ) -> crate::error::Result<CollectionSummary> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let today = self.local_date(now);
        let players = self.store.players(server_id)?;

        info!(
            %run_id,
            "Starting rank collection for {} players (server: {:?}, backfill: {})",
            players.len(),
            server_id,
            backfill
        );

        let mut summary = CollectionSummary {
            run_id,
            total: players.len(),
            success: 0,
            unranked: 0,
            failed: 0,
            failed_players: Vec::new(),
            backfilled: 0,
            started_at: now,
            finished_at: now,
        };
        let mut failed = BTreeSet::new();

        // Phase 1: resolve and renew concurrently
        let renewals = join_all(players.iter().map(|player| self.resolve_and_renew(player))).await;

        let mut renewed = Vec::new();
        for (player, outcome) in players.iter().zip(renewals) {
            match outcome {
                Ok(summoner) => renewed.push((player, summoner)),
                Err(skip) => {
                    warn!(%run_id, "Skipping {}: {:?}", player.riot_id, skip);
                    self.record_outcome(FetchOutcome::Failed);
                    summary.failed += 1;
                    failed.insert(player.riot_id.to_string());
                }
            }
        }
        info!(
            %run_id,
            "Renewal requests sent. Accepted: {}, failed: {}",
            renewed.len(),
            summary.failed
        );

        // Phase 2: let the provider refresh
        if !renewed.is_empty() && !self.settings.renewal_settle.is_zero() {
            debug!(%run_id, "Waiting {:?} for provider refresh", self.settings.renewal_settle);
            tokio::time::sleep(self.settings.renewal_settle).await;
        }

        // Phase 3: fetch sequentially
        for (index, (player, summoner)) in renewed.iter().enumerate() {
            if index > 0 && !self.settings.fetch_delay.is_zero() {
                tokio::time::sleep(self.settings.fetch_delay).await;
            }

            match self.fetch_and_record(player, summoner, today, now).await {
                Ok(Some(snapshot)) => {
                    info!(
                        %run_id,
                        "Recorded {}: {} {:?} {}LP (W:{} L:{})",
                        player.riot_id,
                        snapshot.tier,
                        snapshot.division,
                        snapshot.points,
                        snapshot.wins,
                        snapshot.losses
                    );
                    self.record_outcome(FetchOutcome::Success);
                    summary.success += 1;

                    if backfill {
                        match self.backfill(player, summoner, today).await {
                            Ok(written) => summary.backfilled += written,
                            Err(e) => warn!(%run_id, "Backfill failed for {}: {}", player.riot_id, e),
                        }
                    }
                }
                Ok(None) => {
                    info!(%run_id, "{} is unranked, nothing recorded", player.riot_id);
                    self.record_outcome(FetchOutcome::Unranked);
                    summary.unranked += 1;
                }
                Err(e) => {
                    error!(%run_id, "Failed to fetch {}: {}", player.riot_id, e);
                    self.record_outcome(FetchOutcome::Failed);
                    summary.failed += 1;
                    failed.insert(player.riot_id.to_string());
                }
            }
        }

        summary.failed_players = failed.into_iter().collect();
        summary.finished_at = now + chrono::Duration::milliseconds(started.elapsed().as_millis() as i64);

        if let Some(metrics) = &self.metrics {
            metrics.record_collection_run(trigger, started.elapsed(), summary.finished_at.timestamp());
        }

        info!(
            %run_id,
            "Collection completed: total={}, success={}, unranked={}, failed={}",
            summary.total,
            summary.success,
            summary.unranked,
            summary.failed
        );
        Ok(summary)
    }

    /// Collect a single player right away. Returns the recorded snapshot,
    /// or `None` when the player is currently unranked.
    pub async fn collect_one(
        &self,
        player: &RegisteredPlayer,
    ) -> crate::error::Result<Option<RankSnapshot>> {
        let now = Utc::now();
        let summoner = self
            .provider
            .lookup(&player.riot_id)
            .await?
            .ok_or_else(|| crate::error::TrackerError::PlayerNotFound {
                riot_id: player.riot_id.to_string(),
            })?;

        if !self.provider.renew(&summoner).await? {
            warn!("Renewal refused for {}, fetching cached data", player.riot_id);
        }
        if !self.settings.single_renewal_wait.is_zero() {
            tokio::time::sleep(self.settings.single_renewal_wait).await;
        }

        let result = self
            .fetch_and_record(player, &summoner, self.local_date(now), now)
            .await;
        match &result {
            Ok(Some(_)) => self.record_outcome(FetchOutcome::Success),
            Ok(None) => self.record_outcome(FetchOutcome::Unranked),
            Err(_) => self.record_outcome(FetchOutcome::Failed),
        }
        result
    }

    async fn resolve_and_renew(&self, player: &RegisteredPlayer) -> Result<SummonerRef, Skip> {
        let summoner = match self.provider.lookup(&player.riot_id).await {
            Ok(Some(summoner)) => summoner,
            Ok(None) => return Err(Skip::NotFound),
            Err(e) => return Err(Skip::Error(e.to_string())),
        };

        match self.provider.renew(&summoner).await {
            Ok(true) => Ok(summoner),
            Ok(false) => Err(Skip::RenewalRefused),
            Err(e) => Err(Skip::Error(e.to_string())),
        }
    }

    async fn fetch_and_record(
        &self,
        player: &RegisteredPlayer,
        summoner: &SummonerRef,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> crate::error::Result<Option<RankSnapshot>> {
        let rank = match self.provider.current_rank(summoner).await? {
            RankReading::Ranked(rank) => rank,
            RankReading::Unranked => return Ok(None),
        };

        let snapshot = rank.into_snapshot(now)?;
        self.store.record_snapshot(&player.key(), date, &snapshot)?;
        Ok(Some(snapshot))
    }

    /// Fill days before `today` from the provider's tier history. Days that
    /// already hold a snapshot are left alone.
    async fn backfill(
        &self,
        player: &RegisteredPlayer,
        summoner: &SummonerRef,
        today: NaiveDate,
    ) -> crate::error::Result<usize> {
        let mut by_date: BTreeMap<NaiveDate, RankSnapshot> = BTreeMap::new();
        let mut entries = self.provider.tier_history(summoner).await?;
        entries.sort_by_key(|entry| entry.observed_at);

        for entry in entries {
            let date = self.local_date(entry.observed_at);
            if date >= today {
                continue;
            }
            match entry.rank.clone().into_snapshot(entry.observed_at) {
                Ok(snapshot) => {
                    by_date.insert(date, snapshot);
                }
                Err(e) => debug!("Ignoring history entry for {}: {}", player.riot_id, e),
            }
        }

        let Some(first) = by_date.keys().next().copied() else {
            return Ok(0);
        };

        let key = player.key();
        let existing: BTreeSet<NaiveDate> = self
            .store
            .history(&key, first, today)?
            .into_iter()
            .map(|entry| entry.date)
            .collect();

        let mut written = 0;
        for (date, snapshot) in by_date {
            if existing.contains(&date) {
                continue;
            }
            self.store.record_snapshot(&key, date, &snapshot)?;
            written += 1;
        }

        debug!("Backfilled {} days for {}", written, player.riot_id);
        Ok(written)
    }

    fn record_outcome(&self, outcome: FetchOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_player_fetch(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{HistoricalReading, MockSnapshotProvider, RawRank};
    use crate::storage::InMemoryStore;
    use crate::types::{Division, RiotId, Tier};
    use chrono::TimeZone;
    use mockall::predicate::eq;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn summoner(id: &str, riot_id: &RiotId) -> SummonerRef {
        SummonerRef {
            summoner_id: id.to_string(),
            riot_id: riot_id.clone(),
        }
    }

    fn register(store: &InMemoryStore, name: &str) -> RegisteredPlayer {
        store
            .register_player(1, 100, &RiotId::new(name, "jp1"), None)
            .unwrap()
    }

    #[tokio::test]
    async fn test_collect_all_counts_every_outcome() {
        let store = Arc::new(InMemoryStore::new());
        let ranked = register(&store, "ranked");
        let unranked = register(&store, "unranked");
        let missing = register(&store, "missing");
        let refused = register(&store, "refused");

        let mut provider = MockSnapshotProvider::new();
        let ids = [
            (ranked.riot_id.clone(), Some("s-ranked")),
            (unranked.riot_id.clone(), Some("s-unranked")),
            (missing.riot_id.clone(), None),
            (refused.riot_id.clone(), Some("s-refused")),
        ];
        for (riot_id, summoner_id) in ids {
            let found = summoner_id.map(|id| summoner(id, &riot_id));
            provider
                .expect_lookup()
                .with(eq(riot_id))
                .returning(move |_| Ok(found.clone()));
        }
        provider
            .expect_renew()
            .returning(|s| Ok(s.summoner_id != "s-refused"));
        provider.expect_current_rank().returning(|s| {
            if s.summoner_id == "s-ranked" {
                Ok(RankReading::Ranked(
                    RawRank::new("GOLD", "II", 50).with_record(12, 10),
                ))
            } else {
                Ok(RankReading::Unranked)
            }
        });
        provider.expect_tier_history().never();

        let collector = RankCollector::new(
            Arc::new(provider),
            store.clone(),
            CollectorSettings::immediate(jst()),
        );
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 20, 0, 0).unwrap();
        let summary = collector
            .collect_all_at(Some(1), false, "manual", now)
            .await
            .unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.unranked, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(
            summary.success + summary.unranked + summary.failed,
            summary.total
        );
        assert_eq!(
            summary.failed_players,
            vec!["missing#JP1".to_string(), "refused#JP1".to_string()]
        );

        // 20:00 UTC is the next morning in +09:00
        let today = NaiveDate::from_ymd_opt(2024, 5, 11).unwrap();
        let history = store.history_since(&ranked.key(), today).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].snapshot.tier, Tier::Gold);
        assert_eq!(history[0].snapshot.division, Some(Division::II));
        assert!(store.history_since(&unranked.key(), today).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_errors_do_not_abort_run() {
        let store = Arc::new(InMemoryStore::new());
        let first = register(&store, "first");
        let second = register(&store, "second");

        let mut provider = MockSnapshotProvider::new();
        provider
            .expect_lookup()
            .returning(|id| Ok(Some(summoner(&id.game_name, id))));
        provider.expect_renew().returning(|_| Ok(true));
        provider.expect_current_rank().returning(|s| {
            if s.summoner_id == "first" {
                Err(anyhow::anyhow!("HTTP 500"))
            } else {
                Ok(RankReading::Ranked(RawRank::new("SILVER", "I", 90)))
            }
        });

        let collector = RankCollector::new(
            Arc::new(provider),
            store.clone(),
            CollectorSettings::immediate(jst()),
        );
        let summary = collector.collect_all(None, false).await.unwrap();

        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_players, vec![first.riot_id.to_string()]);
        let today = collector.local_date(Utc::now());
        assert_eq!(store.history_since(&second.key(), today).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backfill_skips_today_and_existing_days() {
        let store = Arc::new(InMemoryStore::new());
        let player = register(&store, "alice");
        let key = player.key();
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();

        let real = RankSnapshot::new(Tier::Gold, Some(Division::III), 10, 40, 38, Utc::now());
        store.record_snapshot(&key, day(8), &real).unwrap();

        let at = |d: u32, h: u32| Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap();
        let history = vec![
            HistoricalReading { rank: RawRank::new("GOLD", "IV", 70), observed_at: at(6, 1) },
            HistoricalReading { rank: RawRank::new("GOLD", "IV", 90), observed_at: at(6, 5) },
            HistoricalReading { rank: RawRank::new("GOLD", "III", 5), observed_at: at(8, 2) },
            HistoricalReading { rank: RawRank::new("GOLD", "III", 30), observed_at: at(10, 3) },
            HistoricalReading { rank: RawRank::new("UNRANKED", "", 0), observed_at: at(7, 3) },
        ];

        let mut provider = MockSnapshotProvider::new();
        provider
            .expect_lookup()
            .returning(|id| Ok(Some(summoner("sid", id))));
        provider.expect_renew().returning(|_| Ok(true));
        provider.expect_current_rank().returning(|_| {
            Ok(RankReading::Ranked(
                RawRank::new("GOLD", "III", 30).with_record(45, 40),
            ))
        });
        provider
            .expect_tier_history()
            .times(1)
            .returning(move |_| Ok(history.clone()));

        let collector = RankCollector::new(
            Arc::new(provider),
            store.clone(),
            CollectorSettings::immediate(jst()),
        );
        let now = at(10, 6);
        let summary = collector
            .collect_all_at(None, true, "manual", now)
            .await
            .unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.backfilled, 1);

        let stored = store.history_since(&key, day(1)).unwrap();
        let dates: Vec<NaiveDate> = stored.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(6), day(8), day(10)]);
        // latest reading of the day wins, backfilled rows carry no record
        assert_eq!(stored[0].snapshot.points, 90);
        assert_eq!(stored[0].snapshot.wins, 0);
        // the real observation on the 8th survives
        assert_eq!(stored[1].snapshot.wins, 40);
        assert_eq!(stored[2].snapshot.wins, 45);
    }

    #[tokio::test]
    async fn test_collect_one_records_and_reports_missing() {
        let store = Arc::new(InMemoryStore::new());
        let player = register(&store, "solo");
        let ghost = register(&store, "ghost");

        let mut provider = MockSnapshotProvider::new();
        let solo_id = player.riot_id.clone();
        provider.expect_lookup().returning(move |id| {
            if id == &solo_id {
                Ok(Some(summoner("sid", id)))
            } else {
                Ok(None)
            }
        });
        provider.expect_renew().times(1).returning(|_| Ok(false));
        provider.expect_current_rank().returning(|_| {
            Ok(RankReading::Ranked(RawRank::new("CHALLENGER", "I", 1500)))
        });

        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let collector = RankCollector::new(
            Arc::new(provider),
            store.clone(),
            CollectorSettings::immediate(jst()),
        )
        .with_metrics(metrics.clone());

        let snapshot = collector.collect_one(&player).await.unwrap().unwrap();
        assert_eq!(snapshot.tier, Tier::Challenger);
        assert_eq!(snapshot.division, None);
        assert_eq!(snapshot.points, 1500);

        assert!(collector.collect_one(&ghost).await.is_err());
        assert_eq!(
            metrics
                .collection()
                .player_fetches_total
                .with_label_values(&["success"])
                .get(),
            1
        );
    }
}
