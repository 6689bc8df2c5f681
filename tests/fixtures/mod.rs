//! Test fixtures shared by the integration tests

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use rank_tracker::collector::{CollectorSettings, RankCollector};
use rank_tracker::error::Result;
use rank_tracker::provider::{RawRank, StaticSnapshotProvider};
use rank_tracker::rank::RankScale;
use rank_tracker::report::{RenderedReport, ReportService};
use rank_tracker::scheduler::ReportSink;
use rank_tracker::storage::SqliteStore;
use rank_tracker::types::{ChannelId, RiotId};
use std::sync::{Arc, Mutex};

pub const SERVER: u64 = 100;

/// Sink that keeps every delivered report
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(ChannelId, RenderedReport)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<(ChannelId, RenderedReport)> {
        self.delivered
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, channel_id: ChannelId, report: &RenderedReport) -> Result<()> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push((channel_id, report.clone()));
        }
        Ok(())
    }
}

pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

/// `hour` o'clock JST on the given May 2024 day
pub fn may_jst(day: u32, hour: u32) -> DateTime<Utc> {
    jst()
        .with_ymd_and_hms(2024, 5, day, hour, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn may(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

pub fn alice() -> RiotId {
    RiotId::new("alice", "JP1")
}

pub fn bob() -> RiotId {
    RiotId::new("bob", "JP1")
}

/// Store, provider, collector and report service over one in-memory database
pub struct TestSystem {
    pub store: Arc<SqliteStore>,
    pub provider: Arc<StaticSnapshotProvider>,
    pub collector: Arc<RankCollector>,
    pub reports: Arc<ReportService>,
}

impl TestSystem {
    pub fn new() -> Self {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let provider = Arc::new(StaticSnapshotProvider::new());
        let collector = Arc::new(RankCollector::new(
            provider.clone(),
            store.clone(),
            CollectorSettings::immediate(jst()),
        ));
        let reports = Arc::new(ReportService::new(store.clone(), RankScale::default(), jst()));

        Self {
            store,
            provider,
            collector,
            reports,
        }
    }

    pub fn set_rank(&self, riot_id: &RiotId, tier: &str, division: &str, points: i64, wins: i64, losses: i64) {
        self.provider
            .set_rank(riot_id, RawRank::new(tier, division, points).with_record(wins, losses))
            .unwrap();
    }
}
