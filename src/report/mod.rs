//! Report generation
//!
//! Reports are assembled from stored history only; refreshing the data
//! first is the caller's job (the scheduler collects before reporting).

pub mod chart;
pub mod roster;
pub mod table;

pub use chart::{build_chart, RankChart};
pub use roster::{build_player_report, build_roster_report, date_label, PlayerHistory};
pub use table::ReportTable;

use crate::error::TrackerError;
use crate::metrics::MetricsCollector;
use crate::rank::{RankDelta, RankScale};
use crate::storage::HistoryStore;
use crate::types::{OutputFormat, Period, RegisteredPlayer, RiotId, ServerId};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// What to report on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub server_id: ServerId,
    pub period: Period,
    pub format: OutputFormat,
    /// Restrict to one registered player
    pub player: Option<RiotId>,
}

impl ReportRequest {
    pub fn new(server_id: ServerId, period: Period, format: OutputFormat) -> Self {
        Self {
            server_id,
            period,
            format,
            player: None,
        }
    }

    pub fn for_player(mut self, riot_id: RiotId) -> Self {
        self.player = Some(riot_id);
        self
    }
}

/// Machine-readable companion to a report body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAttachment {
    pub filename: String,
    pub content: String,
}

/// A report ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedReport {
    pub title: String,
    pub body: String,
    pub attachment: Option<ReportAttachment>,
}

impl RenderedReport {
    fn notice(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            attachment: None,
        }
    }
}

/// Builds reports from a history store
pub struct ReportService {
    store: Arc<dyn HistoryStore>,
    scale: RankScale,
    delta: RankDelta,
    utc_offset: FixedOffset,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ReportService {
    pub fn new(store: Arc<dyn HistoryStore>, scale: RankScale, utc_offset: FixedOffset) -> Self {
        Self {
            store,
            scale,
            delta: RankDelta::new(scale),
            utc_offset,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn generate(&self, request: &ReportRequest) -> crate::error::Result<RenderedReport> {
        self.generate_at(request, Utc::now())
    }

    /// Generate as of `now`. An unknown player is an error; a server with
    /// no players or no data yields a notice rather than an error.
    pub fn generate_at(
        &self,
        request: &ReportRequest,
        now: DateTime<Utc>,
    ) -> crate::error::Result<RenderedReport> {
        let period = request.period;
        let today = now.with_timezone(&self.utc_offset).date_naive();
        let lookback = period.lookback_days();
        let start = today - Duration::days(lookback);

        let players = self.players_for(request)?;
        if players.is_empty() {
            return Ok(RenderedReport::notice(
                format!("Rank Report ({})", roster::period_title(period)),
                "No players are registered on this server.",
            ));
        }

        let mut histories = Vec::with_capacity(players.len());
        for player in &players {
            let history = self.store.history(&player.key(), start, today)?;
            histories.push(PlayerHistory::new(player.riot_id.clone(), history));
        }
        debug!(
            "Loaded history for {} players ({} to {})",
            histories.len(),
            start,
            today
        );

        let report = match (request.format, &request.player) {
            (OutputFormat::Table, Some(riot_id)) => {
                match histories
                    .first()
                    .and_then(|history| build_player_report(history, lookback, &self.delta))
                {
                    Some(table) => RenderedReport {
                        title: table.title.clone(),
                        body: table.render(),
                        attachment: None,
                    },
                    None => RenderedReport::notice(
                        format!("{} Report", riot_id),
                        format!("No data for {} in the last {} days.", riot_id, lookback),
                    ),
                }
            }
            (OutputFormat::Table, None) => {
                match build_roster_report(&histories, today, period, self.utc_offset, &self.delta) {
                    Some(table) => RenderedReport {
                        title: table.title.clone(),
                        body: table.render(),
                        attachment: None,
                    },
                    None => RenderedReport::notice(
                        format!("Rank Report ({})", roster::period_title(period)),
                        format!("No rank data in the last {} days.", lookback),
                    ),
                }
            }
            (OutputFormat::Graph, player) => {
                let suffix = match player {
                    Some(riot_id) => format!(": {}", riot_id.display_name()),
                    None => " (All)".to_string(),
                };
                match build_chart(&histories, period, &self.scale, &suffix) {
                    Some(chart) => RenderedReport {
                        title: chart.title.clone(),
                        body: chart.render_text(),
                        attachment: Some(ReportAttachment {
                            filename: format!("rank_chart_{}.json", period.as_str()),
                            content: chart.to_json()?,
                        }),
                    },
                    None => RenderedReport::notice(
                        format!("Rank History{} ({})", suffix, period.as_str()),
                        format!("No chart data in the last {} days.", lookback),
                    ),
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_report(period, request.format);
        }
        info!(
            "Generated {} {} report for server {}",
            period, request.format, request.server_id
        );
        Ok(report)
    }

    fn players_for(&self, request: &ReportRequest) -> crate::error::Result<Vec<RegisteredPlayer>> {
        match &request.player {
            Some(riot_id) => {
                let player = self
                    .store
                    .find_player(request.server_id, riot_id)?
                    .ok_or_else(|| TrackerError::PlayerNotFound {
                        riot_id: riot_id.to_string(),
                    })?;
                Ok(vec![player])
            }
            None => self.store.players(Some(request.server_id)),
        }
    }
}
