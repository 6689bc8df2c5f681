//! Tabular reports: the server roster overview and a single player's log

use super::table::ReportTable;
use crate::rank::delta::{RankDelta, NO_DATA};
use crate::rank::display::format_rank_display;
use crate::rank::history::{bucket_latest, nearest_on_or_before};
use crate::rank::GameRecord;
use crate::types::{DatedSnapshot, Period, RankSnapshot, RiotId};
use chrono::{Datelike, Duration, FixedOffset, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

/// Most recent date columns shown in the roster table
pub const MAX_DATE_COLUMNS: usize = 5;

/// One player's stored history, keyed by collection date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerHistory {
    pub riot_id: RiotId,
    pub entries: BTreeMap<NaiveDate, RankSnapshot>,
}

impl PlayerHistory {
    pub fn new(riot_id: RiotId, history: Vec<DatedSnapshot>) -> Self {
        let entries = history
            .into_iter()
            .map(|entry| (entry.date, entry.snapshot))
            .collect();
        Self { riot_id, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn period_title(period: Period) -> &'static str {
    match period {
        Period::Daily => "Daily",
        Period::Weekly => "Weekly",
        Period::Monthly => "Monthly",
    }
}

/// Column label for a date: `05/10`, `May W2` or `May`
pub fn date_label(date: NaiveDate, period: Period) -> String {
    match period {
        Period::Daily => date.format("%m/%d").to_string(),
        Period::Weekly => format!("{} W{}", date.format("%b"), (date.day() - 1) / 7 + 1),
        Period::Monthly => date.format("%b").to_string(),
    }
}

/// Roster overview: one row per player, the most recent bucketed dates as
/// columns, then the recent and whole-span diffs. `None` when nobody has
/// any history in range.
pub fn build_roster_report(
    histories: &[PlayerHistory],
    today: NaiveDate,
    period: Period,
    utc_offset: FixedOffset,
    delta: &RankDelta,
) -> Option<ReportTable> {
    let all_dates: Vec<NaiveDate> = histories
        .iter()
        .flat_map(|history| history.entries.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let (first, anchor) = match (all_dates.first(), all_dates.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return None,
    };

    let bucketed = bucket_latest(&all_dates, period);
    let shown = &bucketed[bucketed.len().saturating_sub(MAX_DATE_COLUMNS)..];

    let mut headers = vec!["Riot ID".to_string()];
    for date in shown {
        let mut label = date_label(*date, period);
        if *date == today {
            label.push_str(&observation_suffix(histories, today, utc_offset));
        }
        headers.push(label);
    }
    headers.push(period.recent_diff_label().to_string());
    headers.push(period.span_diff_label().to_string());

    let mut table = ReportTable::new(
        format!("Rank Report ({})", period_title(period)),
        headers,
    );

    let recent_target = anchor - Duration::days(period.recent_offset_days());
    for history in histories {
        let mut row = vec![history.riot_id.display_name().to_string()];

        for date in shown {
            row.push(
                history
                    .entries
                    .get(date)
                    .map(format_rank_display)
                    .unwrap_or_else(|| NO_DATA.to_string()),
            );
        }

        let latest = history.entries.get(&anchor);
        let recent = nearest_on_or_before(&history.entries, recent_target);
        let start = nearest_on_or_before(&history.entries, first);
        row.push(delta.compare(recent, latest, true).to_string());
        row.push(delta.compare(start, latest, true).to_string());

        table.push_row(row);
    }

    Some(table)
}

/// `(HH:MM)` of the first observation recorded today
fn observation_suffix(histories: &[PlayerHistory], today: NaiveDate, offset: FixedOffset) -> String {
    histories
        .iter()
        .find_map(|history| history.entries.get(&today))
        .map(|snapshot| {
            format!(
                "({})",
                snapshot.observed_at.with_timezone(&offset).format("%H:%M")
            )
        })
        .unwrap_or_else(|| "(now)".to_string())
}

/// A single player's entries, newest first, each compared with the entry
/// before it. `None` when the player has no history in range.
pub fn build_player_report(
    history: &PlayerHistory,
    lookback_days: i64,
    delta: &RankDelta,
) -> Option<ReportTable> {
    if history.is_empty() {
        return None;
    }

    let headers = ["Date", "Rank", "Diff", "Record"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let mut table = ReportTable::new(
        format!("{} Report (Last {} Days)", history.riot_id, lookback_days),
        headers,
    );

    let entries: Vec<(&NaiveDate, &RankSnapshot)> = history.entries.iter().rev().collect();
    for (index, (date, snapshot)) in entries.iter().enumerate() {
        let previous = entries.get(index + 1).map(|(_, snapshot)| *snapshot);

        let (diff, record) = match previous {
            Some(previous) => (
                delta.compare_snapshots(previous, snapshot, false).transition,
                GameRecord::between(previous, snapshot)
                    .map(|record| record.compact())
                    .unwrap_or_else(|| NO_DATA.to_string()),
            ),
            None => (NO_DATA.to_string(), NO_DATA.to_string()),
        };

        table.push_row(vec![
            date.format("%m/%d").to_string(),
            format_rank_display(snapshot),
            diff,
            record,
        ]);
    }

    Some(table)
}
