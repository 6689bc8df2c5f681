//! Rank-over-time chart data
//!
//! The chart is produced as data rather than pixels: a JSON document an
//! external renderer can plot, plus a one-line sparkline per player for
//! plain-text channels.

use super::roster::{date_label, PlayerHistory};
use crate::rank::display::{display_width, format_rank_display, pad_to_width};
use crate::rank::history::bucket_latest;
use crate::rank::scale::{RankScale, TotalPoints, DIVISION_WIDTH};
use crate::types::Period;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    /// Axis label for the date under the chart's period
    pub date_label: String,
    pub total: TotalPoints,
    /// Exact rank at this point, e.g. `GII 50LP`
    pub label: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisTick {
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChart {
    pub title: String,
    pub period: Period,
    pub series: Vec<ChartSeries>,
    pub y_min: i64,
    pub y_max: i64,
    pub y_ticks: Vec<AxisTick>,
}

/// Build one series per player with data. Entries are reduced to the
/// latest per period bucket, and a series spanning a new year keeps only
/// the latest year. `None` when no player has any points.
pub fn build_chart(
    histories: &[PlayerHistory],
    period: Period,
    scale: &RankScale,
    title_suffix: &str,
) -> Option<RankChart> {
    let series: Vec<ChartSeries> = histories
        .iter()
        .filter_map(|history| build_series(history, period, scale))
        .collect();

    let values = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.total.value()));
    let (min, max) = values.fold(None, |range: Option<(i64, i64)>, v| match range {
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        None => Some((v, v)),
    })?;

    let y_min = min.div_euclid(DIVISION_WIDTH) * DIVISION_WIDTH;
    let y_max = (max.div_euclid(DIVISION_WIDTH) + 1) * DIVISION_WIDTH;
    let y_ticks = (y_min..=y_max)
        .step_by(DIVISION_WIDTH as usize)
        .map(|value| AxisTick {
            value,
            label: scale.decode(TotalPoints(value)).to_string(),
        })
        .collect();

    Some(RankChart {
        title: format!("Rank History{} ({})", title_suffix, period.as_str()),
        period,
        series,
        y_min,
        y_max,
        y_ticks,
    })
}

fn build_series(history: &PlayerHistory, period: Period, scale: &RankScale) -> Option<ChartSeries> {
    let dates: Vec<NaiveDate> = history.entries.keys().copied().collect();
    let mut kept = bucket_latest(&dates, period);

    let (first, last) = (kept.first().copied()?, kept.last().copied()?);
    if first.year() < last.year() {
        kept.retain(|date| date.year() == last.year());
    }

    let points = kept
        .into_iter()
        .filter_map(|date| {
            history.entries.get(&date).map(|snapshot| ChartPoint {
                date,
                date_label: date_label(date, period),
                total: scale.encode_snapshot(snapshot),
                label: format_rank_display(snapshot),
                points: snapshot.points,
            })
        })
        .collect();

    Some(ChartSeries {
        name: history.riot_id.display_name().to_string(),
        points,
    })
}

impl RankChart {
    /// Attachment payload for an external plotter
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One line per player: name, sparkline over the chart's range, first
    /// and last rank
    pub fn render_text(&self) -> String {
        let name_width = self
            .series
            .iter()
            .map(|s| display_width(&s.name))
            .max()
            .unwrap_or(0);

        let mut lines = vec![self.title.clone()];
        for series in &self.series {
            let spark: String = series
                .points
                .iter()
                .map(|p| self.spark_level(p.total.value()))
                .collect();
            let first = series.points.first().map(|p| p.label.as_str()).unwrap_or("-");
            let last = series.points.last().map(|p| p.label.as_str()).unwrap_or("-");
            lines.push(format!(
                "{} {} {} → {}",
                pad_to_width(&series.name, name_width),
                spark,
                first,
                last
            ));
        }

        let axis: Vec<&str> = self.y_ticks.iter().map(|t| t.label.as_str()).collect();
        if let (Some(low), Some(high)) = (axis.first(), axis.last()) {
            lines.push(format!("range: {} .. {}", low, high));
        }
        lines.join("\n")
    }

    fn spark_level(&self, value: i64) -> char {
        let span = (self.y_max - self.y_min).max(1);
        let offset = (value - self.y_min).clamp(0, span);
        let top = SPARK_LEVELS.len() as i64 - 1;
        let index = (offset * top / span) as usize;
        SPARK_LEVELS[index.min(SPARK_LEVELS.len() - 1)]
    }
}
