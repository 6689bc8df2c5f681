//! Snapshot selection over a player's history

use crate::types::{DatedSnapshot, Period, RankSnapshot};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Latest snapshot dated on or before `target`, if any
pub fn nearest_on_or_before(
    history: &BTreeMap<NaiveDate, RankSnapshot>,
    target: NaiveDate,
) -> Option<&RankSnapshot> {
    history.range(..=target).next_back().map(|(_, snapshot)| snapshot)
}

/// Same policy over an unordered slice; ties on the date go to the later
/// observation time
pub fn nearest_in_slice(history: &[DatedSnapshot], target: NaiveDate) -> Option<&RankSnapshot> {
    history
        .iter()
        .filter(|entry| entry.date <= target)
        .max_by_key(|entry| (entry.date, entry.snapshot.observed_at))
        .map(|entry| &entry.snapshot)
}

/// Grouping key for a date under a reporting period
fn bucket_key(date: NaiveDate, period: Period) -> (i32, u32) {
    match period {
        Period::Daily => (date.year(), date.ordinal()),
        Period::Weekly => {
            let week = date.iso_week();
            (week.year(), week.week())
        }
        Period::Monthly => (date.year(), date.month()),
    }
}

/// Keep the latest date of each bucket: every date for daily, one per ISO
/// week for weekly, one per calendar month for monthly. Output is ascending.
pub fn bucket_latest(dates: &[NaiveDate], period: Period) -> Vec<NaiveDate> {
    let mut buckets: BTreeMap<(i32, u32), NaiveDate> = BTreeMap::new();
    for &date in dates {
        buckets
            .entry(bucket_key(date, period))
            .and_modify(|kept| {
                if date > *kept {
                    *kept = date;
                }
            })
            .or_insert(date);
    }

    let mut latest: Vec<NaiveDate> = buckets.into_values().collect();
    latest.sort();
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Division, Tier};
    use chrono::{TimeZone, Utc};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snap(points: i64) -> RankSnapshot {
        RankSnapshot::new(Tier::Gold, Some(Division::II), points, 0, 0, Utc::now())
    }

    #[test]
    fn test_nearest_picks_latest_on_or_before() {
        let mut history = BTreeMap::new();
        history.insert(day(2024, 5, 1), snap(10));
        history.insert(day(2024, 5, 3), snap(30));
        history.insert(day(2024, 5, 6), snap(60));

        assert_eq!(nearest_on_or_before(&history, day(2024, 5, 3)).unwrap().points, 30);
        assert_eq!(nearest_on_or_before(&history, day(2024, 5, 5)).unwrap().points, 30);
        assert_eq!(nearest_on_or_before(&history, day(2024, 5, 9)).unwrap().points, 60);
        assert!(nearest_on_or_before(&history, day(2024, 4, 30)).is_none());
    }

    #[test]
    fn test_nearest_in_slice_breaks_ties_by_time() {
        let early = Utc.with_ymd_and_hms(2024, 5, 3, 1, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 5, 3, 23, 0, 0).unwrap();
        let history = vec![
            DatedSnapshot {
                date: day(2024, 5, 3),
                snapshot: RankSnapshot::new(Tier::Gold, Some(Division::II), 99, 0, 0, late),
            },
            DatedSnapshot {
                date: day(2024, 5, 3),
                snapshot: RankSnapshot::new(Tier::Gold, Some(Division::II), 11, 0, 0, early),
            },
            DatedSnapshot {
                date: day(2024, 5, 8),
                snapshot: snap(80),
            },
        ];

        assert_eq!(nearest_in_slice(&history, day(2024, 5, 4)).unwrap().points, 99);
        assert!(nearest_in_slice(&history, day(2024, 5, 1)).is_none());
    }

    #[test]
    fn test_bucket_latest_weekly() {
        // 2024-05-06 is a Monday
        let dates = vec![
            day(2024, 5, 6),
            day(2024, 5, 8),
            day(2024, 5, 12),
            day(2024, 5, 13),
            day(2024, 5, 15),
        ];
        assert_eq!(
            bucket_latest(&dates, Period::Weekly),
            vec![day(2024, 5, 12), day(2024, 5, 15)]
        );
    }

    #[test]
    fn test_bucket_latest_monthly_and_daily() {
        let dates = vec![day(2024, 1, 31), day(2024, 1, 2), day(2024, 2, 1), day(2024, 2, 28)];
        assert_eq!(
            bucket_latest(&dates, Period::Monthly),
            vec![day(2024, 1, 31), day(2024, 2, 28)]
        );
        assert_eq!(bucket_latest(&dates, Period::Daily).len(), 4);
    }
}
