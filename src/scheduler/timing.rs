//! Fire-time calculation in a fixed UTC offset

use crate::types::Period;
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

/// Weekly reports go out on this day
pub const WEEKLY_REPORT_DAY: Weekday = Weekday::Fri;

/// Whether a report of `period` runs on `date`
pub fn runs_on(period: Period, date: NaiveDate) -> bool {
    match period {
        Period::Daily => true,
        Period::Weekly => date.weekday() == WEEKLY_REPORT_DAY,
        Period::Monthly => date.day() == 1,
    }
}

/// Next instant strictly after `now` at which a `period` job at local
/// `time` fires: every day, every Friday, or the first of each month.
pub fn next_fire(
    time: NaiveTime,
    period: Period,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&offset).date_naive();

    // a month and a bit covers every period
    (0..=32u64).find_map(|ahead| {
        let date = today.checked_add_days(Days::new(ahead))?;
        if !runs_on(period, date) {
            return None;
        }
        let fire = offset
            .from_local_datetime(&date.and_time(time))
            .single()?
            .with_timezone(&Utc);
        (fire > now).then_some(fire)
    })
}

/// Next daily fire, used for the collection job
pub fn next_daily(time: NaiveTime, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    next_fire(time, Period::Daily, now, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_daily_later_today_or_tomorrow() {
        // 2024-05-10 10:00 JST
        let now = utc(2024, 5, 10, 1, 0);
        assert_eq!(
            next_fire(at(21, 0), Period::Daily, now, jst()),
            Some(utc(2024, 5, 10, 12, 0))
        );
        assert_eq!(
            next_fire(at(9, 0), Period::Daily, now, jst()),
            Some(utc(2024, 5, 11, 0, 0))
        );
    }

    #[test]
    fn test_fire_time_is_strictly_after_now() {
        let now = utc(2024, 5, 10, 12, 0);
        assert_eq!(
            next_daily(at(21, 0), now, jst()),
            Some(utc(2024, 5, 11, 12, 0))
        );
    }

    #[test]
    fn test_weekly_fires_on_friday() {
        // Saturday 2024-05-11 in JST
        let now = utc(2024, 5, 11, 3, 0);
        let fire = next_fire(at(9, 30), Period::Weekly, now, jst()).unwrap();
        let local = fire.with_timezone(&jst());
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 17).unwrap());
        assert_eq!(local.time(), at(9, 30));
    }

    #[test]
    fn test_monthly_fires_on_first() {
        let now = utc(2024, 1, 31, 23, 0); // already Feb 1 08:00 JST
        let fire = next_fire(at(8, 0), Period::Monthly, now, jst()).unwrap();
        assert_eq!(fire, utc(2024, 2, 29, 23, 0));
        assert_eq!(
            fire.with_timezone(&jst()).date_naive(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );

        let before = utc(2024, 1, 31, 22, 0); // Feb 1 07:00 JST
        let fire = next_fire(at(8, 0), Period::Monthly, before, jst()).unwrap();
        assert_eq!(
            fire.with_timezone(&jst()).date_naive(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_runs_on() {
        let friday = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert!(runs_on(Period::Weekly, friday));
        assert!(!runs_on(Period::Weekly, friday.succ_opt().unwrap()));
        assert!(runs_on(Period::Monthly, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
        assert!(runs_on(Period::Daily, friday));
    }
}
