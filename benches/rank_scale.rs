//! Performance benchmarks for rank encoding, comparison, and reporting

use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rank_tracker::rank::{RankDelta, RankScale};
use rank_tracker::report::{build_chart, build_roster_report, PlayerHistory};
use rank_tracker::types::{DatedSnapshot, Division, Period, RankSnapshot, RiotId, Tier};

fn bench_encode_decode(c: &mut Criterion) {
    let scale = RankScale::default();

    c.bench_function("encode_all_ranks", |b| {
        b.iter(|| {
            let mut total = 0i64;
            for tier in Tier::ALL {
                if tier.is_apex() {
                    total += scale.encode(tier, None, black_box(250)).value();
                    continue;
                }
                for division in Division::ALL {
                    total += scale.encode(tier, Some(division), black_box(50)).value();
                }
            }
            total
        })
    });

    c.bench_function("encode_provider_strings", |b| {
        b.iter(|| {
            (
                scale.encode_str(black_box("gold"), black_box("II"), 50),
                scale.encode_str(black_box("UNRANKED"), black_box(""), 0),
            )
        })
    });

    c.bench_function("decode_full_range", |b| {
        b.iter(|| {
            (0..4000i64)
                .step_by(25)
                .map(|value| scale.decode(rank_tracker::rank::TotalPoints(black_box(value))))
                .count()
        })
    });
}

fn bench_compare(c: &mut Criterion) {
    let delta = RankDelta::new(RankScale::default());
    let at = Utc::now();
    let before = RankSnapshot::new(Tier::Silver, Some(Division::III), 10, 5, 5, at);
    let after = RankSnapshot::new(Tier::Gold, Some(Division::IV), 20, 8, 6, at);

    c.bench_function("compare_with_prefix", |b| {
        b.iter(|| delta.compare(Some(black_box(&before)), Some(black_box(&after)), true))
    });
}

/// Twenty players with half a year of daily snapshots
fn roster_histories() -> Vec<PlayerHistory> {
    let first_day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let observed = Utc.with_ymd_and_hms(2024, 6, 29, 12, 0, 0).unwrap();

    (0..20)
        .map(|player| {
            let entries = (0..180)
                .map(|day| {
                    let points = (player * 37 + day * 13) % 100;
                    let tier = Tier::ALL[(player as usize + day as usize / 40) % 7];
                    DatedSnapshot {
                        date: first_day + Duration::days(day),
                        snapshot: RankSnapshot::new(
                            tier,
                            Some(Division::ALL[(day as usize / 10) % 4]),
                            points,
                            day,
                            day / 2,
                            observed,
                        ),
                    }
                })
                .collect();
            PlayerHistory::new(RiotId::new(format!("player{}", player), "JP1"), entries)
        })
        .collect()
}

fn bench_reports(c: &mut Criterion) {
    let histories = roster_histories();
    let scale = RankScale::default();
    let delta = RankDelta::new(scale);
    let today = NaiveDate::from_ymd_opt(2024, 6, 29).unwrap();
    let offset = FixedOffset::east_opt(9 * 3600).unwrap();

    c.bench_function("roster_report_weekly_20_players", |b| {
        b.iter(|| {
            build_roster_report(black_box(&histories), today, Period::Weekly, offset, &delta)
                .map(|table| table.render())
        })
    });

    c.bench_function("chart_monthly_20_players", |b| {
        b.iter(|| build_chart(black_box(&histories), Period::Monthly, &scale, " (All)"))
    });
}

criterion_group!(benches, bench_encode_decode, bench_compare, bench_reports);
criterion_main!(benches);
