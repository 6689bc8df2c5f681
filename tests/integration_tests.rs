//! Integration tests for the rank tracker
//!
//! These run collection, storage, reporting, and scheduling together over
//! an in-memory SQLite database and the static provider.

mod fixtures;

use chrono::{NaiveTime, TimeZone};
use fixtures::{alice, bob, jst, may, may_jst, RecordingSink, TestSystem, SERVER};
use rank_tracker::collector::CollectionSummary;
use rank_tracker::provider::{HistoricalReading, RankReading, RawRank};
use rank_tracker::report::ReportRequest;
use rank_tracker::scheduler::{parse_schedule_input, Job, ScheduleTiming, Scheduler};
use rank_tracker::storage::{HistoryStore, ScheduleStore};
use rank_tracker::types::{Division, OutputFormat, Period, RiotId, Tier};
use std::sync::Arc;

/// Register alice and bob, then collect three days of climbing for alice
async fn three_days_of_history(system: &TestSystem) -> Vec<CollectionSummary> {
    system.store.register_player(SERVER, 1, &alice(), None).unwrap();
    system.store.register_player(SERVER, 2, &bob(), None).unwrap();
    system.set_rank(&bob(), "SILVER", "I", 80, 20, 20);

    let mut summaries = Vec::new();
    for (day, points, wins, losses) in [(8, 10, 10, 10), (9, 40, 12, 11), (10, 70, 14, 11)] {
        system.set_rank(&alice(), "GOLD", "II", points, wins, losses);
        summaries.push(
            system
                .collector
                .collect_all_at(Some(SERVER), false, "manual", may_jst(day, 23))
                .await
                .unwrap(),
        );
    }
    summaries
}

#[tokio::test]
async fn test_collection_builds_daily_history() {
    let system = TestSystem::new();
    let summaries = three_days_of_history(&system).await;

    for summary in &summaries {
        assert_eq!(summary.total, 2);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 0);
    }

    let player = system.store.find_player(SERVER, &alice()).unwrap().unwrap();
    let history = system.store.history(&player.key(), may(1), may(31)).unwrap();
    let dates: Vec<_> = history.iter().map(|entry| entry.date).collect();
    assert_eq!(dates, vec![may(8), may(9), may(10)]);
    assert_eq!(history[2].snapshot.tier, Tier::Gold);
    assert_eq!(history[2].snapshot.division, Some(Division::II));
    assert_eq!(history[2].snapshot.points, 70);
}

#[tokio::test]
async fn test_same_day_collection_replaces_snapshot() {
    let system = TestSystem::new();
    system.store.register_player(SERVER, 1, &alice(), None).unwrap();

    system.set_rank(&alice(), "GOLD", "II", 10, 1, 0);
    system
        .collector
        .collect_all_at(Some(SERVER), false, "manual", may_jst(10, 9))
        .await
        .unwrap();
    system.set_rank(&alice(), "GOLD", "I", 5, 3, 0);
    system
        .collector
        .collect_all_at(Some(SERVER), false, "manual", may_jst(10, 22))
        .await
        .unwrap();

    let player = system.store.find_player(SERVER, &alice()).unwrap().unwrap();
    let history = system.store.history(&player.key(), may(10), may(10)).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].snapshot.division, Some(Division::I));
}

#[tokio::test]
async fn test_failures_and_unranked_do_not_abort_run() {
    let system = TestSystem::new();
    let carol = RiotId::new("carol", "JP1");
    let ghost = RiotId::new("ghost", "JP1");

    for (user, riot_id) in [(1, alice()), (2, carol.clone()), (3, ghost.clone())] {
        system.store.register_player(SERVER, user, &riot_id, None).unwrap();
    }
    system.set_rank(&alice(), "PLATINUM", "IV", 0, 1, 1);
    system.provider.set_reading(&carol, RankReading::Unranked).unwrap();

    let summary = system
        .collector
        .collect_all_at(Some(SERVER), false, "manual", may_jst(10, 23))
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.unranked, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_players, vec![ghost.to_string()]);

    let carol_key = system.store.find_player(SERVER, &carol).unwrap().unwrap().key();
    assert!(system.store.history(&carol_key, may(1), may(31)).unwrap().is_empty());
}

#[tokio::test]
async fn test_backfill_fills_only_missing_past_dates() {
    let system = TestSystem::new();
    system.store.register_player(SERVER, 1, &alice(), None).unwrap();
    system.set_rank(&alice(), "GOLD", "I", 20, 30, 30);
    system
        .provider
        .set_history(
            &alice(),
            vec![
                HistoricalReading {
                    rank: RawRank::new("SILVER", "I", 60),
                    observed_at: may_jst(7, 12),
                },
                HistoricalReading {
                    rank: RawRank::new("GOLD", "IV", 5),
                    observed_at: may_jst(8, 12),
                },
                HistoricalReading {
                    rank: RawRank::new("GOLD", "II", 90),
                    observed_at: may_jst(10, 1),
                },
            ],
        )
        .unwrap();

    let summary = system
        .collector
        .collect_all_at(Some(SERVER), true, "manual", may_jst(10, 23))
        .await
        .unwrap();
    assert_eq!(summary.success, 1);
    assert_eq!(summary.backfilled, 2);

    let key = system.store.find_player(SERVER, &alice()).unwrap().unwrap().key();
    let history = system.store.history(&key, may(1), may(31)).unwrap();
    let dates: Vec<_> = history.iter().map(|entry| entry.date).collect();
    assert_eq!(dates, vec![may(7), may(8), may(10)]);
    assert_eq!(history[0].snapshot.tier, Tier::Silver);
    assert_eq!(history[0].snapshot.wins, 0);
    // today keeps the live snapshot, not the provider's history entry
    assert_eq!(history[2].snapshot.division, Some(Division::I));
}

#[tokio::test]
async fn test_roster_and_player_reports() {
    let system = TestSystem::new();
    three_days_of_history(&system).await;

    let roster = system
        .reports
        .generate_at(
            &ReportRequest::new(SERVER, Period::Daily, OutputFormat::Table),
            may_jst(10, 23),
        )
        .unwrap();
    assert_eq!(roster.title, "Rank Report (Daily)");
    assert!(roster.body.contains("alice"));
    assert!(roster.body.contains("bob"));
    assert!(roster.body.contains("GII 70LP"));
    assert!(roster.body.contains("SI 80LP"));
    assert!(roster.body.contains("+30LP"));
    assert!(roster.body.contains("+60LP"));

    let player = system
        .reports
        .generate_at(
            &ReportRequest::new(SERVER, Period::Daily, OutputFormat::Table).for_player(alice()),
            may_jst(10, 23),
        )
        .unwrap();
    assert_eq!(player.title, "alice#JP1 Report (Last 7 Days)");
    let rows: Vec<&str> = player.body.lines().collect();
    let newest = rows
        .iter()
        .position(|line| line.contains("05/10") || line.contains("2024-05-10"))
        .unwrap();
    let oldest = rows
        .iter()
        .position(|line| line.contains("05/08") || line.contains("2024-05-08"))
        .unwrap();
    assert!(newest < oldest);
    assert!(player.body.contains("2 games 2W (100%)"));
}

#[tokio::test]
async fn test_graph_report_serialises_chart() {
    let system = TestSystem::new();
    three_days_of_history(&system).await;

    let report = system
        .reports
        .generate_at(
            &ReportRequest::new(SERVER, Period::Daily, OutputFormat::Graph),
            may_jst(10, 23),
        )
        .unwrap();
    let attachment = report.attachment.unwrap();
    assert_eq!(attachment.filename, "rank_chart_daily.json");

    let chart: serde_json::Value = serde_json::from_str(&attachment.content).unwrap();
    let series = chart["series"].as_array().unwrap();
    assert_eq!(series.len(), 2);
    assert!(chart["y_ticks"].as_array().map_or(false, |ticks| !ticks.is_empty()));
    assert!(report.body.contains("alice"));
}

#[tokio::test]
async fn test_removed_player_drops_out_of_reports() {
    let system = TestSystem::new();
    three_days_of_history(&system).await;

    let bob_player = system.store.find_player(SERVER, &bob()).unwrap().unwrap();
    assert!(system.store.remove_player(SERVER, bob_player.local_id).unwrap());

    let roster = system
        .reports
        .generate_at(
            &ReportRequest::new(SERVER, Period::Daily, OutputFormat::Table),
            may_jst(10, 23),
        )
        .unwrap();
    assert!(!roster.body.contains("bob"));

    let players = system.store.players(Some(SERVER)).unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].local_id, 1);
}

#[tokio::test]
async fn test_schedule_definition_to_delivery() {
    let system = TestSystem::new();
    system.store.register_player(SERVER, 1, &alice(), None).unwrap();
    system.set_rank(&alice(), "DIAMOND", "II", 21, 40, 38);

    let spec = parse_schedule_input("21:00 here daily table", 555).unwrap();
    let schedule = system.store.add_schedule(SERVER, 1, &spec).unwrap();
    assert_eq!(schedule.local_id, 1);

    let sink = Arc::new(RecordingSink::new());
    let scheduler = Scheduler::new(
        system.collector.clone(),
        system.reports.clone(),
        system.store.clone(),
        sink.clone(),
        ScheduleTiming {
            collection_time: NaiveTime::from_hms_opt(23, 55, 0).unwrap(),
            utc_offset: jst(),
        },
    );

    let (at, jobs) = scheduler.next_jobs(may_jst(10, 10)).unwrap().unwrap();
    assert_eq!(at, may_jst(10, 21));
    assert_eq!(jobs, vec![Job::Report(schedule.clone())]);

    scheduler.run_job(&jobs[0]).await.unwrap();
    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, 555);
    assert_eq!(delivered[0].1.title, "Scheduled Report (daily)");
    assert!(delivered[0].1.body.contains("DII 21LP"));
    assert_eq!(scheduler.last_collection().unwrap().success, 1);
}

#[tokio::test]
async fn test_edited_schedule_moves_next_fire() {
    let system = TestSystem::new();
    let spec = parse_schedule_input("21:00 here daily table", 555).unwrap();
    let schedule = system.store.add_schedule(SERVER, 1, &spec).unwrap();

    let scheduler = Scheduler::new(
        system.collector.clone(),
        system.reports.clone(),
        system.store.clone(),
        Arc::new(RecordingSink::new()),
        ScheduleTiming {
            collection_time: NaiveTime::from_hms_opt(23, 55, 0).unwrap(),
            utc_offset: jst(),
        },
    );

    let edited = scheduler
        .edit_schedule(SERVER, schedule.local_id, "12:30 777 daily graph", 555)
        .unwrap();
    assert_eq!(edited.channel_id, 777);
    assert_eq!(edited.format, OutputFormat::Graph);

    let next = system
        .store
        .schedules(Some(SERVER))
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(next, edited);

    let (at, jobs) = scheduler.next_jobs(may_jst(10, 10)).unwrap().unwrap();
    assert_eq!(at, jst().with_ymd_and_hms(2024, 5, 10, 12, 30, 0).unwrap().with_timezone(&chrono::Utc));
    assert_eq!(jobs, vec![Job::Report(edited)]);

    assert!(scheduler
        .edit_schedule(SERVER, 99, "12:30 here daily graph", 555)
        .is_err());
}
