//! Scheduled collection and report delivery
//!
//! One background task sleeps until the earliest pending job: the daily
//! collection run or any enabled report schedule. Schedule changes call
//! [`Scheduler::reload`], which wakes the task so it recomputes fire
//! times from the store.

pub mod input;
pub mod sink;
pub mod timing;

pub use input::{edit_schedule, parse_schedule_input, SCHEDULE_USAGE};
pub use sink::{deliver_with_metrics, LogSink, ReportSink, SharedSink, WebhookSink};
pub use timing::{next_daily, next_fire, runs_on, WEEKLY_REPORT_DAY};

use crate::collector::{CollectionSummary, RankCollector};
use crate::config::AppConfig;
use crate::error::TrackerError;
use crate::metrics::MetricsCollector;
use crate::report::{RenderedReport, ReportRequest, ReportService};
use crate::storage::ScheduleStore;
use crate::types::Schedule;
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// When the daily collection runs and which offset schedule times use
#[derive(Debug, Clone, Copy)]
pub struct ScheduleTiming {
    pub collection_time: NaiveTime,
    pub utc_offset: FixedOffset,
}

impl ScheduleTiming {
    pub fn from_config(config: &AppConfig) -> crate::error::Result<Self> {
        Ok(Self {
            collection_time: config.collection_time()?,
            utc_offset: config.utc_offset()?,
        })
    }
}

/// A unit of scheduled work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Collect every registered player
    Collection,
    /// Collect one server, then generate and deliver its report
    Report(Schedule),
}

/// Background job runner
pub struct Scheduler {
    collector: Arc<RankCollector>,
    reports: Arc<ReportService>,
    schedules: Arc<dyn ScheduleStore>,
    sink: SharedSink,
    timing: ScheduleTiming,
    metrics: Option<Arc<MetricsCollector>>,
    reload: Notify,
    shutdown_tx: broadcast::Sender<()>,
    last_collection: RwLock<Option<CollectionSummary>>,
}

impl Scheduler {
    pub fn new(
        collector: Arc<RankCollector>,
        reports: Arc<ReportService>,
        schedules: Arc<dyn ScheduleStore>,
        sink: SharedSink,
        timing: ScheduleTiming,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            collector,
            reports,
            schedules,
            sink,
            timing,
            metrics: None,
            reload: Notify::new(),
            shutdown_tx,
            last_collection: RwLock::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Re-read schedules before the next wait
    pub fn reload(&self) {
        self.reload.notify_one();
    }

    /// Apply a schedule edit and wake the task to pick it up
    pub fn edit_schedule(
        &self,
        server_id: crate::types::ServerId,
        local_id: u32,
        text: &str,
        current_channel: crate::types::ChannelId,
    ) -> crate::error::Result<Schedule> {
        let schedule = edit_schedule(self.schedules.as_ref(), server_id, local_id, text, current_channel)?;
        info!("Schedule #{} on server {} edited", local_id, server_id);
        self.reload();
        Ok(schedule)
    }

    /// Stop the background task after any job in progress
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Scheduler shutdown requested with no running task");
        }
    }

    /// Summary of the most recent collection run made by this scheduler
    pub fn last_collection(&self) -> Option<CollectionSummary> {
        self.last_collection
            .read()
            .ok()
            .and_then(|summary| summary.clone())
    }

    /// Earliest fire time after `now` and every job due at that instant
    pub fn next_jobs(
        &self,
        now: DateTime<Utc>,
    ) -> crate::error::Result<Option<(DateTime<Utc>, Vec<Job>)>> {
        let offset = self.timing.utc_offset;
        let mut pending: Vec<(DateTime<Utc>, Job)> = Vec::new();

        if let Some(at) = next_daily(self.timing.collection_time, now, offset) {
            pending.push((at, Job::Collection));
        }
        for schedule in self.schedules.schedules(None)? {
            if !schedule.is_enabled() {
                continue;
            }
            if let Some(at) = next_fire(schedule.time, schedule.period, now, offset) {
                pending.push((at, Job::Report(schedule)));
            }
        }

        let Some(earliest) = pending.iter().map(|(at, _)| *at).min() else {
            return Ok(None);
        };
        let jobs = pending
            .into_iter()
            .filter(|(at, _)| *at == earliest)
            .map(|(_, job)| job)
            .collect();
        Ok(Some((earliest, jobs)))
    }

    pub async fn run_job(&self, job: &Job) -> crate::error::Result<()> {
        match job {
            Job::Collection => {
                info!("Running scheduled rank collection");
                let summary = self
                    .collector
                    .collect_all_at(None, false, "scheduled", Utc::now())
                    .await?;
                self.store_summary(summary);
                Ok(())
            }
            Job::Report(schedule) => self.run_report(schedule).await.map(|_| ()),
        }
    }

    /// Refresh the schedule's server, then build and deliver its report
    pub async fn run_report(&self, schedule: &Schedule) -> crate::error::Result<RenderedReport> {
        info!(
            "Running {} {} report for server {} (schedule {}, channel {})",
            schedule.period,
            schedule.format,
            schedule.server_id,
            schedule.local_id,
            schedule.channel_id
        );

        let summary = self
            .collector
            .collect_all_at(Some(schedule.server_id), false, "report", Utc::now())
            .await?;
        if summary.failed > 0 {
            warn!(
                "Report collection for server {} had {} failures: {}",
                schedule.server_id,
                summary.failed,
                summary.failed_players.join(", ")
            );
        }
        self.store_summary(summary);

        let request = ReportRequest::new(schedule.server_id, schedule.period, schedule.format);
        let mut report = self.reports.generate(&request)?;
        report.title = format!("Scheduled Report ({})", schedule.period);

        deliver_with_metrics(
            self.sink.as_ref(),
            self.metrics.as_deref(),
            schedule.channel_id,
            &report,
        )
        .await?;
        Ok(report)
    }

    /// Start the background loop
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    }

    async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Scheduler started (collection at {}, offset {})",
            self.timing.collection_time, self.timing.utc_offset
        );

        loop {
            let now = Utc::now();
            let next = match self.next_jobs(now) {
                Ok(next) => next,
                Err(e) => {
                    error!("Failed to load schedules: {}", e);
                    None
                }
            };

            match next {
                Some((at, jobs)) => {
                    let wait = (at - now).to_std().unwrap_or_default();
                    debug!("Next {} job(s) at {} (in {:?})", jobs.len(), at, wait);

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            for job in &jobs {
                                if let Err(e) = self.run_job(job).await {
                                    error!("Scheduled job {:?} failed: {}", job, e);
                                }
                            }
                        }
                        _ = self.reload.notified() => {
                            info!("Reloading schedules");
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.reload.notified() => {
                            info!("Reloading schedules");
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    fn store_summary(&self, summary: CollectionSummary) {
        match self.last_collection.write() {
            Ok(mut last) => *last = Some(summary),
            Err(_) => warn!(
                "{}",
                TrackerError::InternalError {
                    message: "Failed to acquire collection summary lock".to_string(),
                }
            ),
        }
    }
}
