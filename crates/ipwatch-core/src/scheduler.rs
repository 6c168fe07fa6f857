//! Scheduler for the two periodic jobs
//!
//! Drives the check pipeline on a fixed interval and the digest pipeline on
//! a cron cadence, on one task — the two jobs therefore never overlap
//! within an instance, and a digest query never races an append from the
//! same process. A manual run-now trigger moves the check job straight into
//! `Running` without waiting for the interval.
//!
//! Each job follows `Idle -> Running -> (Succeeded | Failed) -> Idle`;
//! transitions are logged and observable through [`JobTracker`] snapshots.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::ScheduleConfig;
use crate::engine::{DigestOutcome, MonitorEngine, TickOutcome};
use crate::error::{Error, Result};

/// Per-job state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for the next tick
    Idle,
    /// A run is in progress
    Running,
}

/// Terminal result of the most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The run completed
    Succeeded,
    /// The run surfaced an error
    Failed,
}

/// Observable snapshot of one job's state machine
#[derive(Debug, Clone, Copy)]
pub struct JobStatus {
    /// Current state
    pub state: JobState,
    /// Outcome of the most recent completed run, if any
    pub last_outcome: Option<JobOutcome>,
    /// Completed runs
    pub runs: u64,
    /// Completed runs that failed
    pub failures: u64,
}

/// Tracks one job's transitions; shared with the [`SchedulerHandle`]
#[derive(Debug)]
pub struct JobTracker {
    name: &'static str,
    status: Mutex<JobStatus>,
}

impl JobTracker {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            status: Mutex::new(JobStatus {
                state: JobState::Idle,
                last_outcome: None,
                runs: 0,
                failures: 0,
            }),
        })
    }

    fn begin(&self) {
        let mut status = self.status.lock().expect("job status lock");
        status.state = JobState::Running;
        debug!(job = self.name, "job running");
    }

    fn finish(&self, ok: bool) {
        let mut status = self.status.lock().expect("job status lock");
        status.state = JobState::Idle;
        status.runs += 1;
        if ok {
            status.last_outcome = Some(JobOutcome::Succeeded);
        } else {
            status.last_outcome = Some(JobOutcome::Failed);
            status.failures += 1;
        }
        debug!(job = self.name, ok, "job idle");
    }

    /// Current snapshot of the job's status
    pub fn snapshot(&self) -> JobStatus {
        *self.status.lock().expect("job status lock")
    }
}

/// Handle for interacting with a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    run_now_tx: mpsc::Sender<()>,
    check_job: Arc<JobTracker>,
    digest_job: Arc<JobTracker>,
}

impl SchedulerHandle {
    /// Trigger an immediate check, bypassing the interval.
    ///
    /// The run executes to completion or failure; it is not preemptible
    /// mid-retry. Returns an error if the scheduler has stopped.
    pub async fn run_now(&self) -> Result<()> {
        self.run_now_tx
            .send(())
            .await
            .map_err(|_| Error::Other("scheduler is not running".to_string()))
    }

    /// Status of the check job
    pub fn check_status(&self) -> JobStatus {
        self.check_job.snapshot()
    }

    /// Status of the digest job
    pub fn digest_status(&self) -> JobStatus {
        self.digest_job.snapshot()
    }
}

/// Drives the check and digest jobs against one engine.
pub struct Scheduler {
    engine: MonitorEngine,
    check_interval: Duration,
    digest_schedule: Schedule,
    digest_window: chrono::Duration,
    run_now_rx: mpsc::Receiver<()>,
    check_job: Arc<JobTracker>,
    digest_job: Arc<JobTracker>,
}

impl Scheduler {
    /// Create a scheduler and its handle
    pub fn new(engine: MonitorEngine, config: &ScheduleConfig) -> Result<(Self, SchedulerHandle)> {
        let digest_schedule = parse_cron(&config.digest_cron)?;
        let (run_now_tx, run_now_rx) = mpsc::channel(1);
        let check_job = JobTracker::new("check");
        let digest_job = JobTracker::new("digest");

        let handle = SchedulerHandle {
            run_now_tx,
            check_job: Arc::clone(&check_job),
            digest_job: Arc::clone(&digest_job),
        };

        let scheduler = Self {
            engine,
            check_interval: Duration::from_secs(config.check_interval_secs),
            digest_schedule,
            digest_window: chrono::Duration::days(i64::from(config.digest_window_days)),
            run_now_rx,
            check_job,
            digest_job,
        };

        Ok((scheduler, handle))
    }

    /// Run until SIGINT. The first check fires immediately.
    pub async fn run(self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run with an injected shutdown signal (for tests and embedders).
    pub async fn run_with_shutdown(
        self,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            "scheduler started"
        );

        let mut check_timer = tokio::time::interval(self.check_interval);
        // A slow run delays subsequent ticks instead of bursting to catch up.
        check_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let digest_timer = tokio::time::sleep(self.next_digest_delay());
        tokio::pin!(digest_timer);

        if let Some(mut shutdown_rx) = shutdown_rx {
            loop {
                tokio::select! {
                    _ = check_timer.tick() => {
                        self.run_check_job().await;
                    }
                    () = &mut digest_timer => {
                        self.run_digest_job().await;
                        let delay = self.next_digest_delay();
                        digest_timer.as_mut().reset(tokio::time::Instant::now() + delay);
                    }
                    Some(()) = self.run_now_rx.recv() => {
                        info!("manual check triggered");
                        self.run_check_job().await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("shutdown signal received");
                        break;
                    }
                }
            }
        } else {
            loop {
                tokio::select! {
                    _ = check_timer.tick() => {
                        self.run_check_job().await;
                    }
                    () = &mut digest_timer => {
                        self.run_digest_job().await;
                        let delay = self.next_digest_delay();
                        digest_timer.as_mut().reset(tokio::time::Instant::now() + delay);
                    }
                    Some(()) = self.run_now_rx.recv() => {
                        info!("manual check triggered");
                        self.run_check_job().await;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown signal received");
                        break;
                    }
                }
            }
        }

        // Flush state before exiting
        self.engine.flush().await?;
        info!("state flushed, scheduler stopped");

        Ok(())
    }

    /// Wall-clock wait until the next cron occurrence
    fn next_digest_delay(&self) -> Duration {
        match self.digest_schedule.upcoming(Utc).next() {
            Some(next) => (next - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            // A cron expression with no future occurrence; park the job.
            None => Duration::from_secs(u64::from(u32::MAX)),
        }
    }

    /// Run one check tick, logging every distinguishable outcome.
    async fn run_check_job(&self) {
        self.check_job.begin();

        let result = self.engine.run_check().await;
        match &result {
            Ok(TickOutcome::NoChange { address }) => {
                info!(%address, "check complete: no change");
            }
            Ok(TickOutcome::ChangedAndNotified { event, report }) => {
                info!(
                    event_id = event.id,
                    address = %event.address,
                    delivered = report.delivered.len(),
                    failed = report.failed.len(),
                    "check complete: change notified"
                );
            }
            Ok(TickOutcome::ChangedNotifyFailed { event, error }) => {
                warn!(
                    event_id = event.id,
                    address = %event.address,
                    error,
                    "check complete: change committed but notification failed"
                );
            }
            Err(Error::Upstream(err)) => {
                error!(error = %err, "check failed: could not resolve current address");
            }
            Err(err) => {
                error!(error = %err, "check failed: storage error, change not committed");
            }
        }

        self.check_job.finish(result.is_ok());
    }

    /// Run one digest over the trailing window.
    async fn run_digest_job(&self) {
        self.digest_job.begin();

        let to = Utc::now();
        let from = to - self.digest_window;

        let result = self.engine.run_digest(from, to).await;
        match &result {
            Ok(DigestOutcome::Empty) => {
                info!(%from, %to, "digest window empty, no summary sent");
            }
            Ok(DigestOutcome::Sent { events, report }) => {
                info!(
                    events,
                    delivered = report.delivered.len(),
                    "digest sent"
                );
            }
            Err(err) => {
                error!(error = %err, "digest failed");
            }
        }

        self.digest_job.finish(result.is_ok());
    }
}

/// Parse a 5-field cron expression.
///
/// The cron crate expects 6 fields (with seconds); a "0" seconds field is
/// prepended so configuration stays in the familiar 5-field form.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let full_expr = format!("0 {}", expr);
    full_expr
        .parse::<Schedule>()
        .map_err(|e| Error::config(format!("invalid cron expression '{}': {}", expr, e)))
}
