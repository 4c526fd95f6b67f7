//! Periodic background jobs: hold expiry, notification delivery, auto-end of
//! overdue calls, no-show detection.
//!
//! Only one worker may run against a database; nothing here coordinates
//! between processes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lifecycle::{BookingLifecycle, ExpirySweep};
use crate::notifications::{DeliveryReport, NotificationScheduler};
use crate::policy::WorkerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    ExpireHolds,
    SendNotifications,
    AutoEndOverdue,
    CheckNoShows,
}

impl Job {
    pub const ALL: [Job; 4] = [
        Job::ExpireHolds,
        Job::SendNotifications,
        Job::AutoEndOverdue,
        Job::CheckNoShows,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Job::ExpireHolds => "expire_holds",
            Job::SendNotifications => "send_notifications",
            Job::AutoEndOverdue => "auto_end_overdue",
            Job::CheckNoShows => "check_no_shows",
        }
    }

    fn every(&self, config: &WorkerConfig) -> Duration {
        match self {
            Job::ExpireHolds => config.expire_holds_every,
            Job::SendNotifications => config.send_notifications_every,
            Job::AutoEndOverdue => config.auto_end_every,
            Job::CheckNoShows => config.no_shows_every,
        }
    }
}

/// What one `run_once` pass did. A job that failed leaves its field at the
/// default and is named in `errors`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub expired: ExpirySweep,
    pub notifications: DeliveryReport,
    pub auto_ended: usize,
    pub no_shows: usize,
    pub errors: Vec<String>,
}

struct Jobs {
    bookings: Arc<BookingLifecycle>,
    notifications: Arc<NotificationScheduler>,
    config: WorkerConfig,
}

impl Jobs {
    async fn tick(&self, job: Job, report: &mut SweepReport) -> anyhow::Result<()> {
        let work = async {
            match job {
                Job::ExpireHolds => report.expired = self.bookings.expire_held_bookings()?,
                Job::SendNotifications => {
                    report.notifications = self.notifications.deliver_due().await?
                }
                Job::AutoEndOverdue => report.auto_ended = self.bookings.auto_end_overdue_calls()?,
                Job::CheckNoShows => report.no_shows = self.bookings.check_no_shows(None).await?,
            }
            Ok::<_, crate::error::BookingError>(())
        };

        match tokio::time::timeout(self.config.job_deadline, work).await {
            Ok(result) => result.map_err(|e| anyhow::anyhow!("{} failed: {}", job.name(), e)),
            Err(_) => anyhow::bail!(
                "{} exceeded its {}s deadline",
                job.name(),
                self.config.job_deadline.as_secs()
            ),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub struct Worker {
    jobs: Arc<Jobs>,
    running: Mutex<Option<Running>>,
}

impl Worker {
    pub fn new(
        bookings: Arc<BookingLifecycle>,
        notifications: Arc<NotificationScheduler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs: Arc::new(Jobs {
                bookings,
                notifications,
                config,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    /// Spawn one timer task per job. Calling it again while running does
    /// nothing.
    pub fn start(&self) {
        let Ok(mut running) = self.running.lock() else {
            warn!("Worker state lock poisoned, not starting");
            return;
        };
        if running.is_some() {
            debug!("Worker already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handles = Job::ALL
            .iter()
            .map(|job| {
                let job = *job;
                let jobs = self.jobs.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { run_job_loop(jobs, job, cancel).await })
            })
            .collect();

        *running = Some(Running { cancel, handles });
        info!("Worker started with {} jobs", Job::ALL.len());
    }

    /// Cancel every job and wait for the in-flight ticks to finish.
    pub async fn stop(&self) {
        let taken = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => None,
        };
        let Some(Running { cancel, handles }) = taken else {
            return;
        };

        cancel.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Worker job ended abnormally: {}", e);
            }
        }
        info!("Worker stopped");
    }

    /// Run all four jobs once, in order. A failing job is recorded in the
    /// report and does not stop the others.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for job in Job::ALL {
            if let Err(e) = self.jobs.tick(job, &mut report).await {
                warn!("{:#}", e);
                report.errors.push(e.to_string());
            }
        }
        report
    }
}

async fn run_job_loop(jobs: Arc<Jobs>, job: Job, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(job.every(&jobs.config));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let mut report = SweepReport::default();
                if let Err(e) = jobs.tick(job, &mut report).await {
                    warn!("Worker tick error: {:#}", e);
                }
            }
        }
    }
    debug!("Job {} stopped", job.name());
}
