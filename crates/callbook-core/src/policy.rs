use chrono::{Duration, NaiveTime};

/// Business knobs of the booking core.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// Spacing of candidate start times.
    pub slot_cadence: Duration,
    /// Working window used on days without explicit slots, performer-local.
    pub default_window_start: NaiveTime,
    pub default_window_end: NaiveTime,
    pub hold_minutes: u32,
    /// Drafts never held are swept after this long.
    pub draft_ttl: Duration,
    pub payment_link_minutes: u32,
    pub no_show_grace: Duration,
    /// Reminder offsets before start, in minutes.
    pub reminder_offsets: Vec<i64>,
    pub followup_after_end: Duration,
    pub feedback_after_end: Duration,
    pub early_join: Duration,
    /// How far in the past a start may be and still count as upcoming.
    pub upcoming_tolerance: Duration,
    pub external_timeout: std::time::Duration,
    pub max_participants: u32,
    /// Upper bound on notification rows delivered per tick.
    pub notification_batch: u32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            slot_cadence: Duration::minutes(30),
            default_window_start: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            default_window_end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            hold_minutes: 10,
            draft_ttl: Duration::minutes(15),
            payment_link_minutes: 10,
            no_show_grace: Duration::minutes(10),
            reminder_offsets: vec![60, 15, 5],
            followup_after_end: Duration::minutes(5),
            feedback_after_end: Duration::minutes(60),
            early_join: Duration::minutes(10),
            upcoming_tolerance: Duration::minutes(5),
            external_timeout: std::time::Duration::from_secs(10),
            max_participants: 2,
            notification_batch: 200,
        }
    }
}

/// Cadence of the background jobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub expire_holds_every: std::time::Duration,
    pub send_notifications_every: std::time::Duration,
    pub auto_end_every: std::time::Duration,
    pub no_shows_every: std::time::Duration,
    /// Upper bound on a single job tick.
    pub job_deadline: std::time::Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            expire_holds_every: std::time::Duration::from_secs(60),
            send_notifications_every: std::time::Duration::from_secs(60),
            auto_end_every: std::time::Duration::from_secs(60),
            no_shows_every: std::time::Duration::from_secs(300),
            job_deadline: std::time::Duration::from_secs(50),
        }
    }
}
