/// Write-side parameter types. Reads return the `callbook-types` models
/// directly; these describe guarded mutations.
use chrono::{DateTime, NaiveTime, Utc};
use uuid::Uuid;

use callbook_types::{BookingStatus, CancelledBy};

/// Guard for a conditional booking update: the row must currently be in one
/// of `from`, and at `version` when one is given. With `no_started_session`
/// the write is also refused once the booking's call has gone live.
#[derive(Debug, Clone)]
pub struct BookingGuard {
    pub id: Uuid,
    pub from: Vec<BookingStatus>,
    pub version: Option<i64>,
    pub no_started_session: bool,
}

impl BookingGuard {
    pub fn status(id: Uuid, from: Vec<BookingStatus>) -> Self {
        Self {
            id,
            from,
            version: None,
            no_started_session: false,
        }
    }

    pub fn versioned(id: Uuid, from: BookingStatus, version: i64) -> Self {
        Self {
            id,
            from: vec![from],
            version: Some(version),
            no_started_session: false,
        }
    }

    pub fn without_started_session(mut self) -> Self {
        self.no_started_session = true;
        self
    }
}

/// Fields written alongside a booking status change. `None` keeps the
/// stored value.
#[derive(Debug, Clone)]
pub struct BookingUpdate {
    pub to: BookingStatus,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub rules_confirmed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
}

impl BookingUpdate {
    pub fn to(status: BookingStatus) -> Self {
        Self {
            to: status,
            hold_expires_at: None,
            rules_confirmed_at: None,
            cancel_reason: None,
            cancelled_by: None,
        }
    }
}

/// Outcome of a guarded booking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied { version: i64 },
    /// Row exists but is in a status outside the guard.
    WrongStatus(BookingStatus),
    /// Status matched but another writer bumped the version first.
    VersionMismatch { current: i64 },
    /// The booking's session already went live.
    SessionStarted,
    NotFound,
}

impl TransitionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// One row of the booking audit trail.
#[derive(Debug, Clone)]
pub struct BookingTransition {
    pub booking_id: Uuid,
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub version: i64,
    pub actor: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SlotPatch {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_available: Option<bool>,
}

/// Outcome of an explicit availability write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotWrite {
    Applied,
    /// Overlaps an existing slot of the same performer on the same date.
    Overlaps { slot_id: Uuid },
    /// Booked slots cannot be moved or removed.
    Booked,
    /// `end_time` not after `start_time`.
    InvalidRange,
    NotFound,
}
