use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{
    AvailabilityMode, BookingStatus, CallType, CancelledBy, IneligibilityReason, MembershipTier,
    NotificationKind, NotificationStatus, PaymentStatus, PerformerStatus, SessionStatus,
};

/// Performer profile. Maintained by admin tooling, read-only to the booking core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performer {
    pub id: Uuid,
    /// Messaging account linked to the performer, used for reminders.
    pub user_id: Option<String>,
    pub display_name: String,
    pub base_price_cents: i64,
    pub currency: String,
    pub allowed_call_types: Vec<CallType>,
    /// Minutes.
    pub max_call_duration: u32,
    /// Minutes.
    pub buffer_time_before: u32,
    /// Minutes.
    pub buffer_time_after: u32,
    /// IANA zone name, e.g. `America/Bogota`.
    pub timezone: String,
    pub status: PerformerStatus,
    pub is_available: bool,
    pub availability_mode: AvailabilityMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Performer {
    pub fn is_bookable(&self) -> bool {
        self.status == PerformerStatus::Active && self.is_available
    }

    pub fn buffer_before(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.buffer_time_before))
    }

    pub fn buffer_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.buffer_time_after))
    }
}

/// Explicit availability window in the performer's local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub performer_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: String,
    pub is_available: bool,
    pub is_booked: bool,
    pub booking_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub performer_id: Uuid,
    pub slot_id: Option<Uuid>,
    pub call_type: CallType,
    pub duration_minutes: u32,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
    pub price_cents: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub rules_confirmed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub provider: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_link: String,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub provider_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.expires_at > now
    }
}

/// Meeting room bound 1:1 to a confirmed booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub room_provider: String,
    pub room_id: String,
    pub room_name: String,
    pub join_url_user: String,
    pub join_url_performer: String,
    pub token_user: String,
    pub token_performer: String,
    pub max_participants: u32,
    pub recording_disabled: bool,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub actual_duration_seconds: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What one participant sees of a session: their own join link and token,
/// never the other side's.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub room_provider: String,
    pub room_id: String,
    pub room_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub max_participants: u32,
    pub recording_disabled: bool,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub actual_duration_seconds: Option<i64>,
}

impl CallSession {
    /// The session as `role` sees it. Roles other than the two participants
    /// get no credentials.
    pub fn view_for(&self, role: CancelledBy) -> SessionView {
        let (join_url, token) = match role {
            CancelledBy::User => (Some(&self.join_url_user), Some(&self.token_user)),
            CancelledBy::Performer => (Some(&self.join_url_performer), Some(&self.token_performer)),
            CancelledBy::Admin | CancelledBy::System => (None, None),
        };
        SessionView {
            id: self.id,
            booking_id: self.booking_id,
            room_provider: self.room_provider.clone(),
            room_id: self.room_id.clone(),
            room_name: self.room_name.clone(),
            join_url: join_url.cloned(),
            token: token.cloned(),
            max_participants: self.max_participants,
            recording_disabled: self.recording_disabled,
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            actual_duration_seconds: self.actual_duration_seconds,
        }
    }

    /// Without any credentials.
    pub fn redacted(&self) -> SessionView {
        self.view_for(CancelledBy::System)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingNotification {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub scheduled_for: DateTime<Utc>,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Local mirror of the identity fields the eligibility gate needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub age_verified: bool,
    pub terms_accepted_at: Option<DateTime<Utc>>,
    pub is_restricted: bool,
    pub private_calls_enabled: bool,
    pub membership_tier: MembershipTier,
    /// `None` on a prime account means a lifetime membership.
    pub membership_expires_at: Option<DateTime<Utc>>,
    pub language: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MembershipInfo {
    pub tier: Option<MembershipTier>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub reasons: Vec<IneligibilityReason>,
    pub membership: MembershipInfo,
    pub is_restricted: bool,
}

impl EligibilityReport {
    /// Fail-closed report used when the account cannot be evaluated.
    pub fn refused(reason: IneligibilityReason) -> Self {
        Self {
            eligible: false,
            reasons: vec![reason],
            membership: MembershipInfo {
                tier: None,
                expires_at: None,
            },
            is_restricted: false,
        }
    }
}

/// A bookable start time offered to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub local_start_time: NaiveTime,
    pub duration_minutes: u32,
    pub price_cents: i64,
    pub currency: String,
    /// Set when the candidate comes from an explicit slot row.
    pub slot_id: Option<Uuid>,
}
