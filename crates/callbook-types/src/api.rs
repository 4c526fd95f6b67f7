use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Booking, Payment, SessionView};
use crate::status::{
    AvailabilityMode, BookingStatus, CallType, MembershipTier, PerformerStatus,
};

// -- JWT Claims --

/// Bearer token claims. `sub` is the calling user's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Availability --

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration: u32,
}

fn default_duration() -> u32 {
    30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewAvailability {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvailabilityPatch {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkAvailabilityRequest {
    pub slots: Vec<NewAvailability>,
}

fn default_true() -> bool {
    true
}

// -- Bookings --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBookingRequest {
    pub performer_id: Uuid,
    pub call_type: CallType,
    pub duration_minutes: u32,
    pub start_time_utc: DateTime<Utc>,
    pub slot_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HoldRequest {
    pub hold_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelBookingRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentLinkRequest {
    pub provider: String,
    pub expires_minutes: Option<u32>,
}

/// Read-only projection returned by `checkPaymentStatus`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub booking_id: Uuid,
    pub booking_status: BookingStatus,
    pub payment: Option<Payment>,
}

// -- Payment webhook --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookPaymentStatus {
    #[default]
    Paid,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhook {
    pub payment_id: Uuid,
    pub provider_payment_id: Option<String>,
    #[serde(default)]
    pub status: WebhookPaymentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// -- Admin tooling --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformerUpsert {
    pub user_id: Option<String>,
    pub display_name: String,
    pub base_price_cents: i64,
    pub currency: String,
    pub allowed_call_types: Vec<CallType>,
    pub max_call_duration: u32,
    #[serde(default)]
    pub buffer_time_before: u32,
    #[serde(default)]
    pub buffer_time_after: u32,
    pub timezone: String,
    pub status: PerformerStatus,
    pub is_available: bool,
    pub availability_mode: AvailabilityMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountUpsert {
    pub age_verified: bool,
    pub terms_accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_restricted: bool,
    pub private_calls_enabled: bool,
    pub membership_tier: MembershipTier,
    pub membership_expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}
