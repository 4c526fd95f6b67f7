use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use callbook_types::{
    Account, AvailabilityMode, Booking, BookingStatus, CallType, MembershipTier, Performer,
    PerformerStatus,
};

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn account(user_id: &str) -> Account {
    Account {
        user_id: user_id.to_string(),
        age_verified: true,
        terms_accepted_at: Some(at(2026, 1, 1, 0, 0)),
        is_restricted: false,
        private_calls_enabled: true,
        membership_tier: MembershipTier::Prime,
        membership_expires_at: None,
        language: "en".to_string(),
        updated_at: at(2026, 1, 1, 0, 0),
    }
}

pub fn performer() -> Performer {
    Performer {
        id: Uuid::new_v4(),
        user_id: Some("performer-user".to_string()),
        display_name: "Luna".to_string(),
        base_price_cents: 10_000,
        currency: "USD".to_string(),
        allowed_call_types: vec![CallType::Video, CallType::Audio],
        max_call_duration: 120,
        buffer_time_before: 10,
        buffer_time_after: 10,
        timezone: "UTC".to_string(),
        status: PerformerStatus::Active,
        is_available: true,
        availability_mode: AvailabilityMode::WorkingHours,
        created_at: at(2026, 1, 1, 0, 0),
        updated_at: at(2026, 1, 1, 0, 0),
    }
}

pub fn booking(performer_id: Uuid, start: DateTime<Utc>, minutes: u32) -> Booking {
    Booking {
        id: Uuid::new_v4(),
        user_id: "u1".to_string(),
        performer_id,
        slot_id: None,
        call_type: CallType::Video,
        duration_minutes: minutes,
        start_time_utc: start,
        end_time_utc: start + chrono::Duration::minutes(i64::from(minutes)),
        price_cents: 10_000,
        currency: "USD".to_string(),
        status: BookingStatus::Draft,
        hold_expires_at: None,
        rules_confirmed_at: None,
        cancel_reason: None,
        cancelled_by: None,
        version: 1,
        created_at: at(2026, 10, 1, 9, 0),
        updated_at: at(2026, 10, 1, 9, 0),
    }
}
