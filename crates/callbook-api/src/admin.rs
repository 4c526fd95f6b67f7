use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono_tz::Tz;
use serde_json::json;
use uuid::Uuid;

use callbook_core::BookingError;
use callbook_types::api::{
    AccountUpsert, AvailabilityPatch, BulkAvailabilityRequest, CancelBookingRequest,
    NewAvailability, PerformerUpsert,
};
use callbook_types::{Account, CancelledBy, Performer};

use crate::auth::AppState;
use crate::error::ApiResult;

// -- Directory --

pub async fn upsert_performer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PerformerUpsert>,
) -> ApiResult<impl IntoResponse> {
    if req.timezone.parse::<Tz>().is_err() {
        return Err(BookingError::Validation("invalid_timezone").into());
    }
    if req.base_price_cents < 0 || req.max_call_duration == 0 {
        return Err(BookingError::Validation("invalid_performer").into());
    }

    let services = &state.services;
    let now = services.clock.now();
    let created_at = services
        .db
        .get_performer(id)?
        .map_or(now, |existing| existing.created_at);

    let performer = Performer {
        id,
        user_id: req.user_id,
        display_name: req.display_name,
        base_price_cents: req.base_price_cents,
        currency: req.currency,
        allowed_call_types: req.allowed_call_types,
        max_call_duration: req.max_call_duration,
        buffer_time_before: req.buffer_time_before,
        buffer_time_after: req.buffer_time_after,
        timezone: req.timezone,
        status: req.status,
        is_available: req.is_available,
        availability_mode: req.availability_mode,
        created_at,
        updated_at: now,
    };
    services.db.upsert_performer(&performer)?;
    Ok(Json(json!({ "success": true, "performer": performer })))
}

pub async fn upsert_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<AccountUpsert>,
) -> ApiResult<impl IntoResponse> {
    let services = &state.services;
    let account = Account {
        user_id,
        age_verified: req.age_verified,
        terms_accepted_at: req.terms_accepted_at,
        is_restricted: req.is_restricted,
        private_calls_enabled: req.private_calls_enabled,
        membership_tier: req.membership_tier,
        membership_expires_at: req.membership_expires_at,
        language: req.language,
        updated_at: services.clock.now(),
    };
    services.db.upsert_account(&account)?;
    Ok(Json(json!({ "success": true, "account": account })))
}

// -- Availability --

pub async fn add_availability(
    State(state): State<AppState>,
    Path(performer_id): Path<Uuid>,
    Json(req): Json<NewAvailability>,
) -> ApiResult<impl IntoResponse> {
    let slot = state
        .services
        .availability
        .add_availability(performer_id, req)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "slot": slot })),
    ))
}

pub async fn bulk_add_availability(
    State(state): State<AppState>,
    Path(performer_id): Path<Uuid>,
    Json(req): Json<BulkAvailabilityRequest>,
) -> ApiResult<impl IntoResponse> {
    let slots = state
        .services
        .availability
        .bulk_add_availability(performer_id, req.slots)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "slots": slots })),
    ))
}

pub async fn update_availability(
    State(state): State<AppState>,
    Path(slot_id): Path<Uuid>,
    Json(req): Json<AvailabilityPatch>,
) -> ApiResult<impl IntoResponse> {
    let slot = state
        .services
        .availability
        .update_availability(slot_id, req)?;
    Ok(Json(json!({ "success": true, "slot": slot })))
}

pub async fn delete_availability(
    State(state): State<AppState>,
    Path(slot_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.services.availability.delete_availability(slot_id)?;
    Ok(Json(json!({ "success": true })))
}

// -- Operations --

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = state
        .services
        .bookings
        .cancel_booking(id, &req.reason, CancelledBy::Admin)
        .await?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

pub async fn run_worker_once(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.worker.run_once().await;
    Json(json!({ "success": report.errors.is_empty(), "report": report }))
}
