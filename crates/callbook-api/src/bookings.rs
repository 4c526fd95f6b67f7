use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use callbook_types::api::{
    CancelBookingRequest, Claims, CreateBookingRequest, HoldRequest, PaymentLinkRequest,
};
use callbook_types::{Booking, CancelledBy};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

pub async fn get_eligibility(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let report = state.services.eligibility.check_eligibility(&claims.sub);
    Json(json!({ "success": true, "eligibility": report }))
}

/// Gated by the eligibility check; a refusal lists every failed condition.
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let report = state.services.eligibility.check_eligibility(&claims.sub);
    if !report.eligible {
        info!("User {} refused a booking: {:?}", claims.sub, report.reasons);
        return Err(ApiError::NotEligible(report.reasons));
    }

    let booking = state.services.bookings.create_booking(&claims.sub, req)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "booking": booking })),
    ))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let bookings = state.services.bookings.get_user_bookings(&claims.sub)?;
    Ok(Json(json!({ "success": true, "bookings": bookings })))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let (booking, _) = participant_booking(&state, &claims, id)?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

pub async fn hold_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<HoldRequest>>,
) -> ApiResult<impl IntoResponse> {
    state.services.bookings.get_booking_for(&claims.sub, id)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let booking = state.services.bookings.hold_booking(id, req.hold_minutes)?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

pub async fn confirm_rules(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    state.services.bookings.get_booking_for(&claims.sub, id)?;
    let booking = state.services.bookings.confirm_rules(id)?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

/// Either side of the call may cancel; the role is taken from the caller.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CancelBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let (_, role) = participant_booking(&state, &claims, id)?;
    let booking = state
        .services
        .bookings
        .cancel_booking(id, &req.reason, role)
        .await?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

pub async fn create_payment_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PaymentLinkRequest>,
) -> ApiResult<impl IntoResponse> {
    state.services.bookings.get_booking_for(&claims.sub, id)?;
    let payment = state
        .services
        .bookings
        .create_payment_link(id, &req.provider, req.expires_minutes)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "payment": payment })),
    ))
}

pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    state.services.bookings.get_booking_for(&claims.sub, id)?;
    let view = state.services.bookings.check_payment_status(id)?;
    Ok(Json(json!({ "success": true, "status": view })))
}

/// The booking if the caller is its user or its performer, with the role
/// the caller acts in. Anyone else sees a missing booking.
pub(crate) fn participant_booking(
    state: &AppState,
    claims: &Claims,
    id: Uuid,
) -> ApiResult<(Booking, CancelledBy)> {
    let bookings = &state.services.bookings;
    let booking = bookings.get_booking(id)?;
    if booking.user_id == claims.sub {
        return Ok((booking, CancelledBy::User));
    }
    let performer = bookings.get_performer(booking.performer_id)?;
    if performer.user_id.as_deref() == Some(claims.sub.as_str()) {
        return Ok((booking, CancelledBy::Performer));
    }
    Err(callbook_core::BookingError::NotFound("booking_not_found").into())
}
