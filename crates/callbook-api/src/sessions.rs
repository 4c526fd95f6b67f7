use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use callbook_types::api::Claims;

use crate::auth::AppState;
use crate::bookings::participant_booking;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    #[serde(default = "default_minutes")]
    pub minutes: u32,
}

fn default_minutes() -> u32 {
    60
}

/// Get-or-create the call room of a confirmed booking.
pub async fn create_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let (_, role) = participant_booking(&state, &claims, id)?;
    let session = state.services.sessions.create(id).await?;
    Ok(Json(json!({ "success": true, "session": session.view_for(role) })))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let (_, role) = participant_booking(&state, &claims, id)?;
    let session = state.services.sessions.get(id)?;
    Ok(Json(json!({ "success": true, "session": session.view_for(role) })))
}

pub async fn start_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let (_, role) = participant_booking(&state, &claims, id)?;
    let session = state.services.sessions.get(id)?;
    let session = state.services.sessions.start(session.id)?;
    Ok(Json(json!({ "success": true, "session": session.view_for(role) })))
}

/// Ends the call and completes the booking.
pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let (_, role) = participant_booking(&state, &claims, id)?;
    let (booking, session) = state.services.bookings.end_call(id)?;
    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "session": session.view_for(role),
    })))
}

/// Upcoming calls the caller takes part in.
pub async fn upcoming_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(q): Query<UpcomingQuery>,
) -> ApiResult<impl IntoResponse> {
    let sessions: Vec<_> = state
        .services
        .sessions
        .get_upcoming_sessions(q.minutes)?
        .into_iter()
        .filter_map(|s| {
            let (_, role) = participant_booking(&state, &claims, s.booking_id).ok()?;
            Some(s.view_for(role))
        })
        .collect();
    Ok(Json(json!({ "success": true, "sessions": sessions })))
}
