use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use callbook_types::api::SlotQuery;

use crate::auth::AppState;
use crate::error::ApiResult;

pub async fn list_performers(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let performers = state.services.bookings.get_available_performers()?;
    Ok(Json(json!({ "success": true, "performers": performers })))
}

pub async fn get_performer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let performer = state.services.bookings.get_performer(id)?;
    Ok(Json(json!({ "success": true, "performer": performer })))
}

pub async fn get_slots(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<SlotQuery>,
) -> ApiResult<impl IntoResponse> {
    let slots = state
        .services
        .availability
        .get_available_slots(id, q.from, q.to, q.duration)?;
    Ok(Json(json!({ "success": true, "slots": slots })))
}
