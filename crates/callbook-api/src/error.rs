use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use callbook_core::{BookingError, ErrorKind};
use callbook_types::IneligibilityReason;

/// Error body of every JSON route: `{"success":false,"error":"<code>"}`.
#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    NotEligible(Vec<IneligibilityReason>),
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        ApiError::Booking(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Booking(BookingError::Internal(e))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StateViolation => StatusCode::CONFLICT,
        ErrorKind::ExternalFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Expiry => StatusCode::GONE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log what the caller will not see. Internal detail never leaves the process.
pub fn log_booking_error(e: &BookingError) {
    match e {
        BookingError::Internal(inner) => error!("Internal error: {:#}", inner),
        BookingError::ExternalFailure { code, detail } => error!("{}: {}", code, detail),
        _ => {}
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Booking(e) => {
                log_booking_error(&e);
                let body = json!({ "success": false, "error": e.code() });
                (status_for(e.kind()), Json(body)).into_response()
            }
            ApiError::NotEligible(reasons) => {
                let body = json!({ "success": false, "error": "not_eligible", "reasons": reasons });
                (StatusCode::FORBIDDEN, Json(body)).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Expiry), StatusCode::GONE);
        assert_eq!(status_for(ErrorKind::ExternalFailure), StatusCode::BAD_GATEWAY);

        let resp = ApiError::from(BookingError::NotFound("booking_not_found")).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = ApiError::from(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
