use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{info, warn};

use callbook_core::signing::verify_hex;
use callbook_types::CallSession;
use callbook_types::api::{PaymentWebhook, WebhookPaymentStatus, WebhookResponse};

use crate::auth::AppState;
use crate::error::{log_booking_error, status_for};

pub const SIGNATURE_HEADER: &str = "x-callbook-signature";

fn reply(status: StatusCode, body: WebhookResponse) -> (StatusCode, Json<WebhookResponse>) {
    (status, Json(body))
}

fn failure(status: StatusCode, code: &str) -> (StatusCode, Json<WebhookResponse>) {
    reply(
        status,
        WebhookResponse {
            success: false,
            booking: None,
            session: None,
            error: Some(code.to_string()),
        },
    )
}

/// Payment provider callback. Redeliveries converge on the same state.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_hex(secret.as_bytes(), &body, signature) {
            warn!("Rejected payment webhook with a bad signature");
            return failure(StatusCode::UNAUTHORIZED, "invalid_signature");
        }
    }

    let event: PaymentWebhook = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Malformed payment webhook: {}", e);
            return failure(StatusCode::BAD_REQUEST, "invalid_payload");
        }
    };
    info!("Payment webhook for {}: {:?}", event.payment_id, event.status);

    let bookings = &state.services.bookings;
    let ppid = event.provider_payment_id.as_deref();
    let result = match event.status {
        WebhookPaymentStatus::Paid => bookings
            .handle_payment_complete(event.payment_id, ppid)
            .await
            .map(|outcome| WebhookResponse {
                success: true,
                booking: Some(outcome.booking),
                session: outcome.session.as_ref().map(CallSession::redacted),
                error: None,
            }),
        WebhookPaymentStatus::Failed => {
            bookings
                .handle_payment_failed(event.payment_id, ppid)
                .and_then(|payment| {
                    Ok(WebhookResponse {
                        success: true,
                        booking: Some(bookings.get_booking(payment.booking_id)?),
                        session: None,
                        error: None,
                    })
                })
        }
    };

    match result {
        Ok(body) => reply(StatusCode::OK, body),
        Err(e) => {
            log_booking_error(&e);
            warn!("Payment webhook for {} not applied: {}", event.payment_id, e.code());
            failure(status_for(e.kind()), e.code())
        }
    }
}
