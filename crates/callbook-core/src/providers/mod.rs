//! External collaborators: payment checkout, meeting rooms, user messaging.
//!
//! Each is a dyn-compatible trait returning boxed futures so the core can hold
//! them as `Arc<dyn …>` and tests can swap in recording fakes.

mod channel;
mod payment;
mod room;

pub use channel::{LogChannel, NotificationChannel, TelegramChannel};
pub use payment::{CheckoutLink, CheckoutRequest, HostedCheckoutGateway, PaymentGateway, PaymentGateways};
pub use room::{JwtRoomProvider, RoomGrant, RoomProvider, RoomRequest};

use std::future::Future;
use std::time::Duration;

use crate::error::BookingError;

/// Run an external call under `limit`, folding both the timeout and the
/// call's own error into `ExternalFailure { code }`.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    code: &'static str,
    fut: F,
) -> Result<T, BookingError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(BookingError::external(code, format!("{:#}", e))),
        Err(_) => Err(BookingError::external(
            code,
            format!("timed out after {}s", limit.as_secs_f32()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let err = bounded(Duration::from_secs(1), "room_provider_failed", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), "room_provider_failed");
        assert!(err.to_string().contains("timed out"));
    }
}
