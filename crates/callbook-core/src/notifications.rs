use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use callbook_db::Database;
use callbook_types::{
    Booking, BookingNotification, BookingStatus, NotificationKind, NotificationStatus, Performer,
};

use crate::clock::Clock;
use crate::error::BookingResult;
use crate::policy::BookingPolicy;
use crate::providers::{NotificationChannel, bounded};

/// Outcome counts of one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    /// Rows dropped because their booking moved on.
    pub cancelled: usize,
}

pub struct NotificationScheduler {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    channel: Arc<dyn NotificationChannel>,
}

impl NotificationScheduler {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            db,
            clock,
            policy,
            channel,
        }
    }

    /// Persist the reminder set of a confirmed booking. Safe to repeat: rows
    /// that already exist are left alone. Returns how many rows were new.
    pub fn schedule_booking_reminders(
        &self,
        booking: &Booking,
        performer: &Performer,
    ) -> BookingResult<usize> {
        let now = self.clock.now();
        let mut rows = Vec::new();

        let mut push = |user_id: &str, role: &str, kind: NotificationKind, at: DateTime<Utc>| {
            rows.push(BookingNotification {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                user_id: user_id.to_string(),
                kind,
                scheduled_for: at,
                status: NotificationStatus::Pending,
                sent_at: None,
                failed_at: None,
                error: None,
                payload: json!({
                    "role": role,
                    "performer_name": performer.display_name,
                    "start_time_utc": booking.start_time_utc,
                    "duration_minutes": booking.duration_minutes,
                    "call_type": booking.call_type,
                }),
                created_at: now,
            });
        };

        for offset in &self.policy.reminder_offsets {
            let Some(kind) = NotificationKind::reminder_for(*offset) else {
                warn!("No reminder kind for a {} minute offset, skipping", offset);
                continue;
            };
            let at = booking.start_time_utc - Duration::minutes(*offset);
            if at < now {
                continue;
            }
            push(&booking.user_id, "user", kind, at);
            if let Some(performer_user) = &performer.user_id {
                push(performer_user, "performer", kind, at);
            }
        }

        push(
            &booking.user_id,
            "user",
            NotificationKind::Followup,
            booking.end_time_utc + self.policy.followup_after_end,
        );
        push(
            &booking.user_id,
            "user",
            NotificationKind::FeedbackRequest,
            booking.end_time_utc + self.policy.feedback_after_end,
        );

        let inserted = self.db.insert_notifications(&rows)?;
        if inserted > 0 {
            info!("Scheduled {} notification(s) for booking {}", inserted, booking.id);
        }
        Ok(inserted)
    }

    pub fn get_due_pending(&self) -> BookingResult<Vec<BookingNotification>> {
        Ok(self
            .db
            .due_pending_notifications(self.clock.now(), self.policy.notification_batch)?)
    }

    pub fn mark_sent(&self, id: Uuid) -> BookingResult<bool> {
        Ok(self.db.mark_notification_sent(id, self.clock.now())?)
    }

    pub fn mark_failed(&self, id: Uuid, reason: &str) -> BookingResult<bool> {
        Ok(self.db.mark_notification_failed(id, self.clock.now(), reason)?)
    }

    /// Cancel the still-pending rows of a booking. Sent rows stay sent.
    pub fn cancel_by_booking(&self, booking_id: Uuid) -> BookingResult<usize> {
        let cancelled = self.db.cancel_pending_notifications(booking_id)?;
        if cancelled > 0 {
            info!("Cancelled {} pending notification(s) for booking {}", cancelled, booking_id);
        }
        Ok(cancelled)
    }

    pub fn for_booking(&self, booking_id: Uuid) -> BookingResult<Vec<BookingNotification>> {
        Ok(self.db.notifications_for_booking(booking_id)?)
    }

    /// Deliver every due row, one at a time. A failing row is recorded and
    /// the pass moves on.
    pub async fn deliver_due(&self) -> BookingResult<DeliveryReport> {
        let due = self.get_due_pending()?;
        let mut report = DeliveryReport::default();

        for n in due {
            match self.deliver_one(&n).await {
                Ok(Delivery::Sent) => report.sent += 1,
                Ok(Delivery::Dropped) => report.cancelled += 1,
                Ok(Delivery::Failed) => report.failed += 1,
                Err(e) => {
                    warn!("Notification {} could not be processed: {}", n.id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn deliver_one(&self, n: &BookingNotification) -> BookingResult<Delivery> {
        let wanted = if n.kind.is_reminder() {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Completed
        };
        let still_relevant = self
            .db
            .get_booking(n.booking_id)?
            .is_some_and(|b| b.status == wanted);
        if !still_relevant {
            self.db.cancel_notification(n.id)?;
            return Ok(Delivery::Dropped);
        }

        let language = self.db.account_language(&n.user_id)?;
        let text = render(n, &language);

        match bounded(
            self.policy.external_timeout,
            "notification_failed",
            self.channel.send(&n.user_id, &text),
        )
        .await
        {
            Ok(()) => {
                self.mark_sent(n.id)?;
                Ok(Delivery::Sent)
            }
            Err(e) => {
                warn!("Notification {} to {} failed: {}", n.id, n.user_id, e);
                self.mark_failed(n.id, &e.to_string())?;
                Ok(Delivery::Failed)
            }
        }
    }
}

enum Delivery {
    Sent,
    Dropped,
    Failed,
}

/// Message text for a row in the recipient's language. Anything other than
/// Spanish falls back to English.
pub fn render(n: &BookingNotification, language: &str) -> String {
    let name = escape_html(n.payload["performer_name"].as_str().unwrap_or("your performer"));
    let is_performer = n.payload["role"].as_str() == Some("performer");
    let start = n.payload["start_time_utc"]
        .as_str()
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default();
    let spanish = language.starts_with("es");

    if let Some(minutes) = n.kind.lead_minutes() {
        return match (spanish, is_performer) {
            (false, false) => format!(
                "Reminder: your private call with {} starts in {} minutes ({}).",
                name, minutes, start
            ),
            (false, true) => format!(
                "Reminder: you have a private call starting in {} minutes ({}).",
                minutes, start
            ),
            (true, false) => format!(
                "Recordatorio: tu llamada privada con {} comienza en {} minutos ({}).",
                name, minutes, start
            ),
            (true, true) => format!(
                "Recordatorio: tienes una llamada privada que comienza en {} minutos ({}).",
                minutes, start
            ),
        };
    }

    match (n.kind, spanish) {
        (NotificationKind::Followup, false) => {
            format!("Thanks for your call with {}! We hope you enjoyed it.", name)
        }
        (NotificationKind::Followup, true) => {
            format!("¡Gracias por tu llamada con {}! Esperamos que la hayas disfrutado.", name)
        }
        (_, false) => format!(
            "How was your call with {}? Reply to this message to leave feedback.",
            name
        ),
        (_, true) => format!(
            "¿Qué tal tu llamada con {}? Responde a este mensaje para dejar tu opinión.",
            name
        ),
    }
}

/// Texts go out with HTML parse mode.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
