use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use callbook_types::BookingNotification;

use crate::{Database, opt_time_col, opt_ts, text_col, time_col, ts};

const NOTIFICATION_COLUMNS: &str = "id, booking_id, user_id, type, scheduled_for, status, \
     sent_at, failed_at, error, payload, created_at";

impl Database {
    // -- Notifications --

    /// Insert the batch, skipping rows whose (booking, user, type) already
    /// exists. Returns how many were new.
    pub fn insert_notifications(&self, rows: &[BookingNotification]) -> Result<usize> {
        self.with_tx(|tx| {
            let mut inserted = 0;
            for n in rows {
                inserted += tx.execute(
                    "INSERT OR IGNORE INTO booking_notifications (id, booking_id, user_id, type,
                         scheduled_for, status, sent_at, failed_at, error, payload, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    rusqlite::params![
                        n.id.to_string(),
                        n.booking_id.to_string(),
                        n.user_id,
                        n.kind.as_str(),
                        ts(n.scheduled_for),
                        n.status.as_str(),
                        opt_ts(n.sent_at),
                        opt_ts(n.failed_at),
                        n.error,
                        n.payload.to_string(),
                        ts(n.created_at),
                    ],
                )?;
            }
            Ok(inserted)
        })
    }

    /// Pending rows due at or before `now`, oldest first.
    pub fn due_pending_notifications(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<BookingNotification>> {
        self.query_notifications(
            "WHERE status = 'pending' AND scheduled_for <= ?1 ORDER BY scheduled_for, id LIMIT ?2",
            rusqlite::params![ts(now), limit],
        )
    }

    pub fn notifications_for_booking(&self, booking_id: Uuid) -> Result<Vec<BookingNotification>> {
        self.query_notifications(
            "WHERE booking_id = ?1 ORDER BY scheduled_for, user_id",
            rusqlite::params![booking_id.to_string()],
        )
    }

    /// `pending → sent`. Returns false if the row already has an outcome.
    pub fn mark_notification_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE booking_notifications SET status = 'sent', sent_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                rusqlite::params![ts(now), id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    /// `pending → failed`. Returns false if the row already has an outcome.
    pub fn mark_notification_failed(&self, id: Uuid, now: DateTime<Utc>, reason: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE booking_notifications SET status = 'failed', failed_at = ?1, error = ?2
                 WHERE id = ?3 AND status = 'pending'",
                rusqlite::params![ts(now), reason, id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn cancel_notification(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE booking_notifications SET status = 'cancelled'
                 WHERE id = ?1 AND status = 'pending'",
                [id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Cancel every still-pending row of a booking. Sent and failed rows are
    /// left as they are.
    pub fn cancel_pending_notifications(&self, booking_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE booking_notifications SET status = 'cancelled'
                 WHERE booking_id = ?1 AND status = 'pending'",
                [booking_id.to_string()],
            )?;
            Ok(changed)
        })
    }

    fn query_notifications(
        &self,
        clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<BookingNotification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM booking_notifications {}",
                NOTIFICATION_COLUMNS, clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params, notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<BookingNotification> {
    let raw_payload: String = row.get(9)?;
    let payload = serde_json::from_str(&raw_payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(BookingNotification {
        id: text_col(row, 0)?,
        booking_id: text_col(row, 1)?,
        user_id: row.get(2)?,
        kind: text_col(row, 3)?,
        scheduled_for: time_col(row, 4)?,
        status: text_col(row, 5)?,
        sent_at: opt_time_col(row, 6)?,
        failed_at: opt_time_col(row, 7)?,
        error: row.get(8)?,
        payload,
        created_at: time_col(row, 10)?,
    })
}
