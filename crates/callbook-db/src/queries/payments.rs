use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use callbook_types::{Payment, PaymentStatus};

use crate::{Database, OptionalExt, opt_time_col, opt_ts, text_col, time_col, ts};

const PAYMENT_COLUMNS: &str = "id, booking_id, provider, amount_cents, currency, status, \
     payment_link, expires_at, paid_at, provider_payment_id, created_at, updated_at";

impl Database {
    // -- Payments --

    pub fn insert_payment(&self, p: &Payment) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO payments (id, booking_id, provider, amount_cents, currency, status,
                     payment_link, expires_at, paid_at, provider_payment_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    p.id.to_string(),
                    p.booking_id.to_string(),
                    p.provider,
                    p.amount_cents,
                    p.currency,
                    p.status.as_str(),
                    p.payment_link,
                    ts(p.expires_at),
                    opt_ts(p.paid_at),
                    p.provider_payment_id,
                    ts(p.created_at),
                    ts(p.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        self.with_conn(|conn| query_payment(conn, id))
    }

    /// Most recent payment attempt for a booking.
    pub fn latest_payment_for_booking(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM payments WHERE booking_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                PAYMENT_COLUMNS
            );
            conn.query_row(&sql, [booking_id.to_string()], payment_from_row)
                .optional()
        })
    }

    /// The earliest payment of a booking that went through: the one that
    /// confirmed it.
    pub fn first_paid_payment(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM payments WHERE booking_id = ?1 AND status = 'paid'
                 ORDER BY paid_at, rowid LIMIT 1",
                PAYMENT_COLUMNS
            );
            conn.query_row(&sql, [booking_id.to_string()], payment_from_row)
                .optional()
        })
    }

    pub fn pending_payments_for_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM payments WHERE booking_id = ?1 AND status = 'pending'
                 ORDER BY created_at, rowid",
                PAYMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([booking_id.to_string()], payment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Guarded status change. `paid_at` and `provider_payment_id` are only
    /// written when given. Returns whether the row moved.
    pub fn transition_payment(
        &self,
        id: Uuid,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
        provider_payment_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let from = PaymentStatus::sources_of(to)
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(",");
        if from.is_empty() {
            return Ok(false);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE payments SET
                     status = ?1,
                     paid_at = COALESCE(?2, paid_at),
                     provider_payment_id = COALESCE(?3, provider_payment_id),
                     updated_at = ?4
                 WHERE id = ?5 AND status IN ({})",
                from
            );
            let changed = conn.execute(
                &sql,
                rusqlite::params![
                    to.as_str(),
                    opt_ts(paid_at),
                    provider_payment_id,
                    ts(now),
                    id.to_string(),
                ],
            )?;
            Ok(changed == 1)
        })
    }

    /// Expire every pending payment whose link lapsed before `now`.
    pub fn expire_overdue_payments(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE payments SET status = 'expired', updated_at = ?1
                 WHERE status = 'pending' AND expires_at < ?1",
                [ts(now)],
            )?;
            Ok(changed)
        })
    }

    /// Expire the pending payments of one booking, optionally sparing one row.
    pub fn expire_pending_payments(
        &self,
        booking_id: Uuid,
        keep: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE payments SET status = 'expired', updated_at = ?1
                 WHERE booking_id = ?2 AND status = 'pending' AND (?3 IS NULL OR id != ?3)",
                rusqlite::params![ts(now), booking_id.to_string(), keep.map(|k| k.to_string())],
            )?;
            Ok(changed)
        })
    }
}

fn query_payment(conn: &Connection, id: Uuid) -> Result<Option<Payment>> {
    let sql = format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS);
    conn.query_row(&sql, [id.to_string()], payment_from_row).optional()
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: text_col(row, 0)?,
        booking_id: text_col(row, 1)?,
        provider: row.get(2)?,
        amount_cents: row.get(3)?,
        currency: row.get(4)?,
        status: text_col(row, 5)?,
        payment_link: row.get(6)?,
        expires_at: time_col(row, 7)?,
        paid_at: opt_time_col(row, 8)?,
        provider_payment_id: row.get(9)?,
        created_at: time_col(row, 10)?,
        updated_at: time_col(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::{at, booking, performer};
    use chrono::Duration;

    fn payment(booking_id: Uuid, created: DateTime<Utc>) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id,
            provider: "stripe".into(),
            amount_cents: 10_000,
            currency: "USD".into(),
            status: PaymentStatus::Pending,
            payment_link: "https://pay.test/x".into(),
            expires_at: created + Duration::minutes(10),
            paid_at: None,
            provider_payment_id: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn setup() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let p = performer();
        db.upsert_performer(&p).unwrap();
        let b = booking(p.id, at(2026, 10, 20, 12, 0), 30);
        db.insert_booking(&b, "test").unwrap();
        (db, b.id)
    }

    #[test]
    fn paid_is_applied_once() {
        let (db, bid) = setup();
        let now = at(2026, 10, 2, 12, 0);
        let p = payment(bid, now);
        db.insert_payment(&p).unwrap();

        assert!(db.transition_payment(p.id, PaymentStatus::Paid, Some(now), Some("pi_1"), now).unwrap());
        assert!(!db.transition_payment(p.id, PaymentStatus::Paid, Some(now), Some("pi_2"), now).unwrap());

        let loaded = db.get_payment(p.id).unwrap().unwrap();
        assert_eq!(loaded.status, PaymentStatus::Paid);
        assert_eq!(loaded.provider_payment_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn overdue_sweep_only_touches_lapsed_pending() {
        let (db, bid) = setup();
        let t0 = at(2026, 10, 2, 12, 0);
        let old = payment(bid, t0);
        let fresh = payment(bid, t0 + Duration::minutes(8));
        db.insert_payment(&old).unwrap();
        db.insert_payment(&fresh).unwrap();

        let now = t0 + Duration::minutes(11);
        assert_eq!(db.expire_overdue_payments(now).unwrap(), 1);
        assert_eq!(db.get_payment(old.id).unwrap().unwrap().status, PaymentStatus::Expired);
        assert_eq!(db.latest_payment_for_booking(bid).unwrap().unwrap().id, fresh.id);

        // Late webhook still lands on the expired row.
        assert!(db.transition_payment(old.id, PaymentStatus::Paid, Some(now), None, now).unwrap());
    }

    #[test]
    fn superseding_spares_the_kept_row() {
        let (db, bid) = setup();
        let t0 = at(2026, 10, 2, 12, 0);
        let a = payment(bid, t0);
        let b = payment(bid, t0);
        db.insert_payment(&a).unwrap();
        db.insert_payment(&b).unwrap();

        assert_eq!(db.expire_pending_payments(bid, Some(b.id), t0).unwrap(), 1);
        let pending = db.pending_payments_for_booking(bid).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }
}
