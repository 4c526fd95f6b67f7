use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use callbook_types::{Booking, BookingStatus};

use crate::models::{BookingGuard, BookingTransition, BookingUpdate, TransitionOutcome};
use crate::{Database, OptionalExt, opt_text_col, opt_time_col, opt_ts, text_col, time_col, ts};

const BOOKING_COLUMNS: &str = "b.id, b.user_id, b.performer_id, b.slot_id, b.call_type, \
     b.duration_minutes, b.start_time_utc, b.end_time_utc, b.price_cents, b.currency, b.status, \
     b.hold_expires_at, b.rules_confirmed_at, b.cancel_reason, b.cancelled_by, b.version, \
     b.created_at, b.updated_at";

/// `'draft','held',…` for an `IN (…)` clause. Only ever fed enum text.
pub(crate) fn status_list(statuses: &[BookingStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(",")
}

impl Database {
    // -- Bookings --

    pub fn insert_booking(&self, b: &Booking, actor: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO bookings (id, user_id, performer_id, slot_id, call_type, duration_minutes,
                     start_time_utc, end_time_utc, price_cents, currency, status, hold_expires_at,
                     rules_confirmed_at, cancel_reason, cancelled_by, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                rusqlite::params_from_iter(booking_params(b).iter()),
            )?;
            record_transition(&tx, b.id, None, b.status, b.version, actor, b.created_at)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Conditional insert: the booking is written only if no claiming booking
    /// of the same performer overlaps it once expanded by the buffers.
    /// Returns whether the row was inserted.
    pub fn insert_booking_if_free(
        &self,
        b: &Booking,
        buffer_before: chrono::Duration,
        buffer_after: chrono::Duration,
        actor: &str,
    ) -> Result<bool> {
        let sql = format!(
            "INSERT INTO bookings (id, user_id, performer_id, slot_id, call_type, duration_minutes,
                 start_time_utc, end_time_utc, price_cents, currency, status, hold_expires_at,
                 rules_confirmed_at, cancel_reason, cancelled_by, version, created_at, updated_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18
             WHERE NOT EXISTS (
                 SELECT 1 FROM bookings
                 WHERE performer_id = ?3
                   AND status IN ({})
                   AND ?7 < end_time_utc + ?19
                   AND ?8 > start_time_utc - ?20
             )",
            status_list(&BookingStatus::claiming())
        );

        let before = buffer_before.num_seconds();
        let after = buffer_after.num_seconds();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut params = booking_params(b);
            params.push(Value::Integer(after));
            params.push(Value::Integer(before));
            let inserted = tx.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
            if inserted == 1 {
                record_transition(&tx, b.id, None, b.status, b.version, actor, b.created_at)?;
            }
            tx.commit()?;
            Ok(inserted == 1)
        })
    }

    pub fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        self.with_conn(|conn| query_booking(conn, id))
    }

    pub fn list_user_bookings(&self, user_id: &str) -> Result<Vec<Booking>> {
        self.query_bookings(
            "WHERE b.user_id = ?1 ORDER BY b.start_time_utc DESC",
            rusqlite::params![user_id],
        )
    }

    /// Claiming bookings of a performer whose raw interval intersects `[from, to)`.
    pub fn claiming_bookings(
        &self,
        performer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>> {
        let clause = format!(
            "WHERE b.performer_id = ?1 AND b.status IN ({})
               AND b.start_time_utc < ?3 AND b.end_time_utc > ?2
             ORDER BY b.start_time_utc",
            status_list(&BookingStatus::claiming())
        );
        self.query_bookings(
            &clause,
            rusqlite::params![performer_id.to_string(), ts(from), ts(to)],
        )
    }

    /// Other confirmed bookings that collide with `b` under the buffered
    /// overlap rule. Used to re-validate at payment time.
    pub fn confirmed_conflicts(
        &self,
        b: &Booking,
        buffer_before: chrono::Duration,
        buffer_after: chrono::Duration,
    ) -> Result<Vec<Booking>> {
        self.query_bookings(
            "WHERE b.performer_id = ?1 AND b.id != ?2 AND b.status = 'confirmed'
               AND ?3 < b.end_time_utc + ?5 AND ?4 > b.start_time_utc - ?6",
            rusqlite::params![
                b.performer_id.to_string(),
                b.id.to_string(),
                ts(b.start_time_utc),
                ts(b.end_time_utc),
                buffer_after.num_seconds(),
                buffer_before.num_seconds(),
            ],
        )
    }

    /// Guarded status change. The update only lands when the row is in one of
    /// `guard.from` (and at `guard.version`, if set); every applied change
    /// bumps `version` and appends to the audit trail.
    pub fn transition_booking(
        &self,
        guard: &BookingGuard,
        update: &BookingUpdate,
        now: DateTime<Utc>,
        actor: &str,
    ) -> Result<TransitionOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current: Option<(String, i64)> = tx
                .query_row(
                    "SELECT status, version FROM bookings WHERE id = ?1",
                    [guard.id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((status_text, version)) = current else {
                return Ok(TransitionOutcome::NotFound);
            };
            let status: BookingStatus = status_text.parse()?;

            if !guard.from.contains(&status) {
                return Ok(TransitionOutcome::WrongStatus(status));
            }
            if let Some(expected) = guard.version {
                if expected != version {
                    return Ok(TransitionOutcome::VersionMismatch { current: version });
                }
            }
            if guard.no_started_session {
                let started: bool = tx.query_row(
                    "SELECT EXISTS (SELECT 1 FROM call_sessions
                         WHERE booking_id = ?1 AND started_at IS NOT NULL)",
                    [guard.id.to_string()],
                    |row| row.get(0),
                )?;
                if started {
                    return Ok(TransitionOutcome::SessionStarted);
                }
            }

            let changed = tx.execute(
                "UPDATE bookings SET
                     status = ?1,
                     hold_expires_at = COALESCE(?2, hold_expires_at),
                     rules_confirmed_at = COALESCE(?3, rules_confirmed_at),
                     cancel_reason = COALESCE(?4, cancel_reason),
                     cancelled_by = COALESCE(?5, cancelled_by),
                     version = version + 1,
                     updated_at = ?6
                 WHERE id = ?7 AND status = ?8 AND version = ?9",
                rusqlite::params![
                    update.to.as_str(),
                    opt_ts(update.hold_expires_at),
                    opt_ts(update.rules_confirmed_at),
                    update.cancel_reason,
                    update.cancelled_by.map(|c| c.as_str()),
                    ts(now),
                    guard.id.to_string(),
                    status.as_str(),
                    version,
                ],
            )?;
            if changed != 1 {
                return Ok(TransitionOutcome::VersionMismatch { current: version });
            }

            record_transition(&tx, guard.id, Some(status), update.to, version + 1, actor, now)?;
            tx.commit()?;
            Ok(TransitionOutcome::Applied {
                version: version + 1,
            })
        })
    }

    /// `held` bookings whose hold lapsed before `now`.
    pub fn find_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        self.query_bookings(
            "WHERE b.status = 'held' AND b.hold_expires_at IS NOT NULL AND b.hold_expires_at < ?1",
            rusqlite::params![ts(now)],
        )
    }

    /// Drafts created before `cutoff` that never got a hold.
    pub fn find_stale_drafts(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        self.query_bookings(
            "WHERE b.status = 'draft' AND b.created_at < ?1",
            rusqlite::params![ts(cutoff)],
        )
    }

    /// `awaiting_payment` bookings whose hold lapsed and that have no
    /// pending, unexpired payment left.
    pub fn find_lapsed_awaiting_payment(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        self.query_bookings(
            "WHERE b.status = 'awaiting_payment'
               AND b.hold_expires_at IS NOT NULL AND b.hold_expires_at < ?1
               AND NOT EXISTS (
                   SELECT 1 FROM payments p
                   WHERE p.booking_id = b.id AND p.status = 'pending' AND p.expires_at >= ?1
               )",
            rusqlite::params![ts(now)],
        )
    }

    /// Confirmed bookings that started before `cutoff` and whose session
    /// never went live.
    pub fn find_no_show_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        self.query_bookings(
            "WHERE b.status = 'confirmed' AND b.start_time_utc < ?1
               AND NOT EXISTS (
                   SELECT 1 FROM call_sessions s
                   WHERE s.booking_id = b.id AND s.started_at IS NOT NULL
               )",
            rusqlite::params![ts(cutoff)],
        )
    }

    pub fn booking_transitions(&self, booking_id: Uuid) -> Result<Vec<BookingTransition>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT booking_id, from_status, to_status, version, actor, at
                 FROM booking_transitions WHERE booking_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([booking_id.to_string()], |row| {
                    Ok(BookingTransition {
                        booking_id: text_col(row, 0)?,
                        from_status: opt_text_col(row, 1)?,
                        to_status: text_col(row, 2)?,
                        version: row.get(3)?,
                        actor: row.get(4)?,
                        at: time_col(row, 5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn query_bookings(&self, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Booking>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM bookings b {}", BOOKING_COLUMNS, clause);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params, booking_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn booking_params(b: &Booking) -> Vec<Value> {
    let opt_text = |v: Option<String>| v.map(Value::Text).unwrap_or(Value::Null);
    let opt_int = |v: Option<i64>| v.map(Value::Integer).unwrap_or(Value::Null);
    vec![
        Value::Text(b.id.to_string()),
        Value::Text(b.user_id.clone()),
        Value::Text(b.performer_id.to_string()),
        opt_text(b.slot_id.map(|id| id.to_string())),
        Value::Text(b.call_type.as_str().to_string()),
        Value::Integer(i64::from(b.duration_minutes)),
        Value::Integer(ts(b.start_time_utc)),
        Value::Integer(ts(b.end_time_utc)),
        Value::Integer(b.price_cents),
        Value::Text(b.currency.clone()),
        Value::Text(b.status.as_str().to_string()),
        opt_int(opt_ts(b.hold_expires_at)),
        opt_int(opt_ts(b.rules_confirmed_at)),
        opt_text(b.cancel_reason.clone()),
        opt_text(b.cancelled_by.map(|c| c.as_str().to_string())),
        Value::Integer(b.version),
        Value::Integer(ts(b.created_at)),
        Value::Integer(ts(b.updated_at)),
    ]
}

fn record_transition(
    conn: &Connection,
    booking_id: Uuid,
    from: Option<BookingStatus>,
    to: BookingStatus,
    version: i64,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO booking_transitions (booking_id, from_status, to_status, version, actor, at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            booking_id.to_string(),
            from.map(|s| s.as_str()),
            to.as_str(),
            version,
            actor,
            ts(at),
        ],
    )?;
    Ok(())
}

fn query_booking(conn: &Connection, id: Uuid) -> Result<Option<Booking>> {
    let sql = format!("SELECT {} FROM bookings b WHERE b.id = ?1", BOOKING_COLUMNS);
    conn.query_row(&sql, [id.to_string()], booking_from_row).optional()
}

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: text_col(row, 0)?,
        user_id: row.get(1)?,
        performer_id: text_col(row, 2)?,
        slot_id: opt_text_col(row, 3)?,
        call_type: text_col(row, 4)?,
        duration_minutes: row.get(5)?,
        start_time_utc: time_col(row, 6)?,
        end_time_utc: time_col(row, 7)?,
        price_cents: row.get(8)?,
        currency: row.get(9)?,
        status: text_col(row, 10)?,
        hold_expires_at: opt_time_col(row, 11)?,
        rules_confirmed_at: opt_time_col(row, 12)?,
        cancel_reason: row.get(13)?,
        cancelled_by: opt_text_col(row, 14)?,
        version: row.get(15)?,
        created_at: time_col(row, 16)?,
        updated_at: time_col(row, 17)?,
    })
}
