use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use callbook_types::{CallSession, SessionStatus};

use crate::{Database, OptionalExt, opt_time_col, opt_ts, text_col, time_col, ts};

const SESSION_COLUMNS: &str = "s.id, s.booking_id, s.room_provider, s.room_id, s.room_name, \
     s.join_url_user, s.join_url_performer, s.token_user, s.token_performer, s.max_participants, \
     s.recording_disabled, s.status, s.started_at, s.ended_at, s.actual_duration_seconds, \
     s.version, s.created_at, s.updated_at";

impl Database {
    // -- Call sessions --

    /// Insert unless the booking already has a session. Returns whether this
    /// call created the row.
    pub fn insert_session_if_absent(&self, s: &CallSession) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO call_sessions (id, booking_id, room_provider, room_id,
                     room_name, join_url_user, join_url_performer, token_user, token_performer,
                     max_participants, recording_disabled, status, started_at, ended_at,
                     actual_duration_seconds, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                rusqlite::params![
                    s.id.to_string(),
                    s.booking_id.to_string(),
                    s.room_provider,
                    s.room_id,
                    s.room_name,
                    s.join_url_user,
                    s.join_url_performer,
                    s.token_user,
                    s.token_performer,
                    s.max_participants,
                    s.recording_disabled,
                    s.status.as_str(),
                    opt_ts(s.started_at),
                    opt_ts(s.ended_at),
                    s.actual_duration_seconds,
                    s.version,
                    ts(s.created_at),
                    ts(s.updated_at),
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_session(&self, id: Uuid) -> Result<Option<CallSession>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM call_sessions s WHERE s.id = ?1", SESSION_COLUMNS);
            conn.query_row(&sql, [id.to_string()], session_from_row)
                .optional()
        })
    }

    pub fn get_session_by_booking(&self, booking_id: Uuid) -> Result<Option<CallSession>> {
        self.with_conn(|conn| query_session_by_booking(conn, booking_id))
    }

    /// `scheduled → live`, only while the booking is still confirmed.
    pub fn start_session(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE call_sessions
                 SET status = 'live', started_at = ?1, version = version + 1, updated_at = ?1
                 WHERE id = ?2 AND status = 'scheduled'
                   AND EXISTS (
                       SELECT 1 FROM bookings b
                       WHERE b.id = call_sessions.booking_id AND b.status = 'confirmed'
                   )",
                rusqlite::params![ts(now), id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    /// `live → ended`, recording the measured duration.
    pub fn end_session(&self, id: Uuid, now: DateTime<Utc>, duration_seconds: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE call_sessions
                 SET status = 'ended', ended_at = ?1, actual_duration_seconds = ?2,
                     version = version + 1, updated_at = ?1
                 WHERE id = ?3 AND status = 'live'",
                rusqlite::params![ts(now), duration_seconds, id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Any non-terminal status `→ destroyed`, back-filling `ended_at`.
    pub fn destroy_session(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let from = SessionStatus::sources_of(SessionStatus::Destroyed)
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(",");

        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE call_sessions
                 SET status = 'destroyed', ended_at = COALESCE(ended_at, ?1),
                     version = version + 1, updated_at = ?1
                 WHERE id = ?2 AND status IN ({})",
                from
            );
            let changed = conn.execute(&sql, rusqlite::params![ts(now), id.to_string()])?;
            Ok(changed == 1)
        })
    }

    /// Live sessions whose booking's scheduled end is before `now`.
    pub fn overdue_sessions(&self, now: DateTime<Utc>) -> Result<Vec<CallSession>> {
        self.query_sessions(
            "JOIN bookings b ON b.id = s.booking_id
             WHERE s.status = 'live' AND b.end_time_utc < ?1
             ORDER BY b.end_time_utc",
            rusqlite::params![ts(now)],
        )
    }

    /// Scheduled sessions of confirmed bookings starting within `[from, to]`.
    pub fn sessions_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CallSession>> {
        self.query_sessions(
            "JOIN bookings b ON b.id = s.booking_id
             WHERE s.status = 'scheduled' AND b.status = 'confirmed'
               AND b.start_time_utc >= ?1 AND b.start_time_utc <= ?2
             ORDER BY b.start_time_utc",
            rusqlite::params![ts(from), ts(to)],
        )
    }

    fn query_sessions(
        &self,
        clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<CallSession>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM call_sessions s {}", SESSION_COLUMNS, clause);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params, session_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_session_by_booking(conn: &Connection, booking_id: Uuid) -> Result<Option<CallSession>> {
    let sql = format!(
        "SELECT {} FROM call_sessions s WHERE s.booking_id = ?1",
        SESSION_COLUMNS
    );
    conn.query_row(&sql, [booking_id.to_string()], session_from_row)
        .optional()
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<CallSession> {
    Ok(CallSession {
        id: text_col(row, 0)?,
        booking_id: text_col(row, 1)?,
        room_provider: row.get(2)?,
        room_id: row.get(3)?,
        room_name: row.get(4)?,
        join_url_user: row.get(5)?,
        join_url_performer: row.get(6)?,
        token_user: row.get(7)?,
        token_performer: row.get(8)?,
        max_participants: row.get(9)?,
        recording_disabled: row.get(10)?,
        status: text_col(row, 11)?,
        started_at: opt_time_col(row, 12)?,
        ended_at: opt_time_col(row, 13)?,
        actual_duration_seconds: row.get(14)?,
        version: row.get(15)?,
        created_at: time_col(row, 16)?,
        updated_at: time_col(row, 17)?,
    })
}
