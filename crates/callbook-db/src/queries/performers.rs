use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use callbook_types::{CallType, Performer};

use crate::{Database, OptionalExt, text_col, time_col, ts};

const PERFORMER_COLUMNS: &str = "id, user_id, display_name, base_price_cents, currency, \
     allowed_call_types, max_call_duration, buffer_time_before, buffer_time_after, timezone, \
     status, is_available, availability_mode, created_at, updated_at";

impl Database {
    // -- Performers --

    pub fn upsert_performer(&self, p: &Performer) -> Result<()> {
        let call_types = p
            .allowed_call_types
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO performers (id, user_id, display_name, base_price_cents, currency,
                     allowed_call_types, max_call_duration, buffer_time_before, buffer_time_after,
                     timezone, status, is_available, availability_mode, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(id) DO UPDATE SET
                     user_id = excluded.user_id,
                     display_name = excluded.display_name,
                     base_price_cents = excluded.base_price_cents,
                     currency = excluded.currency,
                     allowed_call_types = excluded.allowed_call_types,
                     max_call_duration = excluded.max_call_duration,
                     buffer_time_before = excluded.buffer_time_before,
                     buffer_time_after = excluded.buffer_time_after,
                     timezone = excluded.timezone,
                     status = excluded.status,
                     is_available = excluded.is_available,
                     availability_mode = excluded.availability_mode,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    p.id.to_string(),
                    p.user_id,
                    p.display_name,
                    p.base_price_cents,
                    p.currency,
                    call_types,
                    p.max_call_duration,
                    p.buffer_time_before,
                    p.buffer_time_after,
                    p.timezone,
                    p.status.as_str(),
                    p.is_available,
                    p.availability_mode.as_str(),
                    ts(p.created_at),
                    ts(p.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_performer(&self, id: Uuid) -> Result<Option<Performer>> {
        self.with_conn(|conn| query_performer(conn, id))
    }

    /// Active performers currently accepting bookings, by display name.
    pub fn list_available_performers(&self) -> Result<Vec<Performer>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM performers
                 WHERE status = 'active' AND is_available = 1
                 ORDER BY display_name",
                PERFORMER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], performer_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_performer(conn: &Connection, id: Uuid) -> Result<Option<Performer>> {
    let sql = format!("SELECT {} FROM performers WHERE id = ?1", PERFORMER_COLUMNS);
    conn.query_row(&sql, [id.to_string()], performer_from_row)
        .optional()
}

fn performer_from_row(row: &Row<'_>) -> rusqlite::Result<Performer> {
    let raw_types: String = row.get(5)?;
    let allowed_call_types = raw_types
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<CallType>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Performer {
        id: text_col(row, 0)?,
        user_id: row.get(1)?,
        display_name: row.get(2)?,
        base_price_cents: row.get(3)?,
        currency: row.get(4)?,
        allowed_call_types,
        max_call_duration: row.get(6)?,
        buffer_time_before: row.get(7)?,
        buffer_time_after: row.get(8)?,
        timezone: row.get(9)?,
        status: text_col(row, 10)?,
        is_available: row.get(11)?,
        availability_mode: text_col(row, 12)?,
        created_at: time_col(row, 13)?,
        updated_at: time_col(row, 14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::performer;
    use callbook_types::PerformerStatus;

    #[test]
    fn performer_round_trips_call_types() {
        let db = Database::open_in_memory().unwrap();
        let p = performer();
        db.upsert_performer(&p).unwrap();

        let loaded = db.get_performer(p.id).unwrap().unwrap();
        assert_eq!(loaded.allowed_call_types, vec![CallType::Video, CallType::Audio]);
        assert_eq!(loaded.buffer_time_before, 10);
    }

    #[test]
    fn inactive_performers_are_not_listed() {
        let db = Database::open_in_memory().unwrap();
        let active = performer();
        let mut inactive = performer();
        inactive.status = PerformerStatus::Inactive;
        let mut away = performer();
        away.is_available = false;

        for p in [&active, &inactive, &away] {
            db.upsert_performer(p).unwrap();
        }

        let listed = db.list_available_performers().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, active.id);
    }
}
