use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use callbook_types::AvailabilitySlot;

use crate::models::{SlotPatch, SlotWrite};
use crate::{Database, OptionalExt, opt_text_col, text_col, time_col, ts};

const SLOT_COLUMNS: &str = "id, performer_id, date, start_time, end_time, timezone, \
     is_available, is_booked, booking_id, version, created_at, updated_at";

fn time_text(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

impl Database {
    // -- Availability slots --

    /// Insert every slot or none. Each slot is checked with a half-open
    /// overlap test against the stored slots and against the earlier slots
    /// of the same batch.
    pub fn insert_slots(&self, slots: &[AvailabilitySlot]) -> Result<SlotWrite> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for slot in slots {
                if slot.end_time <= slot.start_time {
                    return Ok(SlotWrite::InvalidRange);
                }
                if let Some(existing) = find_overlap(
                    &tx,
                    slot.performer_id,
                    slot.date,
                    slot.start_time,
                    slot.end_time,
                    None,
                )? {
                    // Dropping the transaction rolls back the earlier inserts.
                    return Ok(SlotWrite::Overlaps { slot_id: existing });
                }
                tx.execute(
                    "INSERT INTO availability_slots (id, performer_id, date, start_time, end_time,
                         timezone, is_available, is_booked, booking_id, version, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL, 1, ?8, ?9)",
                    rusqlite::params![
                        slot.id.to_string(),
                        slot.performer_id.to_string(),
                        slot.date.to_string(),
                        time_text(slot.start_time),
                        time_text(slot.end_time),
                        slot.timezone,
                        slot.is_available,
                        ts(slot.created_at),
                        ts(slot.updated_at),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(SlotWrite::Applied)
        })
    }

    pub fn update_slot(&self, id: Uuid, patch: &SlotPatch, now: DateTime<Utc>) -> Result<SlotWrite> {
        self.with_conn(|conn| {
            let Some(current) = query_slot(conn, id)? else {
                return Ok(SlotWrite::NotFound);
            };
            if current.is_booked {
                return Ok(SlotWrite::Booked);
            }

            let start = patch.start_time.unwrap_or(current.start_time);
            let end = patch.end_time.unwrap_or(current.end_time);
            if end <= start {
                return Ok(SlotWrite::InvalidRange);
            }
            if let Some(existing) =
                find_overlap(conn, current.performer_id, current.date, start, end, Some(id))?
            {
                return Ok(SlotWrite::Overlaps { slot_id: existing });
            }

            let changed = conn.execute(
                "UPDATE availability_slots
                 SET start_time = ?1, end_time = ?2, is_available = ?3,
                     version = version + 1, updated_at = ?4
                 WHERE id = ?5 AND version = ?6 AND is_booked = 0",
                rusqlite::params![
                    time_text(start),
                    time_text(end),
                    patch.is_available.unwrap_or(current.is_available),
                    ts(now),
                    id.to_string(),
                    current.version,
                ],
            )?;
            Ok(if changed == 1 {
                SlotWrite::Applied
            } else {
                SlotWrite::Booked
            })
        })
    }

    pub fn delete_slot(&self, id: Uuid) -> Result<SlotWrite> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM availability_slots WHERE id = ?1 AND is_booked = 0",
                [id.to_string()],
            )?;
            if removed == 1 {
                return Ok(SlotWrite::Applied);
            }
            Ok(match query_slot(conn, id)? {
                Some(_) => SlotWrite::Booked,
                None => SlotWrite::NotFound,
            })
        })
    }

    /// Mark a free slot as taken by `booking_id`. Returns false when the slot
    /// is already booked or not open for booking.
    pub fn book_slot(&self, slot_id: Uuid, booking_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE availability_slots
                 SET is_booked = 1, booking_id = ?1, version = version + 1, updated_at = ?2
                 WHERE id = ?3 AND is_booked = 0 AND is_available = 1",
                rusqlite::params![booking_id.to_string(), ts(now), slot_id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Free a booked slot. Returns false when it was not booked.
    pub fn release_slot(&self, slot_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE availability_slots
                 SET is_booked = 0, booking_id = NULL, version = version + 1, updated_at = ?1
                 WHERE id = ?2 AND is_booked = 1",
                rusqlite::params![ts(now), slot_id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn get_slot(&self, id: Uuid) -> Result<Option<AvailabilitySlot>> {
        self.with_conn(|conn| query_slot(conn, id))
    }

    /// All explicit slots of a performer for local dates in `[from, to]`.
    pub fn slots_for_dates(
        &self,
        performer_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM availability_slots
                 WHERE performer_id = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date, start_time",
                SLOT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![performer_id.to_string(), from.to_string(), to.to_string()],
                    slot_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn find_overlap(
    conn: &Connection,
    performer_id: Uuid,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    exclude: Option<Uuid>,
) -> Result<Option<Uuid>> {
    // Times are fixed-width HH:MM:SS text, so string order is time order.
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM availability_slots
             WHERE performer_id = ?1 AND date = ?2
               AND start_time < ?4 AND end_time > ?3
               AND (?5 IS NULL OR id != ?5)
             LIMIT 1",
            rusqlite::params![
                performer_id.to_string(),
                date.to_string(),
                time_text(start),
                time_text(end),
                exclude.map(|id| id.to_string()),
            ],
            |row| row.get(0),
        )
        .optional()?;

    found
        .map(|id| id.parse::<Uuid>().map_err(Into::into))
        .transpose()
}

fn query_slot(conn: &Connection, id: Uuid) -> Result<Option<AvailabilitySlot>> {
    let sql = format!("SELECT {} FROM availability_slots WHERE id = ?1", SLOT_COLUMNS);
    conn.query_row(&sql, [id.to_string()], slot_from_row).optional()
}

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<AvailabilitySlot> {
    Ok(AvailabilitySlot {
        id: text_col(row, 0)?,
        performer_id: text_col(row, 1)?,
        date: text_col(row, 2)?,
        start_time: text_col(row, 3)?,
        end_time: text_col(row, 4)?,
        timezone: row.get(5)?,
        is_available: row.get(6)?,
        is_booked: row.get(7)?,
        booking_id: opt_text_col(row, 8)?,
        version: row.get(9)?,
        created_at: time_col(row, 10)?,
        updated_at: time_col(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::{at, booking, performer};

    fn slot(performer_id: Uuid, start: (u32, u32), end: (u32, u32)) -> AvailabilitySlot {
        AvailabilitySlot {
            id: Uuid::new_v4(),
            performer_id,
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            timezone: "UTC".into(),
            is_available: true,
            is_booked: false,
            booking_id: None,
            version: 1,
            created_at: at(2026, 10, 1, 0, 0),
            updated_at: at(2026, 10, 1, 0, 0),
        }
    }

    fn setup() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let p = performer();
        db.upsert_performer(&p).unwrap();
        (db, p.id)
    }

    #[test]
    fn overlapping_insert_is_rejected_but_touching_is_fine() {
        let (db, pid) = setup();
        let first = slot(pid, (10, 0), (12, 0));
        assert_eq!(db.insert_slots(&[first.clone()]).unwrap(), SlotWrite::Applied);

        let clash = slot(pid, (11, 30), (13, 0));
        assert_eq!(
            db.insert_slots(&[clash]).unwrap(),
            SlotWrite::Overlaps { slot_id: first.id }
        );

        // Half-open: 12:00 start touches but does not overlap.
        let touching = slot(pid, (12, 0), (13, 0));
        assert_eq!(db.insert_slots(&[touching]).unwrap(), SlotWrite::Applied);
    }

    #[test]
    fn bulk_insert_is_all_or_nothing() {
        let (db, pid) = setup();
        let a = slot(pid, (9, 0), (10, 0));
        let b = slot(pid, (10, 0), (11, 0));
        let c = slot(pid, (10, 30), (11, 30));

        let outcome = db.insert_slots(&[a, b.clone(), c]).unwrap();
        assert_eq!(outcome, SlotWrite::Overlaps { slot_id: b.id });

        let day = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        assert!(db.slots_for_dates(pid, day, day).unwrap().is_empty());
    }

    #[test]
    fn book_and_release_are_guarded() {
        let (db, pid) = setup();
        let s = slot(pid, (10, 0), (11, 0));
        db.insert_slots(&[s.clone()]).unwrap();
        let b = booking(pid, at(2026, 10, 20, 10, 0), 60);
        db.insert_booking(&b, "test").unwrap();
        let now = at(2026, 10, 2, 0, 0);

        assert!(db.book_slot(s.id, b.id, now).unwrap());
        assert!(!db.book_slot(s.id, b.id, now).unwrap());

        let loaded = db.get_slot(s.id).unwrap().unwrap();
        assert!(loaded.is_booked);
        assert_eq!(loaded.booking_id, Some(b.id));
        assert_eq!(loaded.version, 2);

        assert_eq!(db.delete_slot(s.id).unwrap(), SlotWrite::Booked);
        assert!(db.release_slot(s.id, now).unwrap());
        assert!(!db.release_slot(s.id, now).unwrap());
        assert_eq!(db.delete_slot(s.id).unwrap(), SlotWrite::Applied);
        assert_eq!(db.delete_slot(s.id).unwrap(), SlotWrite::NotFound);
    }

    #[test]
    fn update_checks_overlap_excluding_itself() {
        let (db, pid) = setup();
        let a = slot(pid, (10, 0), (11, 0));
        let b = slot(pid, (12, 0), (13, 0));
        db.insert_slots(&[a.clone(), b.clone()]).unwrap();
        let now = at(2026, 10, 2, 0, 0);

        let widen = SlotPatch {
            end_time: NaiveTime::from_hms_opt(11, 30, 0),
            ..Default::default()
        };
        assert_eq!(db.update_slot(a.id, &widen, now).unwrap(), SlotWrite::Applied);

        let clash = SlotPatch {
            end_time: NaiveTime::from_hms_opt(12, 30, 0),
            ..Default::default()
        };
        assert_eq!(
            db.update_slot(a.id, &clash, now).unwrap(),
            SlotWrite::Overlaps { slot_id: b.id }
        );

        let inverted = SlotPatch {
            start_time: NaiveTime::from_hms_opt(14, 0, 0),
            ..Default::default()
        };
        assert_eq!(db.update_slot(a.id, &inverted, now).unwrap(), SlotWrite::InvalidRange);
    }
}
