//! Bookable time computation and explicit availability management.
//!
//! Two window strategies exist, picked per performer by `availability_mode`:
//! a default working window with explicit per-day overrides, or explicit slot
//! rows only. Both feed the same candidate generator and the same buffered
//! overlap predicate used at booking time.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::info;
use uuid::Uuid;

use callbook_db::Database;
use callbook_db::models::{SlotPatch, SlotWrite};
use callbook_types::api::{AvailabilityPatch, NewAvailability};
use callbook_types::{AvailabilityMode, AvailabilitySlot, AvailableSlot, Booking, Performer};

use crate::clock::Clock;
use crate::error::{BookingError, BookingResult};
use crate::policy::BookingPolicy;

/// `basePriceCents × duration / 30`, rounded half up.
pub fn price_for(base_price_cents: i64, duration_minutes: u32) -> i64 {
    (base_price_cents * i64::from(duration_minutes) + 15) / 30
}

/// The single overlap rule: a candidate `[start, end)` collides with a
/// booking once the booking is widened by the performer's buffers.
pub fn overlaps_buffered(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    booking: &Booking,
    buffer_before: Duration,
    buffer_after: Duration,
) -> bool {
    start < booking.end_time_utc + buffer_after && end > booking.start_time_utc - buffer_before
}

pub(crate) fn performer_tz(performer: &Performer) -> BookingResult<Tz> {
    performer.timezone.parse::<Tz>().map_err(|_| {
        BookingError::Internal(anyhow::anyhow!(
            "performer {} has unknown timezone {:?}",
            performer.id,
            performer.timezone
        ))
    })
}

/// Whether `[start, end)` lies inside an explicit slot's local window.
pub(crate) fn slot_covers(
    performer: &Performer,
    slot: &AvailabilitySlot,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> BookingResult<bool> {
    let tz = performer_tz(performer)?;
    let window = local_to_utc(&tz, slot.date, slot.start_time)
        .zip(local_to_utc(&tz, slot.date, slot.end_time));
    Ok(window.is_some_and(|(from, to)| start >= from && end <= to))
}

/// A bookable window on one local date.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub slot_id: Option<Uuid>,
}

/// Produces the windows of one local date from that date's explicit rows.
pub trait WindowSource: Send + Sync {
    fn windows(&self, date: NaiveDate, day_slots: &[AvailabilitySlot]) -> Vec<LocalWindow>;
}

/// Default working window, replaced by the explicit rows on days that have any.
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WindowSource for WorkingHours {
    fn windows(&self, _date: NaiveDate, day_slots: &[AvailabilitySlot]) -> Vec<LocalWindow> {
        if day_slots.is_empty() {
            return vec![LocalWindow {
                start: self.start,
                end: self.end,
                slot_id: None,
            }];
        }
        // Overrides shape the day; an all-unavailable day is a day off.
        day_slots
            .iter()
            .filter(|s| s.is_available && !s.is_booked)
            .map(|s| LocalWindow {
                start: s.start_time,
                end: s.end_time,
                slot_id: None,
            })
            .collect()
    }
}

/// Only explicit, open rows are bookable. Booking one reserves the row.
pub struct ExplicitSlots;

impl WindowSource for ExplicitSlots {
    fn windows(&self, _date: NaiveDate, day_slots: &[AvailabilitySlot]) -> Vec<LocalWindow> {
        day_slots
            .iter()
            .filter(|s| s.is_available && !s.is_booked)
            .map(|s| LocalWindow {
                start: s.start_time,
                end: s.end_time,
                slot_id: Some(s.id),
            })
            .collect()
    }
}

pub struct AvailabilityEngine {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl AvailabilityEngine {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, policy: BookingPolicy) -> Self {
        Self { db, clock, policy }
    }

    fn source_for(&self, performer: &Performer) -> Box<dyn WindowSource> {
        match performer.availability_mode {
            AvailabilityMode::WorkingHours => Box::new(WorkingHours {
                start: self.policy.default_window_start,
                end: self.policy.default_window_end,
            }),
            AvailabilityMode::ExplicitSlots => Box::new(ExplicitSlots),
        }
    }

    /// Bookable start times in `[from, to)` for a call of `duration_minutes`.
    pub fn get_available_slots(
        &self,
        performer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        duration_minutes: u32,
    ) -> BookingResult<Vec<AvailableSlot>> {
        if duration_minutes == 0 || to <= from {
            return Err(BookingError::Validation("invalid_range"));
        }
        let performer = self
            .db
            .get_performer(performer_id)?
            .ok_or(BookingError::NotFound("performer_not_found"))?;
        if !performer.is_bookable() {
            return Ok(Vec::new());
        }

        let tz = performer_tz(&performer)?;
        let duration = Duration::minutes(i64::from(duration_minutes));
        let before = performer.buffer_before();
        let after = performer.buffer_after();
        let earliest = self.clock.now() + before;
        let price = price_for(performer.base_price_cents, duration_minutes);

        let first_day = from.with_timezone(&tz).date_naive();
        let last_day = to.with_timezone(&tz).date_naive();
        let slots = self.db.slots_for_dates(performer_id, first_day, last_day)?;
        // Widen the lookup so bookings whose buffers reach into the range count.
        let bookings = self
            .db
            .claiming_bookings(performer_id, from - after, to + duration + before)?;

        let source = self.source_for(&performer);
        let mut out = Vec::new();

        for date in first_day.iter_days().take_while(|d| *d <= last_day) {
            let day_slots: Vec<AvailabilitySlot> =
                slots.iter().filter(|s| s.date == date).cloned().collect();

            for window in source.windows(date, &day_slots) {
                let (Some(window_start), Some(window_end)) = (
                    local_to_utc(&tz, date, window.start),
                    local_to_utc(&tz, date, window.end),
                ) else {
                    continue;
                };

                let mut start = window_start;
                while start + duration <= window_end {
                    let end = start + duration;
                    let in_range = start >= from && start < to;
                    let free = !bookings
                        .iter()
                        .any(|b| overlaps_buffered(start, end, b, before, after));

                    if in_range && start >= earliest && free {
                        let local = start.with_timezone(&tz);
                        out.push(AvailableSlot {
                            start_time_utc: start,
                            end_time_utc: end,
                            local_date: local.date_naive(),
                            local_start_time: local.time(),
                            duration_minutes,
                            price_cents: price,
                            currency: performer.currency.clone(),
                            slot_id: window.slot_id,
                        });
                    }
                    start += self.policy.slot_cadence;
                }
            }
        }

        out.sort_by_key(|s| s.start_time_utc);
        out.dedup_by_key(|s| s.start_time_utc);
        Ok(out)
    }

    // -- Explicit availability --

    pub fn add_availability(
        &self,
        performer_id: Uuid,
        slot: NewAvailability,
    ) -> BookingResult<AvailabilitySlot> {
        let mut added = self.bulk_add_availability(performer_id, vec![slot])?;
        added
            .pop()
            .ok_or_else(|| BookingError::Internal(anyhow::anyhow!("slot insert returned nothing")))
    }

    /// All-or-nothing insert of several slots.
    pub fn bulk_add_availability(
        &self,
        performer_id: Uuid,
        slots: Vec<NewAvailability>,
    ) -> BookingResult<Vec<AvailabilitySlot>> {
        if slots.is_empty() {
            return Err(BookingError::Validation("empty_batch"));
        }
        let performer = self
            .db
            .get_performer(performer_id)?
            .ok_or(BookingError::NotFound("performer_not_found"))?;

        let now = self.clock.now();
        let rows: Vec<AvailabilitySlot> = slots
            .into_iter()
            .map(|s| AvailabilitySlot {
                id: Uuid::new_v4(),
                performer_id,
                date: s.date,
                start_time: s.start_time,
                end_time: s.end_time,
                timezone: performer.timezone.clone(),
                is_available: s.is_available,
                is_booked: false,
                booking_id: None,
                version: 1,
                created_at: now,
                updated_at: now,
            })
            .collect();

        match self.db.insert_slots(&rows)? {
            SlotWrite::Applied => {
                info!("Added {} availability slot(s) for performer {}", rows.len(), performer_id);
                Ok(rows)
            }
            other => Err(slot_write_error(other)),
        }
    }

    pub fn update_availability(
        &self,
        slot_id: Uuid,
        patch: AvailabilityPatch,
    ) -> BookingResult<AvailabilitySlot> {
        let patch = SlotPatch {
            start_time: patch.start_time,
            end_time: patch.end_time,
            is_available: patch.is_available,
        };
        match self.db.update_slot(slot_id, &patch, self.clock.now())? {
            SlotWrite::Applied => self
                .db
                .get_slot(slot_id)?
                .ok_or(BookingError::NotFound("slot_not_found")),
            other => Err(slot_write_error(other)),
        }
    }

    pub fn delete_availability(&self, slot_id: Uuid) -> BookingResult<()> {
        match self.db.delete_slot(slot_id)? {
            SlotWrite::Applied => Ok(()),
            other => Err(slot_write_error(other)),
        }
    }

    /// Reserve an explicit slot for a booking. Loses cleanly to a concurrent
    /// reservation.
    pub fn book_availability(&self, slot_id: Uuid, booking_id: Uuid) -> BookingResult<()> {
        if self.db.book_slot(slot_id, booking_id, self.clock.now())? {
            return Ok(());
        }
        match self.db.get_slot(slot_id)? {
            None => Err(BookingError::NotFound("slot_not_found")),
            Some(_) => Err(BookingError::Conflict("slot_already_booked")),
        }
    }

    pub fn release_availability(&self, slot_id: Uuid) -> BookingResult<()> {
        if self.db.release_slot(slot_id, self.clock.now())? {
            return Ok(());
        }
        match self.db.get_slot(slot_id)? {
            None => Err(BookingError::NotFound("slot_not_found")),
            Some(_) => Err(BookingError::StateViolation("slot_not_booked")),
        }
    }
}

fn local_to_utc(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    // Nonexistent local times (DST gaps) yield no window.
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn slot_write_error(outcome: SlotWrite) -> BookingError {
    match outcome {
        SlotWrite::Overlaps { .. } => BookingError::Conflict("availability_overlap"),
        SlotWrite::Booked => BookingError::Conflict("slot_booked"),
        SlotWrite::InvalidRange => BookingError::Validation("invalid_time_range"),
        SlotWrite::NotFound => BookingError::NotFound("slot_not_found"),
        SlotWrite::Applied => BookingError::Internal(anyhow::anyhow!("applied write reported as error")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use callbook_types::{BookingStatus, CallType, PerformerStatus};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn performer(mode: AvailabilityMode, tz: &str) -> Performer {
        Performer {
            id: Uuid::new_v4(),
            user_id: None,
            display_name: "Luna".into(),
            base_price_cents: 10_000,
            currency: "USD".into(),
            allowed_call_types: vec![CallType::Video],
            max_call_duration: 120,
            buffer_time_before: 10,
            buffer_time_after: 10,
            timezone: tz.into(),
            status: PerformerStatus::Active,
            is_available: true,
            availability_mode: mode,
            created_at: at(2026, 1, 1, 0, 0),
            updated_at: at(2026, 1, 1, 0, 0),
        }
    }

    fn engine(now: DateTime<Utc>) -> (AvailabilityEngine, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(now));
        (
            AvailabilityEngine::new(db.clone(), clock, BookingPolicy::default()),
            db,
        )
    }

    fn confirmed(p: &Performer, start: DateTime<Utc>, minutes: u32) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            user_id: "other".into(),
            performer_id: p.id,
            slot_id: None,
            call_type: CallType::Video,
            duration_minutes: minutes,
            start_time_utc: start,
            end_time_utc: start + Duration::minutes(i64::from(minutes)),
            price_cents: 10_000,
            currency: "USD".into(),
            status: BookingStatus::Confirmed,
            hold_expires_at: None,
            rules_confirmed_at: None,
            cancel_reason: None,
            cancelled_by: None,
            version: 1,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn pricing_rounds_half_hours() {
        assert_eq!(price_for(10_000, 30), 10_000);
        assert_eq!(price_for(10_000, 60), 20_000);
        assert_eq!(price_for(10_000, 45), 15_000);
        assert_eq!(price_for(999, 20), 666);
    }

    #[test]
    fn default_window_yields_half_hour_cadence() {
        let (engine, db) = engine(at(2026, 10, 19, 0, 0));
        let p = performer(AvailabilityMode::WorkingHours, "UTC");
        db.upsert_performer(&p).unwrap();

        let slots = engine
            .get_available_slots(p.id, at(2026, 10, 20, 0, 0), at(2026, 10, 21, 0, 0), 30)
            .unwrap();
        // 10:00 .. 21:30 inclusive
        assert_eq!(slots.len(), 24);
        assert_eq!(slots[0].start_time_utc, at(2026, 10, 20, 10, 0));
        assert_eq!(slots.last().unwrap().end_time_utc, at(2026, 10, 20, 22, 0));
        assert!(slots.iter().all(|s| s.price_cents == 10_000));
    }

    #[test]
    fn buffered_bookings_are_excluded() {
        let (engine, db) = engine(at(2026, 10, 19, 0, 0));
        let p = performer(AvailabilityMode::WorkingHours, "UTC");
        db.upsert_performer(&p).unwrap();
        let b = confirmed(&p, at(2026, 10, 20, 12, 0), 30);
        db.insert_booking(&b, "test").unwrap();

        let slots = engine
            .get_available_slots(p.id, at(2026, 10, 20, 0, 0), at(2026, 10, 21, 0, 0), 30)
            .unwrap();
        let starts: Vec<_> = slots.iter().map(|s| s.start_time_utc).collect();
        // 11:30-12:00 ends inside the 10 min lead buffer, 12:30 starts inside the tail.
        assert!(!starts.contains(&at(2026, 10, 20, 11, 30)));
        assert!(!starts.contains(&at(2026, 10, 20, 12, 0)));
        assert!(!starts.contains(&at(2026, 10, 20, 12, 30)));
        assert!(starts.contains(&at(2026, 10, 20, 11, 0)));
        assert!(starts.contains(&at(2026, 10, 20, 13, 0)));
        for s in &slots {
            assert!(!overlaps_buffered(
                s.start_time_utc,
                s.end_time_utc,
                &b,
                p.buffer_before(),
                p.buffer_after()
            ));
        }
    }

    #[test]
    fn past_and_lead_buffer_starts_are_skipped() {
        let (engine, db) = engine(at(2026, 10, 20, 11, 55));
        let p = performer(AvailabilityMode::WorkingHours, "UTC");
        db.upsert_performer(&p).unwrap();

        let slots = engine
            .get_available_slots(p.id, at(2026, 10, 20, 0, 0), at(2026, 10, 21, 0, 0), 30)
            .unwrap();
        // now + 10 min buffer = 12:05, so 12:30 is the first start.
        assert_eq!(slots[0].start_time_utc, at(2026, 10, 20, 12, 30));
    }

    #[test]
    fn windows_follow_performer_timezone() {
        let (engine, db) = engine(at(2026, 10, 1, 0, 0));
        let p = performer(AvailabilityMode::WorkingHours, "America/Bogota");
        db.upsert_performer(&p).unwrap();

        let slots = engine
            .get_available_slots(p.id, at(2026, 10, 20, 15, 0), at(2026, 10, 20, 16, 0), 30)
            .unwrap();
        // Bogota is UTC-5, so 10:00 local is 15:00 UTC.
        assert_eq!(slots[0].start_time_utc, at(2026, 10, 20, 15, 0));
        assert_eq!(slots[0].local_start_time, hm(10, 0));
    }

    #[test]
    fn explicit_mode_uses_rows_only() {
        let (engine, db) = engine(at(2026, 10, 1, 0, 0));
        let p = performer(AvailabilityMode::ExplicitSlots, "UTC");
        db.upsert_performer(&p).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        let added = engine
            .add_availability(
                p.id,
                NewAvailability {
                    date,
                    start_time: hm(14, 0),
                    end_time: hm(15, 0),
                    is_available: true,
                },
            )
            .unwrap();

        let slots = engine
            .get_available_slots(p.id, at(2026, 10, 20, 0, 0), at(2026, 10, 22, 0, 0), 30)
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| s.slot_id == Some(added.id)));

        engine.book_availability(added.id, Uuid::new_v4()).unwrap();
        let slots = engine
            .get_available_slots(p.id, at(2026, 10, 20, 0, 0), at(2026, 10, 22, 0, 0), 30)
            .unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn override_day_replaces_default_window() {
        let (engine, db) = engine(at(2026, 10, 1, 0, 0));
        let p = performer(AvailabilityMode::WorkingHours, "UTC");
        db.upsert_performer(&p).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        engine
            .add_availability(
                p.id,
                NewAvailability {
                    date,
                    start_time: hm(0, 0),
                    end_time: hm(23, 59),
                    is_available: false,
                },
            )
            .unwrap();

        let slots = engine
            .get_available_slots(p.id, at(2026, 10, 20, 0, 0), at(2026, 10, 22, 0, 0), 30)
            .unwrap();
        assert!(slots.iter().all(|s| s.local_date != date));
        assert_eq!(slots.len(), 24);
    }

    #[test]
    fn inactive_performer_has_no_slots() {
        let (engine, db) = engine(at(2026, 10, 1, 0, 0));
        let mut p = performer(AvailabilityMode::WorkingHours, "UTC");
        p.status = PerformerStatus::Inactive;
        db.upsert_performer(&p).unwrap();
        let slots = engine
            .get_available_slots(p.id, at(2026, 10, 20, 0, 0), at(2026, 10, 21, 0, 0), 30)
            .unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn crud_rejects_overlap_and_guards_booked_rows() {
        let (engine, db) = engine(at(2026, 10, 1, 0, 0));
        let p = performer(AvailabilityMode::ExplicitSlots, "UTC");
        db.upsert_performer(&p).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        let slot = |s, e| NewAvailability {
            date,
            start_time: s,
            end_time: e,
            is_available: true,
        };

        let first = engine.add_availability(p.id, slot(hm(10, 0), hm(11, 0))).unwrap();
        let err = engine.add_availability(p.id, slot(hm(10, 30), hm(11, 30))).unwrap_err();
        assert_eq!(err.code(), "availability_overlap");
        // Touching is fine under half-open intervals.
        engine.add_availability(p.id, slot(hm(11, 0), hm(12, 0))).unwrap();

        let err = engine
            .bulk_add_availability(p.id, vec![slot(hm(13, 0), hm(14, 0)), slot(hm(13, 30), hm(15, 0))])
            .unwrap_err();
        assert_eq!(err.code(), "availability_overlap");
        assert_eq!(db.slots_for_dates(p.id, date, date).unwrap().len(), 2);

        let booking_id = Uuid::new_v4();
        engine.book_availability(first.id, booking_id).unwrap();
        assert_eq!(
            engine.book_availability(first.id, Uuid::new_v4()).unwrap_err().code(),
            "slot_already_booked"
        );
        assert_eq!(engine.delete_availability(first.id).unwrap_err().code(), "slot_booked");

        engine.release_availability(first.id).unwrap();
        assert_eq!(
            engine.release_availability(first.id).unwrap_err().code(),
            "slot_not_booked"
        );
        engine.delete_availability(first.id).unwrap();
    }

    #[test]
    fn slot_cover_uses_the_performer_zone() {
        let (engine, db) = engine(at(2026, 10, 1, 0, 0));
        let p = performer(AvailabilityMode::ExplicitSlots, "America/New_York");
        db.upsert_performer(&p).unwrap();
        let slot = engine
            .add_availability(
                p.id,
                NewAvailability {
                    date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
                    start_time: hm(12, 0),
                    end_time: hm(13, 0),
                    is_available: true,
                },
            )
            .unwrap();

        // 12:00 EDT is 16:00 UTC.
        let start = at(2026, 10, 20, 16, 0);
        assert!(slot_covers(&p, &slot, start, start + Duration::minutes(60)).unwrap());
        assert!(!slot_covers(&p, &slot, start, start + Duration::minutes(61)).unwrap());
        let utc_noon = at(2026, 10, 20, 12, 0);
        assert!(!slot_covers(&p, &slot, utc_noon, utc_noon + Duration::minutes(30)).unwrap());
    }
}
