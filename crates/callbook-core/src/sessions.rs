use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use callbook_db::Database;
use callbook_types::{Booking, BookingStatus, CallSession, SessionStatus};

use crate::clock::Clock;
use crate::error::{BookingError, BookingResult};
use crate::policy::BookingPolicy;
use crate::providers::{RoomProvider, RoomRequest, bounded};
use crate::signing::room_id_for;

/// Meeting session lifecycle, one session per confirmed booking.
pub struct SessionManager {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    rooms: Arc<dyn RoomProvider>,
}

impl SessionManager {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
        rooms: Arc<dyn RoomProvider>,
    ) -> Self {
        Self {
            db,
            clock,
            policy,
            rooms,
        }
    }

    /// Get or create the session of a confirmed booking. Concurrent callers
    /// all end up with the same row.
    pub async fn create(&self, booking_id: Uuid) -> BookingResult<CallSession> {
        let booking = self.load_booking(booking_id)?;
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::StateViolation("booking_not_confirmed"));
        }
        if let Some(existing) = self.db.get_session_by_booking(booking_id)? {
            return Ok(existing);
        }

        let room_id = room_id_for(&booking.id);
        let request = RoomRequest {
            booking_id: booking.id,
            room_id: room_id.clone(),
            user_id: booking.user_id.clone(),
            performer_id: booking.performer_id,
            not_before: booking.start_time_utc - self.policy.early_join,
            expires_at: booking.end_time_utc + Duration::hours(1),
            max_participants: self.policy.max_participants,
        };
        let grant = bounded(
            self.policy.external_timeout,
            "room_provider_failed",
            self.rooms.provision(&request),
        )
        .await?;

        let now = self.clock.now();
        let session = CallSession {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            room_provider: self.rooms.name().to_string(),
            room_id,
            room_name: grant.room_name,
            join_url_user: grant.join_url_user,
            join_url_performer: grant.join_url_performer,
            token_user: grant.token_user,
            token_performer: grant.token_performer,
            max_participants: self.policy.max_participants,
            recording_disabled: true,
            status: SessionStatus::Scheduled,
            started_at: None,
            ended_at: None,
            actual_duration_seconds: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        if self.db.insert_session_if_absent(&session)? {
            info!("Session {} created for booking {}", session.id, booking.id);
        }
        self.get(booking_id)
    }

    /// Session of a booking.
    pub fn get(&self, booking_id: Uuid) -> BookingResult<CallSession> {
        self.db
            .get_session_by_booking(booking_id)?
            .ok_or(BookingError::NotFound("session_not_found"))
    }

    pub fn get_by_id(&self, session_id: Uuid) -> BookingResult<CallSession> {
        self.db
            .get_session(session_id)?
            .ok_or(BookingError::NotFound("session_not_found"))
    }

    /// `scheduled → live`. Allowed from `early_join` before the booked start.
    pub fn start(&self, session_id: Uuid) -> BookingResult<CallSession> {
        let session = self.get_by_id(session_id)?;
        let booking = self.load_booking(session.booking_id)?;
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::StateViolation("booking_not_confirmed"));
        }
        let now = self.clock.now();
        if now < booking.start_time_utc - self.policy.early_join {
            return Err(BookingError::StateViolation("too_early_to_join"));
        }

        if !self.db.start_session(session_id, now)? {
            // The booking may have left `confirmed` since it was read.
            let booking = self.load_booking(session.booking_id)?;
            if booking.status != BookingStatus::Confirmed {
                return Err(BookingError::StateViolation("booking_not_confirmed"));
            }
            return Err(BookingError::StateViolation("session_not_scheduled"));
        }
        info!("Session {} is live", session_id);
        self.get_by_id(session_id)
    }

    /// `live → ended`, recording the measured duration.
    pub fn end(&self, session_id: Uuid) -> BookingResult<CallSession> {
        let session = self.get_by_id(session_id)?;
        let (SessionStatus::Live, Some(started_at)) = (session.status, session.started_at) else {
            return Err(BookingError::StateViolation("session_not_live"));
        };
        let now = self.clock.now();
        let seconds = (now - started_at).num_seconds().max(0);

        if !self.db.end_session(session_id, now, seconds)? {
            return Err(BookingError::StateViolation("session_not_live"));
        }
        info!("Session {} ended after {}s", session_id, seconds);
        self.get_by_id(session_id)
    }

    /// Any non-terminal status `→ destroyed`. Returns false when the session
    /// was already destroyed. The room teardown is best-effort.
    pub async fn destroy(&self, session_id: Uuid) -> BookingResult<bool> {
        let session = self.get_by_id(session_id)?;
        if !self.db.destroy_session(session_id, self.clock.now())? {
            return Ok(false);
        }
        info!("Session {} destroyed", session_id);

        if let Err(e) = bounded(
            self.policy.external_timeout,
            "room_provider_failed",
            self.rooms.teardown(&session.room_id),
        )
        .await
        {
            warn!("Room teardown for session {} failed: {}", session_id, e);
        }
        Ok(true)
    }

    /// Live sessions whose booking should already have ended.
    pub fn get_overdue_sessions(&self) -> BookingResult<Vec<CallSession>> {
        Ok(self.db.overdue_sessions(self.clock.now())?)
    }

    /// Scheduled sessions of confirmed bookings starting within the next
    /// `minutes_ahead`, including ones that started a little while ago.
    pub fn get_upcoming_sessions(&self, minutes_ahead: u32) -> BookingResult<Vec<CallSession>> {
        let now = self.clock.now();
        Ok(self.db.sessions_starting_between(
            now - self.policy.upcoming_tolerance,
            now + Duration::minutes(i64::from(minutes_ahead)),
        )?)
    }

    fn load_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.db
            .get_booking(booking_id)?
            .ok_or(BookingError::NotFound("booking_not_found"))
    }
}
