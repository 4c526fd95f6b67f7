//! Booking state machine, pricing and the payment handshake.
//!
//! Every write goes through `Database::transition_booking`, which only lands
//! when the row is still in the status (and usually the version) this code
//! read. A caller that loses a race gets a domain error instead of
//! overwriting the winner.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use callbook_db::Database;
use callbook_db::models::{BookingGuard, BookingUpdate, TransitionOutcome};
use callbook_types::api::{CreateBookingRequest, PaymentStatusView};
use callbook_types::{
    Booking, BookingStatus, CallSession, CancelledBy, Payment, PaymentStatus, Performer,
};

use crate::availability::{AvailabilityEngine, price_for, slot_covers};
use crate::clock::Clock;
use crate::error::{BookingError, BookingResult};
use crate::notifications::NotificationScheduler;
use crate::policy::BookingPolicy;
use crate::providers::{CheckoutRequest, PaymentGateways, bounded};
use crate::sessions::SessionManager;

/// Result of a payment completion.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub booking: Booking,
    pub session: Option<CallSession>,
}

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExpirySweep {
    pub holds: usize,
    pub drafts: usize,
    pub awaiting_payment: usize,
    pub payments: usize,
}

pub struct BookingLifecycle {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    availability: Arc<AvailabilityEngine>,
    sessions: Arc<SessionManager>,
    notifications: Arc<NotificationScheduler>,
    gateways: PaymentGateways,
}

impl BookingLifecycle {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
        availability: Arc<AvailabilityEngine>,
        sessions: Arc<SessionManager>,
        notifications: Arc<NotificationScheduler>,
        gateways: PaymentGateways,
    ) -> Self {
        Self {
            db,
            clock,
            policy,
            availability,
            sessions,
            notifications,
            gateways,
        }
    }

    // -- Reads --

    pub fn get_booking(&self, id: Uuid) -> BookingResult<Booking> {
        self.db
            .get_booking(id)?
            .ok_or(BookingError::NotFound("booking_not_found"))
    }

    /// A booking as seen by `user_id`. Someone else's booking reads as missing.
    pub fn get_booking_for(&self, user_id: &str, id: Uuid) -> BookingResult<Booking> {
        let booking = self.get_booking(id)?;
        if booking.user_id != user_id {
            return Err(BookingError::NotFound("booking_not_found"));
        }
        Ok(booking)
    }

    pub fn get_user_bookings(&self, user_id: &str) -> BookingResult<Vec<Booking>> {
        Ok(self.db.list_user_bookings(user_id)?)
    }

    pub fn get_performer(&self, id: Uuid) -> BookingResult<Performer> {
        self.db
            .get_performer(id)?
            .ok_or(BookingError::NotFound("performer_not_found"))
    }

    pub fn get_available_performers(&self) -> BookingResult<Vec<Performer>> {
        Ok(self.db.list_available_performers()?)
    }

    pub fn check_payment_status(&self, booking_id: Uuid) -> BookingResult<PaymentStatusView> {
        let booking = self.get_booking(booking_id)?;
        Ok(PaymentStatusView {
            booking_id,
            booking_status: booking.status,
            payment: self.db.latest_payment_for_booking(booking_id)?,
        })
    }

    // -- User-driven transitions --

    pub fn create_booking(
        &self,
        user_id: &str,
        req: CreateBookingRequest,
    ) -> BookingResult<Booking> {
        let performer = self
            .db
            .get_performer(req.performer_id)?
            .filter(Performer::is_bookable)
            .ok_or(BookingError::NotFound("performer_not_found"))?;

        if !performer.allowed_call_types.contains(&req.call_type) {
            return Err(BookingError::Validation("call_type_not_allowed"));
        }
        if req.duration_minutes == 0 || req.duration_minutes > performer.max_call_duration {
            return Err(BookingError::Validation("invalid_duration"));
        }

        let now = self.clock.now();
        if req.start_time_utc < now + performer.buffer_before() {
            return Err(BookingError::Conflict("slot_not_available"));
        }

        if let Some(slot_id) = req.slot_id {
            let slot = self
                .db
                .get_slot(slot_id)?
                .ok_or(BookingError::NotFound("slot_not_found"))?;
            let end = req.start_time_utc + Duration::minutes(i64::from(req.duration_minutes));
            if slot.performer_id != performer.id
                || !slot_covers(&performer, &slot, req.start_time_utc, end)?
            {
                return Err(BookingError::Validation("slot_mismatch"));
            }
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            performer_id: performer.id,
            slot_id: req.slot_id,
            call_type: req.call_type,
            duration_minutes: req.duration_minutes,
            start_time_utc: req.start_time_utc,
            end_time_utc: req.start_time_utc + Duration::minutes(i64::from(req.duration_minutes)),
            price_cents: price_for(performer.base_price_cents, req.duration_minutes),
            currency: performer.currency.clone(),
            status: BookingStatus::Draft,
            hold_expires_at: None,
            rules_confirmed_at: None,
            cancel_reason: None,
            cancelled_by: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let inserted = self.db.insert_booking_if_free(
            &booking,
            performer.buffer_before(),
            performer.buffer_after(),
            "user",
        )?;
        if !inserted {
            return Err(BookingError::Conflict("slot_not_available"));
        }

        if let Some(slot_id) = booking.slot_id {
            if let Err(e) = self.availability.book_availability(slot_id, booking.id) {
                warn!("Slot {} for booking {} lost: {}", slot_id, booking.id, e);
                let mut update = BookingUpdate::to(BookingStatus::Cancelled);
                update.cancel_reason = Some("slot_conflict".to_string());
                update.cancelled_by = Some(CancelledBy::System);
                self.db.transition_booking(
                    &BookingGuard::status(booking.id, vec![BookingStatus::Draft]),
                    &update,
                    now,
                    "system",
                )?;
                return Err(BookingError::Conflict("slot_not_available"));
            }
        }

        info!(
            "Booking {} drafted: user {} with performer {} at {}",
            booking.id, user_id, performer.id, booking.start_time_utc
        );
        Ok(booking)
    }

    /// `draft|held → held`, setting or extending the hold.
    pub fn hold_booking(&self, id: Uuid, hold_minutes: Option<u32>) -> BookingResult<Booking> {
        let minutes = hold_minutes.unwrap_or(self.policy.hold_minutes);
        if minutes == 0 {
            return Err(BookingError::Validation("invalid_hold_minutes"));
        }
        let booking = self.get_booking(id)?;
        let now = self.clock.now();
        self.ensure_hold_alive(&booking)?;

        let mut update = BookingUpdate::to(BookingStatus::Held);
        update.hold_expires_at = Some(now + Duration::minutes(i64::from(minutes)));
        self.apply(&booking, update, "user")?;
        self.get_booking(id)
    }

    /// `held → awaiting_payment`.
    pub fn confirm_rules(&self, id: Uuid) -> BookingResult<Booking> {
        let booking = self.get_booking(id)?;
        self.ensure_hold_alive(&booking)?;

        let mut update = BookingUpdate::to(BookingStatus::AwaitingPayment);
        update.rules_confirmed_at = Some(self.clock.now());
        self.apply(&booking, update, "user")?;
        self.get_booking(id)
    }

    /// Payment link for an `awaiting_payment` booking. A live pending link of
    /// the same provider is handed back as is; links of other providers are
    /// superseded. The hold is stretched to cover the link.
    pub async fn create_payment_link(
        &self,
        id: Uuid,
        provider: &str,
        expires_minutes: Option<u32>,
    ) -> BookingResult<Payment> {
        let gateway = self
            .gateways
            .get(provider)
            .ok_or(BookingError::Validation("unknown_payment_provider"))?;
        let minutes = expires_minutes.unwrap_or(self.policy.payment_link_minutes);
        if minutes == 0 {
            return Err(BookingError::Validation("invalid_expiry"));
        }

        let booking = self.get_booking(id)?;
        if booking.status != BookingStatus::AwaitingPayment {
            return Err(state_error(booking.status));
        }
        let now = self.clock.now();

        if let Some(existing) = self
            .db
            .pending_payments_for_booking(id)?
            .into_iter()
            .find(|p| p.provider == provider && p.is_live(now))
        {
            return Ok(existing);
        }
        self.ensure_hold_alive(&booking)?;

        let superseded = self.db.expire_pending_payments(id, None, now)?;
        if superseded > 0 {
            info!("Superseded {} pending payment(s) of booking {}", superseded, id);
        }

        let expires_at = now + Duration::minutes(i64::from(minutes));
        let request = CheckoutRequest {
            payment_id: Uuid::new_v4(),
            booking_id: id,
            amount_cents: booking.price_cents,
            currency: booking.currency.clone(),
            expires_at,
        };
        let link = bounded(
            self.policy.external_timeout,
            "payment_provider_failed",
            gateway.create_link(&request),
        )
        .await?;

        let payment = Payment {
            id: request.payment_id,
            booking_id: id,
            provider: provider.to_string(),
            amount_cents: booking.price_cents,
            currency: booking.currency.clone(),
            status: PaymentStatus::Pending,
            payment_link: link.url,
            expires_at,
            paid_at: None,
            provider_payment_id: link.provider_payment_id,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_payment(&payment)?;

        let mut update = BookingUpdate::to(BookingStatus::AwaitingPayment);
        update.hold_expires_at = Some(
            booking
                .hold_expires_at
                .map_or(expires_at, |hold| hold.max(expires_at)),
        );
        let outcome = self.db.transition_booking(
            &BookingGuard::status(id, vec![BookingStatus::AwaitingPayment]),
            &update,
            now,
            "user",
        )?;
        if let Err(e) = outcome_to_result(outcome) {
            // The booking moved on while the link was minted; the link must not be payable.
            self.db.transition_payment(payment.id, PaymentStatus::Expired, None, None, now)?;
            return Err(e);
        }

        info!(
            "Payment {} ({}) created for booking {}, expires {}",
            payment.id, provider, id, expires_at
        );
        Ok(payment)
    }

    /// Cancel from any non-terminal status. Pending notifications are
    /// cancelled, the session destroyed, the explicit slot released.
    pub async fn cancel_booking(
        &self,
        id: Uuid,
        reason: &str,
        cancelled_by: CancelledBy,
    ) -> BookingResult<Booking> {
        if reason.trim().is_empty() {
            return Err(BookingError::Validation("reason_required"));
        }
        let booking = self.get_booking(id)?;

        let mut update = BookingUpdate::to(BookingStatus::Cancelled);
        update.cancel_reason = Some(reason.to_string());
        update.cancelled_by = Some(cancelled_by);
        self.apply(&booking, update, cancelled_by.as_str())?;
        info!("Booking {} cancelled by {}: {}", id, cancelled_by, reason);

        self.release_resources(&booking).await;
        self.get_booking(id)
    }

    // -- Payment webhook --

    /// Apply a `paid` webhook. Each step is idempotent, so a redelivery after
    /// a partial failure finishes the remaining steps without repeating any.
    pub async fn handle_payment_complete(
        &self,
        payment_id: Uuid,
        provider_payment_id: Option<&str>,
    ) -> BookingResult<PaymentOutcome> {
        let payment = self
            .db
            .get_payment(payment_id)?
            .ok_or(BookingError::NotFound("payment_not_found"))?;
        let now = self.clock.now();

        match payment.status {
            PaymentStatus::Paid => {}
            PaymentStatus::Pending | PaymentStatus::Expired => {
                let moved = self.db.transition_payment(
                    payment_id,
                    PaymentStatus::Paid,
                    Some(now),
                    provider_payment_id,
                    now,
                )?;
                if moved {
                    info!("Payment {} marked paid", payment_id);
                } else {
                    let current = self
                        .db
                        .get_payment(payment_id)?
                        .ok_or(BookingError::NotFound("payment_not_found"))?;
                    if current.status != PaymentStatus::Paid {
                        return Err(BookingError::StateViolation("payment_not_payable"));
                    }
                }
            }
            PaymentStatus::Failed => {
                return Err(BookingError::StateViolation("payment_not_payable"));
            }
        }

        let booking = self.get_booking(payment.booking_id)?;
        match booking.status {
            BookingStatus::AwaitingPayment => self.confirm_paid(&booking).await,
            BookingStatus::Confirmed => {
                if let Some(first) = self.db.first_paid_payment(booking.id)? {
                    if first.id != payment_id {
                        warn!(
                            "Payment {} is paid but booking {} was already paid by {}; needs a refund",
                            payment_id, booking.id, first.id
                        );
                    }
                }
                self.finish_confirmation(booking).await
            }
            BookingStatus::Completed | BookingStatus::NoShow => Ok(PaymentOutcome {
                session: self.db.get_session_by_booking(booking.id)?,
                booking,
            }),
            BookingStatus::Draft
            | BookingStatus::Held
            | BookingStatus::Cancelled
            | BookingStatus::Expired => {
                warn!(
                    "Payment {} is paid but booking {} is {}; needs a refund",
                    payment_id, booking.id, booking.status
                );
                Err(BookingError::StateViolation("booking_not_confirmable"))
            }
        }
    }

    /// Apply a `failed` webhook. The booking stays `awaiting_payment` so the
    /// user can retry with a fresh link.
    pub fn handle_payment_failed(
        &self,
        payment_id: Uuid,
        provider_payment_id: Option<&str>,
    ) -> BookingResult<Payment> {
        let now = self.clock.now();
        if self
            .db
            .transition_payment(payment_id, PaymentStatus::Failed, None, provider_payment_id, now)?
        {
            info!("Payment {} failed", payment_id);
        }
        let payment = self
            .db
            .get_payment(payment_id)?
            .ok_or(BookingError::NotFound("payment_not_found"))?;
        if payment.status == PaymentStatus::Paid {
            return Err(BookingError::StateViolation("payment_already_paid"));
        }
        Ok(payment)
    }

    async fn confirm_paid(&self, booking: &Booking) -> BookingResult<PaymentOutcome> {
        let performer = self.get_performer(booking.performer_id)?;
        let now = self.clock.now();

        let conflicts = self.db.confirmed_conflicts(
            booking,
            performer.buffer_before(),
            performer.buffer_after(),
        )?;
        if let Some(winner) = conflicts.first() {
            warn!(
                "Booking {} lost its slot to confirmed booking {}",
                booking.id, winner.id
            );
            let mut update = BookingUpdate::to(BookingStatus::Cancelled);
            update.cancel_reason = Some("slot_conflict".to_string());
            update.cancelled_by = Some(CancelledBy::System);
            self.db.transition_booking(
                &BookingGuard::status(booking.id, vec![BookingStatus::AwaitingPayment]),
                &update,
                now,
                "system",
            )?;
            self.release_resources(booking).await;
            return Err(BookingError::Conflict("slot_conflict"));
        }

        let outcome = self.db.transition_booking(
            &BookingGuard::status(booking.id, vec![BookingStatus::AwaitingPayment]),
            &BookingUpdate::to(BookingStatus::Confirmed),
            now,
            "payment",
        )?;
        match outcome {
            TransitionOutcome::Applied { .. } => {
                info!("Booking {} confirmed", booking.id);
            }
            // A concurrent delivery got there first.
            TransitionOutcome::WrongStatus(BookingStatus::Confirmed) => {}
            TransitionOutcome::WrongStatus(_) => {
                return Err(BookingError::StateViolation("booking_not_confirmable"));
            }
            other => outcome_to_result(other).map(|_| ())?,
        }

        let booking = self.get_booking(booking.id)?;
        self.finish_confirmation(booking).await
    }

    /// Session and reminders for a confirmed booking. Both steps are no-ops
    /// when already done.
    async fn finish_confirmation(&self, booking: Booking) -> BookingResult<PaymentOutcome> {
        let performer = self.get_performer(booking.performer_id)?;
        let session = self.sessions.create(booking.id).await?;
        self.notifications
            .schedule_booking_reminders(&booking, &performer)?;
        Ok(PaymentOutcome {
            booking,
            session: Some(session),
        })
    }

    // -- Calls --

    /// End the live call of a booking and complete the booking.
    pub fn end_call(&self, booking_id: Uuid) -> BookingResult<(Booking, CallSession)> {
        let session = self.sessions.get(booking_id)?;
        let session = self.sessions.end(session.id)?;
        let booking = self.complete_booking(booking_id)?;
        Ok((booking, session))
    }

    fn complete_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let outcome = self.db.transition_booking(
            &BookingGuard::status(booking_id, vec![BookingStatus::Confirmed]),
            &BookingUpdate::to(BookingStatus::Completed),
            self.clock.now(),
            "system",
        )?;
        match outcome {
            TransitionOutcome::Applied { .. } => info!("Booking {} completed", booking_id),
            TransitionOutcome::WrongStatus(BookingStatus::Completed) => {}
            other => outcome_to_result(other).map(|_| ())?,
        }
        self.get_booking(booking_id)
    }

    // -- Sweeps --

    /// Expire lapsed payments, holds, stale drafts and awaiting-payment
    /// bookings whose hold ran out with no live payment. Each booking is
    /// handled on its own; one failure does not stop the sweep.
    pub fn expire_held_bookings(&self) -> BookingResult<ExpirySweep> {
        let now = self.clock.now();
        let mut sweep = ExpirySweep {
            payments: self.db.expire_overdue_payments(now)?,
            ..ExpirySweep::default()
        };

        for b in self.db.find_expired_holds(now)? {
            if self.expire_one(&b) {
                sweep.holds += 1;
            }
        }
        for b in self.db.find_stale_drafts(now - self.policy.draft_ttl)? {
            if self.expire_one(&b) {
                sweep.drafts += 1;
            }
        }
        for b in self.db.find_lapsed_awaiting_payment(now)? {
            if self.expire_one(&b) {
                sweep.awaiting_payment += 1;
            }
        }

        if sweep != ExpirySweep::default() {
            info!(
                "Expiry sweep: {} hold(s), {} draft(s), {} awaiting payment, {} payment(s)",
                sweep.holds, sweep.drafts, sweep.awaiting_payment, sweep.payments
            );
        }
        Ok(sweep)
    }

    fn expire_one(&self, booking: &Booking) -> bool {
        let result = self.db.transition_booking(
            &BookingGuard::versioned(booking.id, booking.status, booking.version),
            &BookingUpdate::to(BookingStatus::Expired),
            self.clock.now(),
            "worker",
        );
        match result {
            Ok(TransitionOutcome::Applied { .. }) => {
                if let Some(slot_id) = booking.slot_id {
                    if let Err(e) = self.availability.release_availability(slot_id) {
                        warn!("Releasing slot {} of booking {} failed: {}", slot_id, booking.id, e);
                    }
                }
                true
            }
            // Moved on since the scan (re-held, paid, cancelled).
            Ok(_) => false,
            Err(e) => {
                warn!("Expiring booking {} failed: {}", booking.id, e);
                false
            }
        }
    }

    /// End every overdue live session and complete its booking.
    pub fn auto_end_overdue_calls(&self) -> BookingResult<usize> {
        let mut ended = 0;
        for session in self.sessions.get_overdue_sessions()? {
            let result = self
                .sessions
                .end(session.id)
                .and_then(|_| self.complete_booking(session.booking_id));
            match result {
                Ok(_) => ended += 1,
                Err(e) => warn!("Auto-ending session {} failed: {}", session.id, e),
            }
        }
        if ended > 0 {
            info!("Auto-ended {} overdue call(s)", ended);
        }
        Ok(ended)
    }

    /// Mark confirmed bookings whose call never went live within `grace`
    /// of the start as `no_show`.
    pub async fn check_no_shows(&self, grace: Option<Duration>) -> BookingResult<usize> {
        let grace = grace.unwrap_or(self.policy.no_show_grace);
        let now = self.clock.now();
        let mut marked = 0;

        for booking in self.db.find_no_show_candidates(now - grace)? {
            let outcome = self.db.transition_booking(
                &BookingGuard::versioned(booking.id, BookingStatus::Confirmed, booking.version)
                    .without_started_session(),
                &BookingUpdate::to(BookingStatus::NoShow),
                now,
                "worker",
            );
            match outcome {
                Ok(TransitionOutcome::Applied { .. }) => {
                    info!("Booking {} marked no-show", booking.id);
                    marked += 1;
                    self.release_resources(&booking).await;
                }
                Ok(_) => {}
                Err(e) => warn!("No-show check for booking {} failed: {}", booking.id, e),
            }
        }
        Ok(marked)
    }

    // -- Helpers --

    /// Guarded write from the status and version this caller read.
    fn apply(&self, booking: &Booking, update: BookingUpdate, actor: &str) -> BookingResult<i64> {
        if !booking.status.can_transition_to(update.to) {
            return Err(state_error(booking.status));
        }
        let outcome = self.db.transition_booking(
            &BookingGuard::versioned(booking.id, booking.status, booking.version),
            &update,
            self.clock.now(),
            actor,
        )?;
        let version = outcome_to_result(outcome)?;
        info!(
            "Booking {}: {} -> {} (v{})",
            booking.id, booking.status, update.to, version
        );
        Ok(version)
    }

    /// A hold that ran out reads as a lost slot even before the sweep runs.
    fn ensure_hold_alive(&self, booking: &Booking) -> BookingResult<()> {
        let holding = matches!(
            booking.status,
            BookingStatus::Held | BookingStatus::AwaitingPayment
        );
        let lapsed = holding
            && booking
                .hold_expires_at
                .is_some_and(|exp| exp < self.clock.now());
        if booking.status == BookingStatus::Expired || lapsed {
            return Err(BookingError::Expiry("slot_not_available"));
        }
        Ok(())
    }

    /// Best-effort cleanup after a booking leaves the calendar: pending
    /// notifications, pending payments, the session, the explicit slot.
    async fn release_resources(&self, booking: &Booking) {
        let now = self.clock.now();
        if let Err(e) = self.notifications.cancel_by_booking(booking.id) {
            warn!("Cancelling notifications of booking {} failed: {}", booking.id, e);
        }
        if let Err(e) = self.db.expire_pending_payments(booking.id, None, now) {
            warn!("Expiring payments of booking {} failed: {}", booking.id, e);
        }
        match self.db.get_session_by_booking(booking.id) {
            Ok(Some(session)) => {
                if let Err(e) = self.sessions.destroy(session.id).await {
                    warn!("Destroying session {} failed: {}", session.id, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Loading session of booking {} failed: {}", booking.id, e),
        }
        if let Some(slot_id) = booking.slot_id {
            match self.availability.release_availability(slot_id) {
                Ok(()) | Err(BookingError::StateViolation(_)) => {}
                Err(e) => warn!("Releasing slot {} failed: {}", slot_id, e),
            }
        }
    }
}

fn state_error(status: BookingStatus) -> BookingError {
    match status {
        BookingStatus::Expired => BookingError::Expiry("slot_not_available"),
        _ => BookingError::StateViolation("invalid_booking_state"),
    }
}

fn outcome_to_result(outcome: TransitionOutcome) -> BookingResult<i64> {
    match outcome {
        TransitionOutcome::Applied { version } => Ok(version),
        TransitionOutcome::WrongStatus(status) => Err(state_error(status)),
        TransitionOutcome::VersionMismatch { .. } => {
            Err(BookingError::Conflict("concurrent_modification"))
        }
        TransitionOutcome::SessionStarted => Err(BookingError::StateViolation("session_live")),
        TransitionOutcome::NotFound => Err(BookingError::NotFound("booking_not_found")),
    }
}
