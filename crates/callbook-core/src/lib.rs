//! Booking and call-session orchestration.
//!
//! [`Services`] wires the components together over one store, one clock and
//! one set of external providers. The HTTP layer and the binary only talk to
//! the components through it.

pub mod availability;
pub mod clock;
pub mod eligibility;
pub mod error;
pub mod lifecycle;
pub mod notifications;
pub mod policy;
pub mod providers;
pub mod sessions;
pub mod signing;
pub mod worker;

use std::sync::Arc;

use callbook_db::Database;

pub use availability::AvailabilityEngine;
pub use clock::{Clock, ManualClock, SystemClock};
pub use eligibility::EligibilityGate;
pub use error::{BookingError, BookingResult, ErrorKind};
pub use lifecycle::{BookingLifecycle, ExpirySweep, PaymentOutcome};
pub use notifications::{DeliveryReport, NotificationScheduler};
pub use policy::{BookingPolicy, WorkerConfig};
pub use sessions::SessionManager;
pub use worker::{SweepReport, Worker};

use providers::{NotificationChannel, PaymentGateways, RoomProvider};

/// The external collaborators the core calls out to.
pub struct Providers {
    pub payments: PaymentGateways,
    pub rooms: Arc<dyn RoomProvider>,
    pub channel: Arc<dyn NotificationChannel>,
}

pub struct Services {
    pub db: Arc<Database>,
    pub clock: Arc<dyn Clock>,
    pub policy: BookingPolicy,
    pub eligibility: Arc<EligibilityGate>,
    pub availability: Arc<AvailabilityEngine>,
    pub sessions: Arc<SessionManager>,
    pub notifications: Arc<NotificationScheduler>,
    pub bookings: Arc<BookingLifecycle>,
}

impl Services {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
        providers: Providers,
    ) -> Self {
        let eligibility = Arc::new(EligibilityGate::new(db.clone(), clock.clone()));
        let availability = Arc::new(AvailabilityEngine::new(
            db.clone(),
            clock.clone(),
            policy.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            db.clone(),
            clock.clone(),
            policy.clone(),
            providers.rooms,
        ));
        let notifications = Arc::new(NotificationScheduler::new(
            db.clone(),
            clock.clone(),
            policy.clone(),
            providers.channel,
        ));
        let bookings = Arc::new(BookingLifecycle::new(
            db.clone(),
            clock.clone(),
            policy.clone(),
            availability.clone(),
            sessions.clone(),
            notifications.clone(),
            providers.payments,
        ));

        Self {
            db,
            clock,
            policy,
            eligibility,
            availability,
            sessions,
            notifications,
            bookings,
        }
    }

    pub fn worker(&self, config: WorkerConfig) -> Worker {
        Worker::new(self.bookings.clone(), self.notifications.clone(), config)
    }
}
