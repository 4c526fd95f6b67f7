#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::future::BoxFuture;
use uuid::Uuid;

use callbook_core::providers::{
    CheckoutLink, CheckoutRequest, NotificationChannel, PaymentGateway, PaymentGateways, RoomGrant,
    RoomProvider, RoomRequest,
};
use callbook_core::{BookingPolicy, ManualClock, PaymentOutcome, Providers, Services};
use callbook_db::Database;
use callbook_types::api::CreateBookingRequest;
use callbook_types::{
    Account, AvailabilityMode, Booking, CallType, MembershipTier, Payment, Performer,
    PerformerStatus,
};

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 20, h, m, 0).unwrap()
}

pub struct FakeGateway {
    pub name: &'static str,
    pub links: AtomicUsize,
}

impl FakeGateway {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            links: AtomicUsize::new(0),
        }
    }
}

impl PaymentGateway for FakeGateway {
    fn provider(&self) -> &str {
        self.name
    }

    fn create_link<'a>(&'a self, request: &'a CheckoutRequest) -> BoxFuture<'a, anyhow::Result<CheckoutLink>> {
        Box::pin(async move {
            self.links.fetch_add(1, Ordering::SeqCst);
            Ok(CheckoutLink {
                url: format!("https://pay.test/{}/{}", self.name, request.payment_id),
                provider_payment_id: None,
            })
        })
    }
}

#[derive(Default)]
pub struct FakeRooms {
    pub provisioned: AtomicUsize,
    pub torn_down: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RoomProvider for FakeRooms {
    fn name(&self) -> &str {
        "fake"
    }

    fn provision<'a>(&'a self, request: &'a RoomRequest) -> BoxFuture<'a, anyhow::Result<RoomGrant>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("room service unavailable");
            }
            self.provisioned.fetch_add(1, Ordering::SeqCst);
            Ok(RoomGrant {
                room_name: request.room_id.clone(),
                join_url_user: format!("https://meet.test/{}?u", request.room_id),
                join_url_performer: format!("https://meet.test/{}?p", request.room_id),
                token_user: "tok-user".into(),
                token_performer: "tok-performer".into(),
            })
        })
    }

    fn teardown<'a>(&'a self, room_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.torn_down.lock().unwrap().push(room_id.to_string());
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl NotificationChannel for RecordingChannel {
    fn send<'a>(&'a self, user_id: &'a str, text: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        })
    }
}

pub struct Harness {
    pub services: Services,
    pub db: Arc<Database>,
    pub clock: Arc<ManualClock>,
    pub card: Arc<FakeGateway>,
    pub rooms: Arc<FakeRooms>,
    pub channel: Arc<RecordingChannel>,
    pub performer: Performer,
}

pub fn harness() -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::new(at(8, 0)));
    let card = Arc::new(FakeGateway::new("card"));
    let rooms = Arc::new(FakeRooms::default());
    let channel = Arc::new(RecordingChannel::default());

    let providers = Providers {
        payments: PaymentGateways::new()
            .with(card.clone())
            .with(Arc::new(FakeGateway::new("crypto"))),
        rooms: rooms.clone(),
        channel: channel.clone(),
    };
    let services = Services::new(db.clone(), clock.clone(), BookingPolicy::default(), providers);

    let performer = Performer {
        id: Uuid::new_v4(),
        user_id: Some("perf-chat".into()),
        display_name: "Luna".into(),
        base_price_cents: 10_000,
        currency: "USD".into(),
        allowed_call_types: vec![CallType::Video, CallType::Audio],
        max_call_duration: 120,
        buffer_time_before: 10,
        buffer_time_after: 10,
        timezone: "UTC".into(),
        status: PerformerStatus::Active,
        is_available: true,
        availability_mode: AvailabilityMode::WorkingHours,
        created_at: at(0, 0),
        updated_at: at(0, 0),
    };
    db.upsert_performer(&performer).unwrap();

    for user in ["u1", "u2"] {
        db.upsert_account(&Account {
            user_id: user.into(),
            age_verified: true,
            terms_accepted_at: Some(at(0, 0)),
            is_restricted: false,
            private_calls_enabled: true,
            membership_tier: MembershipTier::Prime,
            membership_expires_at: None,
            language: "en".into(),
            updated_at: at(0, 0),
        })
        .unwrap();
    }

    Harness {
        services,
        db,
        clock,
        card,
        rooms,
        channel,
        performer,
    }
}

impl Harness {
    pub fn request(&self, start: DateTime<Utc>, minutes: u32) -> CreateBookingRequest {
        CreateBookingRequest {
            performer_id: self.performer.id,
            call_type: CallType::Video,
            duration_minutes: minutes,
            start_time_utc: start,
            slot_id: None,
        }
    }

    /// Draft → held → awaiting_payment with a live `card` link.
    pub async fn awaiting_payment(&self, user: &str, start: DateTime<Utc>) -> (Booking, Payment) {
        let bookings = &self.services.bookings;
        let b = bookings.create_booking(user, self.request(start, 30)).unwrap();
        bookings.hold_booking(b.id, None).unwrap();
        bookings.confirm_rules(b.id).unwrap();
        let payment = bookings.create_payment_link(b.id, "card", None).await.unwrap();
        (bookings.get_booking(b.id).unwrap(), payment)
    }

    pub async fn confirmed(&self, user: &str, start: DateTime<Utc>) -> (Booking, PaymentOutcome) {
        let (b, payment) = self.awaiting_payment(user, start).await;
        let outcome = self
            .services
            .bookings
            .handle_payment_complete(payment.id, Some("pi_1"))
            .await
            .unwrap();
        (b, outcome)
    }

    pub fn advance(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }
}
