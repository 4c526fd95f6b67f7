pub mod admin;
pub mod auth;
pub mod bookings;
pub mod error;
pub mod middleware;
pub mod performers;
pub mod sessions;
pub mod webhooks;

use axum::{
    Router, middleware as mw,
    routing::{get, patch, post, put},
};

use crate::auth::AppState;
use crate::middleware::{require_admin, require_auth};

pub async fn health() -> &'static str {
    "ok"
}

/// All routes. CORS and tracing layers are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/webhooks/payments", post(webhooks::payment_webhook));

    let user_routes = Router::new()
        .route("/eligibility", get(bookings::get_eligibility))
        .route("/performers", get(performers::list_performers))
        .route("/performers/{id}", get(performers::get_performer))
        .route("/performers/{id}/slots", get(performers::get_slots))
        .route("/bookings", post(bookings::create_booking).get(bookings::list_bookings))
        .route("/bookings/{id}", get(bookings::get_booking))
        .route("/bookings/{id}/hold", post(bookings::hold_booking))
        .route("/bookings/{id}/confirm-rules", post(bookings::confirm_rules))
        .route("/bookings/{id}/cancel", post(bookings::cancel_booking))
        .route("/bookings/{id}/payment-link", post(bookings::create_payment_link))
        .route("/bookings/{id}/payment", get(bookings::get_payment_status))
        .route(
            "/bookings/{id}/session",
            post(sessions::create_session).get(sessions::get_session),
        )
        .route("/bookings/{id}/session/start", post(sessions::start_session))
        .route("/bookings/{id}/session/end", post(sessions::end_session))
        .route("/sessions/upcoming", get(sessions::upcoming_sessions))
        .layer(mw::from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/admin/performers/{id}", put(admin::upsert_performer))
        .route("/admin/accounts/{id}", put(admin::upsert_account))
        .route("/admin/performers/{id}/availability", post(admin::add_availability))
        .route(
            "/admin/performers/{id}/availability/bulk",
            post(admin::bulk_add_availability),
        )
        .route(
            "/admin/availability/{slot_id}",
            patch(admin::update_availability).delete(admin::delete_availability),
        )
        .route("/admin/bookings/{id}/cancel", post(admin::cancel_booking))
        .route("/admin/worker/run-once", post(admin::run_worker_once))
        .layer(mw::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use callbook_core::providers::{HostedCheckoutGateway, JwtRoomProvider, LogChannel, PaymentGateways};
    use callbook_core::signing::sign_hex;
    use callbook_core::{BookingPolicy, ManualClock, Providers, Services, WorkerConfig};
    use callbook_db::Database;
    use callbook_types::{
        Account, AvailabilityMode, CallType, MembershipTier, Performer, PerformerStatus,
    };

    use super::*;
    use crate::auth::{AppStateInner, create_token};

    const JWT: &str = "test-jwt-secret";
    const ADMIN: &str = "test-admin-token";
    const HOOK: &str = "test-webhook-secret";

    struct Fixture {
        app: Router,
        performer_id: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc.with_ymd_and_hms(2026, 10, 20, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let providers = Providers {
            payments: PaymentGateways::new().with(Arc::new(HostedCheckoutGateway::new(
                "card",
                "https://checkout.test/pay",
                "sign",
            ))),
            rooms: Arc::new(JwtRoomProvider::new("https://meet.test", "callbook", "room")),
            channel: Arc::new(LogChannel),
        };
        let services = Services::new(db.clone(), clock, BookingPolicy::default(), providers);
        let worker = Arc::new(services.worker(WorkerConfig::default()));

        let performer = Performer {
            id: Uuid::new_v4(),
            user_id: Some("perf".into()),
            display_name: "Sol".into(),
            base_price_cents: 6_000,
            currency: "USD".into(),
            allowed_call_types: vec![CallType::Video],
            max_call_duration: 60,
            buffer_time_before: 0,
            buffer_time_after: 0,
            timezone: "UTC".into(),
            status: PerformerStatus::Active,
            is_available: true,
            availability_mode: AvailabilityMode::WorkingHours,
            created_at: now,
            updated_at: now,
        };
        db.upsert_performer(&performer).unwrap();
        for (user, tier) in [("prime", MembershipTier::Prime), ("free", MembershipTier::Free)] {
            db.upsert_account(&Account {
                user_id: user.into(),
                age_verified: true,
                terms_accepted_at: Some(now),
                is_restricted: false,
                private_calls_enabled: true,
                membership_tier: tier,
                membership_expires_at: None,
                language: "en".into(),
                updated_at: now,
            })
            .unwrap();
        }

        let state = Arc::new(AppStateInner {
            services,
            worker,
            jwt_secret: JWT.into(),
            admin_token: ADMIN.into(),
            webhook_secret: Some(HOOK.into()),
        });
        Fixture {
            app: router(state),
            performer_id: performer.id,
        }
    }

    fn bearer(user: &str) -> String {
        format!("Bearer {}", create_token(JWT, user, chrono::Duration::hours(1)).unwrap())
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, auth: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn booking_body(performer_id: Uuid) -> Value {
        json!({
            "performer_id": performer_id,
            "call_type": "video",
            "duration_minutes": 30,
            "start_time_utc": "2026-10-20T12:00:00Z",
        })
    }

    #[tokio::test]
    async fn user_routes_require_a_token() {
        let f = fixture();
        let req = Request::get("/bookings").body(Body::empty()).unwrap();
        let (status, _) = call(&f.app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::get("/health").body(Body::empty()).unwrap();
        assert_eq!(call(&f.app, req).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn free_tier_is_refused_with_reasons() {
        let f = fixture();
        let (status, body) = call(
            &f.app,
            post_json("/bookings", &bearer("free"), booking_body(f.performer_id)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "not_eligible");
        assert_eq!(body["reasons"], json!(["membership_required"]));
    }

    #[tokio::test]
    async fn booking_to_paid_over_http() {
        let f = fixture();
        let user = bearer("prime");

        let (status, body) = call(
            &f.app,
            post_json("/bookings", &user, booking_body(f.performer_id)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["booking"]["price_cents"], 6_000);
        let id = body["booking"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &f.app,
            post_json("/bookings", &user, booking_body(f.performer_id)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({ "success": false, "error": "slot_not_available" }));

        let (status, _) = call(
            &f.app,
            post_json(&format!("/bookings/{}/hold", id), &user, json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        call(
            &f.app,
            post_json(&format!("/bookings/{}/confirm-rules", id), &user, json!({})),
        )
        .await;
        let (status, body) = call(
            &f.app,
            post_json(
                &format!("/bookings/{}/payment-link", id),
                &user,
                json!({ "provider": "card" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let payment_id = body["payment"]["id"].as_str().unwrap().to_string();
        assert!(body["payment"]["payment_link"]
            .as_str()
            .unwrap()
            .starts_with("https://checkout.test/pay"));

        // Someone else cannot see it.
        let req = Request::get(format!("/bookings/{}", id))
            .header(header::AUTHORIZATION, bearer("free"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&f.app, req).await.0, StatusCode::NOT_FOUND);

        let payload = json!({ "payment_id": payment_id, "status": "paid" }).to_string();
        let unsigned = Request::post("/webhooks/payments")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.clone()))
            .unwrap();
        assert_eq!(call(&f.app, unsigned).await.0, StatusCode::UNAUTHORIZED);

        for _ in 0..2 {
            let signed = Request::post("/webhooks/payments")
                .header(header::CONTENT_TYPE, "application/json")
                .header(webhooks::SIGNATURE_HEADER, sign_hex(HOOK.as_bytes(), payload.as_bytes()))
                .body(Body::from(payload.clone()))
                .unwrap();
            let (status, body) = call(&f.app, signed).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["booking"]["status"], "confirmed");
            assert!(body["session"]["room_id"].as_str().unwrap().starts_with("call-"));
            assert!(body["session"].get("token").is_none());
            assert!(body["session"].get("token_performer").is_none());
        }

        // The performer sees the session too.
        let req = Request::get(format!("/bookings/{}/session", id))
            .header(header::AUTHORIZATION, bearer("perf"))
            .body(Body::empty())
            .unwrap();
        let (status, performer_view) = call(&f.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(performer_view["session"]["status"], "scheduled");
        let performer_token = performer_view["session"]["token"].as_str().unwrap().to_string();

        // The user only gets their own link and token.
        let req = Request::get(format!("/bookings/{}/session", id))
            .header(header::AUTHORIZATION, &user)
            .body(Body::empty())
            .unwrap();
        let (status, user_view) = call(&f.app, req).await;
        assert_eq!(status, StatusCode::OK);
        let session = &user_view["session"];
        assert!(session.get("token_performer").is_none());
        assert!(session.get("join_url_performer").is_none());
        assert_ne!(session["token"].as_str().unwrap(), performer_token);
        assert_ne!(session["join_url"], performer_view["session"]["join_url"]);
        assert!(!user_view.to_string().contains(&performer_token));
    }

    #[tokio::test]
    async fn admin_routes_take_the_admin_token() {
        let f = fixture();
        let slot = json!({ "date": "2026-10-21", "start_time": "09:00:00", "end_time": "11:00:00" });
        let uri = format!("/admin/performers/{}/availability", f.performer_id);

        let (status, _) = call(&f.app, post_json(&uri, &bearer("prime"), slot.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let admin = format!("Bearer {}", ADMIN);
        let (status, body) = call(&f.app, post_json(&uri, &admin, slot.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["slot"]["is_booked"], false);

        let (status, body) = call(&f.app, post_json(&uri, &admin, slot)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "availability_overlap");

        let (status, body) = call(
            &f.app,
            post_json("/admin/worker/run-once", &admin, json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }
}
