use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Room to provision for a confirmed booking.
#[derive(Debug, Clone)]
pub struct RoomRequest {
    pub booking_id: Uuid,
    pub room_id: String,
    pub user_id: String,
    pub performer_id: Uuid,
    pub not_before: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_participants: u32,
}

#[derive(Debug, Clone)]
pub struct RoomGrant {
    pub room_name: String,
    pub join_url_user: String,
    pub join_url_performer: String,
    pub token_user: String,
    pub token_performer: String,
}

pub trait RoomProvider: Send + Sync {
    fn name(&self) -> &str;

    fn provision<'a>(&'a self, request: &'a RoomRequest) -> BoxFuture<'a, anyhow::Result<RoomGrant>>;

    fn teardown<'a>(&'a self, room_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;
}

#[derive(Debug, Serialize)]
struct RoomClaims<'a> {
    iss: &'a str,
    aud: &'a str,
    sub: &'a str,
    room: &'a str,
    nbf: i64,
    exp: i64,
    context: RoomContext<'a>,
}

#[derive(Debug, Serialize)]
struct RoomContext<'a> {
    user: RoomUser<'a>,
    features: RoomFeatures,
}

#[derive(Debug, Serialize)]
struct RoomUser<'a> {
    id: &'a str,
    moderator: bool,
}

#[derive(Debug, Serialize)]
struct RoomFeatures {
    recording: bool,
    livestreaming: bool,
}

/// JWT-authenticated meeting server. Rooms exist implicitly once someone
/// joins with a valid token, so provisioning only mints tokens.
pub struct JwtRoomProvider {
    base_url: String,
    app_id: String,
    secret: String,
}

impl JwtRoomProvider {
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            secret: secret.into(),
        }
    }

    fn token(&self, request: &RoomRequest, participant: &str, moderator: bool) -> anyhow::Result<String> {
        let claims = RoomClaims {
            iss: &self.app_id,
            aud: "jitsi",
            sub: &self.base_url,
            room: &request.room_id,
            nbf: request.not_before.timestamp(),
            exp: request.expires_at.timestamp(),
            context: RoomContext {
                user: RoomUser {
                    id: participant,
                    moderator,
                },
                features: RoomFeatures {
                    recording: false,
                    livestreaming: false,
                },
            },
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }
}

impl RoomProvider for JwtRoomProvider {
    fn name(&self) -> &str {
        "jitsi"
    }

    fn provision<'a>(&'a self, request: &'a RoomRequest) -> BoxFuture<'a, anyhow::Result<RoomGrant>> {
        Box::pin(async move {
            let performer = request.performer_id.to_string();
            let token_user = self.token(request, &request.user_id, false)?;
            let token_performer = self.token(request, &performer, true)?;
            let url = format!("{}/{}", self.base_url, request.room_id);
            Ok(RoomGrant {
                room_name: request.room_id.clone(),
                join_url_user: format!("{}?jwt={}", url, token_user),
                join_url_performer: format!("{}?jwt={}", url, token_performer),
                token_user,
                token_performer,
            })
        })
    }

    fn teardown<'a>(&'a self, room_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            // Tokens expire on their own; nothing to delete server-side.
            debug!("Room {} released", room_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[tokio::test]
    async fn tokens_are_scoped_to_the_room() {
        let provider = JwtRoomProvider::new("https://meet.example/", "callbook", "room-secret");
        let start = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        let request = RoomRequest {
            booking_id: Uuid::new_v4(),
            room_id: "call-0123456789abcdef".into(),
            user_id: "u1".into(),
            performer_id: Uuid::new_v4(),
            not_before: start - Duration::minutes(10),
            expires_at: start + Duration::minutes(60),
            max_participants: 2,
        };
        let grant = provider.provision(&request).await.unwrap();
        assert!(grant.join_url_user.starts_with("https://meet.example/call-0123456789abcdef?jwt="));

        let mut validation = Validation::default();
        validation.set_audience(&["jitsi"]);
        validation.validate_nbf = false;
        let data = decode::<serde_json::Value>(
            &grant.token_performer,
            &DecodingKey::from_secret(b"room-secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims["room"], "call-0123456789abcdef");
        assert_eq!(data.claims["context"]["user"]["moderator"], true);
        assert_eq!(data.claims["context"]["features"]["recording"], false);
    }
}
