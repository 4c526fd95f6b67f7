use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header, encode};

use callbook_core::{Services, Worker};
use callbook_types::api::Claims;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub services: Services,
    pub worker: Arc<Worker>,
    pub jwt_secret: String,
    pub admin_token: String,
    /// When set, payment webhooks must carry a matching HMAC signature.
    pub webhook_secret: Option<String>,
}

/// Bearer token for `user_id`, valid for `ttl`. Tokens are normally minted by
/// the identity service that owns the accounts; this is the same encoding.
pub fn create_token(secret: &str, user_id: &str, ttl: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
