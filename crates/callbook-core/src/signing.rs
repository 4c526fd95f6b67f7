use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `message`.
pub fn sign_hex(secret: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Constant-time check of a hex signature produced by [`sign_hex`].
pub fn verify_hex(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Constant-time equality of two shared secrets. Both sides go through the
/// same keyed MAC so neither content nor length leaks through timing.
pub fn secrets_match(expected: &str, given: &str) -> bool {
    const KEY: &[u8] = b"callbook-secret-compare";
    let (Ok(mut reference), Ok(mut candidate)) =
        (HmacSha256::new_from_slice(KEY), HmacSha256::new_from_slice(KEY))
    else {
        return false;
    };
    reference.update(expected.as_bytes());
    candidate.update(given.as_bytes());
    candidate
        .verify_slice(&reference.finalize().into_bytes())
        .is_ok()
}

/// Deterministic room id for a booking: `call-` and the first 16 hex chars
/// of SHA-256 over the booking id.
pub fn room_id_for(booking_id: &uuid::Uuid) -> String {
    let digest = Sha256::digest(booking_id.to_string().as_bytes());
    format!("call-{}", &hex::encode(digest)[..16])
}
