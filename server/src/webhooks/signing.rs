//! HMAC-SHA256 Webhook Signing
//!
//! Signs outgoing webhook bodies so receivers can check authenticity.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of a webhook body under the subscription secret.
pub fn body_signature(secret: &str, body: &[u8]) -> String {
    let mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length")
        .chain_update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Generate an opaque 16-byte hex identifier for a delivery attempt chain.
pub fn generate_delivery_id() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}
