//! HMAC-SHA256 webhook signatures.
//!
//! The key is the receiving platform's API token followed by the shared sync
//! token. A request authenticated by the shared token alone signs with an
//! empty platform part.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(platform_token: &str, sync_token: &str) -> HmacSha256 {
    let mut key = Vec::with_capacity(platform_token.len() + sync_token.len());
    key.extend_from_slice(platform_token.as_bytes());
    key.extend_from_slice(sync_token.as_bytes());
    match HmacSha256::new_from_slice(&key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    }
}

/// Hex-encoded signature of `body`.
pub fn sign(body: &[u8], platform_token: &str, sync_token: &str) -> String {
    let mut mac = mac_for(platform_token, sync_token);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature against `body`.
///
/// Malformed hex is a mismatch.
pub fn verify(body: &[u8], signature_hex: &str, platform_token: &str, sync_token: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = mac_for(platform_token, sync_token);
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}
