use base64::encode as base64_encode;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the base64-encoded HMAC-SHA256 signature the payment gateway attaches to webhook
/// deliveries.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(data);
    base64_encode(mac.finalize().into_bytes())
}
