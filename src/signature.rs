use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

/// Verify the `x-line-signature` header against the raw request body.
///
/// The platform signs the exact body bytes with HMAC-SHA256 keyed by the
/// channel secret and sends the digest base64-encoded. An unset or empty
/// secret fails closed: no verification means no processing.
pub fn verify(raw_body: &[u8], signature_header: &str, secret: &str) -> bool {
    if secret.trim().is_empty() {
        warn!("Channel secret is not configured; rejecting webhook");
        return false;
    }

    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => {
            warn!("Channel secret is not a usable HMAC key; rejecting webhook");
            return false;
        }
    };
    mac.update(raw_body);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    if expected != signature_header {
        warn!("Webhook signature mismatch");
        return false;
    }
    true
}
