//! HMAC-SHA-256 signed public HLS URLs (§4.4).
//!
//! The device only produces signatures; validation happens at an external
//! edge component, so this module exposes `sign` for production use and
//! `verify` only to support the round-trip property test named in §8.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::CameraId;

type HmacSha256 = Hmac<Sha256>;

/// Signs `"<camera_id>:<expires>"` under `secret`, returning the lowercase
/// hex-encoded digest.
#[must_use]
pub fn sign(camera_id: &CameraId, expires: DateTime<Utc>, secret: &[u8]) -> String {
    let message = message_for(camera_id, expires);
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a previously produced signature against `now`: succeeds only
/// while `now < expires` and the signature matches.
#[must_use]
pub fn verify(camera_id: &CameraId, expires: DateTime<Utc>, secret: &[u8], signature_hex: &str, now: DateTime<Utc>) -> bool {
    if now >= expires {
        return false;
    }
    let expected = sign(camera_id, expires, secret);
    // Not constant-time: acceptable here since this path only exists to
    // exercise the property test, not as a production verifier.
    expected == signature_hex
}

fn message_for(camera_id: &CameraId, expires: DateTime<Utc>) -> String {
    format!("{}:{}", camera_id.as_str(), expires.timestamp())
}

/// Builds the full public HLS URL for `camera_id`, appending `expires` and
/// `sig` query parameters.
#[must_use]
pub fn build_url(public_base_url: &str, camera_id: &CameraId, expires: DateTime<Utc>, secret: &[u8]) -> String {
    let sig = sign(camera_id, expires, secret);
    format!(
        "{}/hls/{}/playlist.m3u8?expires={}&sig={}",
        public_base_url.trim_end_matches('/'),
        camera_id.as_str(),
        expires.timestamp(),
        sig,
    )
}

#[cfg(test)]
mod signed_url_spec {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn verify_succeeds_before_expiry_and_fails_after() {
        let camera_id = CameraId::from("cam-42".to_owned());
        let secret = b"device-shared-secret";
        let signed_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let expires = signed_at + ChronoDuration::hours(12);

        let sig = sign(&camera_id, expires, secret);

        assert!(verify(&camera_id, expires, secret, &sig, signed_at));
        assert!(verify(&camera_id, expires, secret, &sig, expires - ChronoDuration::seconds(1)));
        assert!(!verify(&camera_id, expires, secret, &sig, expires));
        assert!(!verify(&camera_id, expires, secret, &sig, expires + ChronoDuration::seconds(1)));
    }

    #[test]
    fn different_camera_or_expiry_invalidates_signature() {
        let secret = b"shh";
        let expires = DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let cam_a = CameraId::from("cam-a".to_owned());
        let cam_b = CameraId::from("cam-b".to_owned());

        let sig_a = sign(&cam_a, expires, secret);
        assert!(!verify(&cam_b, expires, secret, &sig_a, expires - ChronoDuration::seconds(1)));

        let later = expires + ChronoDuration::seconds(1);
        assert!(!verify(&cam_a, later, secret, &sig_a, expires - ChronoDuration::seconds(1)));
    }

    #[test]
    fn build_url_embeds_expiry_and_signature() {
        let camera_id = CameraId::from("cam-7".to_owned());
        let expires = DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let url = build_url("https://edge.example", &camera_id, expires, b"secret");
        assert!(url.starts_with("https://edge.example/hls/cam-7/playlist.m3u8?expires="));
        assert!(url.contains("&sig="));
    }
}
