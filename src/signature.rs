//! Webhook signature verification (HMAC-SHA256 over the raw request body)

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Lowercase hex HMAC-SHA256 digest of `payload` keyed with `secret`.
pub fn hex_digest(secret: &[u8], payload: &[u8]) -> String {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC can take a key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds the `sha256=<hex>` header value a provider would send for `payload`.
pub fn sign(secret: &[u8], payload: &[u8]) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex_digest(secret, payload))
}

/// Checks a webhook signature header against the body.
///
/// The `sha256=` prefix used by GitHub is optional. An absent or empty
/// header never verifies.
pub fn verify(payload: &[u8], signature: Option<&str>, secret: &[u8]) -> bool {
    let Some(signature) = signature.filter(|s| !s.is_empty()) else {
        return false;
    };
    let supplied = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or(signature);

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(expected.as_bytes(), supplied.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let digest = hex_digest(SECRET, body);
        assert!(verify(body, Some(&digest), SECRET));
    }

    #[test]
    fn prefixed_and_bare_forms_agree() {
        let body = b"hello world";
        let prefixed = sign(SECRET, body);
        let bare = prefixed.strip_prefix("sha256=").unwrap();
        assert!(verify(body, Some(&prefixed), SECRET));
        assert!(verify(body, Some(bare), SECRET));
    }

    #[test]
    fn any_flipped_bit_fails() {
        let body = b"payload";
        let digest = hex_digest(SECRET, body);
        let mut raw = hex::decode(&digest).unwrap();
        for byte in 0..raw.len() {
            for bit in 0..8 {
                raw[byte] ^= 1 << bit;
                let tampered = hex::encode(&raw);
                assert!(!verify(body, Some(&tampered), SECRET));
                raw[byte] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn missing_or_empty_signature_fails() {
        assert!(!verify(b"body", None, SECRET));
        assert!(!verify(b"body", Some(""), SECRET));
        assert!(!verify(b"body", Some("sha256="), SECRET));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = sign(b"correct-secret", b"body");
        assert!(!verify(b"body", Some(&sig), b"wrong-secret"));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = sign(SECRET, b"original body");
        assert!(!verify(b"tampered body", Some(&sig), SECRET));
    }

    #[test]
    fn uppercase_hex_is_rejected() {
        let digest = hex_digest(SECRET, b"body").to_uppercase();
        assert!(!verify(b"body", Some(&digest), SECRET));
    }

    #[test]
    fn sha1_header_does_not_verify() {
        assert!(!verify(
            b"body",
            Some("sha1=da39a3ee5e6b4b0d3255bfef95601890afd80709"),
            SECRET
        ));
    }

    #[test]
    fn empty_secret_still_verifies() {
        let sig = sign(b"", b"body");
        assert!(verify(b"body", Some(&sig), b""));
        assert!(!verify(b"body", Some(&sig), b"not-empty"));
    }

    #[test]
    fn length_mismatch_fails() {
        let digest = hex_digest(SECRET, b"body");
        assert!(!verify(b"body", Some(&digest[..63]), SECRET));
        assert!(!verify(b"body", Some(&format!("{}0", digest)), SECRET));
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        let digest = hex_digest(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            digest,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
