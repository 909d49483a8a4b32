//! One-time email verification tokens issued on approval.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Verification tokens stay valid for 30 days after approval.
pub const TOKEN_VALIDITY_DAYS: i64 = 30;

/// An opaque verification token and its expiry.
#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issue a fresh token for a registration.
///
/// The token is 32 bytes of v4-UUID randomness, URL-safe base64 encoded so it
/// can ride in a query string unescaped. The registration id and email are
/// not embedded; the verification flow matches the stored token and checks
/// expiry.
pub fn issue(registration_id: Uuid, email: &str, now: DateTime<Utc>) -> VerificationToken {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());

    let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes);

    tracing::debug!(
        registration_id = %registration_id,
        recipient = %email,
        "Issued email verification token"
    );

    VerificationToken {
        token,
        expires_at: now + Duration::days(TOKEN_VALIDITY_DAYS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_url_safe() {
        let t = issue(Uuid::new_v4(), "a@example.com", Utc::now());
        assert!(!t.token.contains('+'));
        assert!(!t.token.contains('/'));
        assert!(!t.token.contains('='));
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(t.token.len(), 43);
    }

    #[test]
    fn test_tokens_are_unique() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let a = issue(id, "a@example.com", now);
        let b = issue(id, "a@example.com", now);
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_expiry_is_thirty_days_out() {
        let now = Utc::now();
        let t = issue(Uuid::new_v4(), "a@example.com", now);
        assert_eq!(t.expires_at, now + Duration::days(30));
    }
}
