//! Session management
//!
//! Uses HMAC-signed tokens carried in the `Authorization` header or the
//! `session` cookie. No server-side session storage needed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::data::UserId;

/// User session data
///
/// Minimal identity asserted by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Authenticated account
    pub user_id: UserId,
    /// Email from the identity provider
    pub email: Option<String>,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Session for `user_id` valid for `max_age_secs` from now
    pub fn new(user_id: UserId, max_age_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email: None,
            created_at: now,
            expires_at: now + Duration::seconds(max_age_secs),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Create a signed session token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `session` - Session data to encode
/// * `secret` - HMAC secret key
///
/// # Returns
/// Signed token string
pub fn create_session_token(
    session: &Session,
    secret: &str,
) -> Result<String, crate::error::AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let payload =
        serde_json::to_string(session).map_err(|e| crate::error::AppError::Internal(e.into()))?;
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// # Errors
/// `InvalidSignature` if the signature does not match, `Unauthorized` if the
/// token is malformed, carries an invalid user id or is expired
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, crate::error::AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Some((payload_b64, signature_b64)) = token.split_once('.') else {
        return Err(crate::error::AppError::Unauthorized);
    };

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| crate::error::AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| crate::error::AppError::InvalidSignature)?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| crate::error::AppError::Unauthorized)?;

    // UserId validates itself during deserialization.
    let session: Session = serde_json::from_slice(&payload_bytes)
        .map_err(|_| crate::error::AppError::Unauthorized)?;

    if session.is_expired() {
        return Err(crate::error::AppError::Unauthorized);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn session(max_age: i64) -> Session {
        Session::new(UserId::parse("u1").unwrap(), max_age)
    }

    #[test]
    fn token_round_trips_with_same_secret() {
        let token = create_session_token(&session(60), SECRET).unwrap();
        let decoded = verify_session_token(&token, SECRET).unwrap();
        assert_eq!(decoded.user_id.as_str(), "u1");
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_session_token(&session(60), SECRET).unwrap();
        let result = verify_session_token(&token, &"z".repeat(32));
        assert!(matches!(result, Err(AppError::InvalidSignature)));
    }

    #[test]
    fn expired_and_malformed_tokens_are_unauthorized() {
        let token = create_session_token(&session(-60), SECRET).unwrap();
        assert!(matches!(
            verify_session_token(&token, SECRET),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            verify_session_token("no-dot-here", SECRET),
            Err(AppError::Unauthorized)
        ));
    }
}
