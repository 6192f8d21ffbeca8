//! Token issuance and validation.
//!
//! DESIGN
//! ======
//! Two HMAC-SHA256 token kinds share one claim shape: short-lived access
//! tokens carried on every request, and long-lived refresh tokens that are
//! additionally persisted so they can be revoked. The zodiac sign rides in the
//! claims so the chat pipeline never needs a user lookup on the hot path.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("wrong token type")]
    WrongType,
}

/// Which kind of token a set of claims belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub zodiac_sign: String,
    pub token_type: TokenType,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

/// Signs and verifies tokens with a shared secret.
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_expiry: Duration,
    refresh_expiry: Duration,
}

impl TokenManager {
    #[must_use]
    pub fn new(secret: &str, access_expiry: Duration, refresh_expiry: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_expiry,
            refresh_expiry,
        }
    }

    /// Mint a short-lived access token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Invalid` if signing fails.
    pub fn generate_access_token(&self, user_id: Uuid, zodiac_sign: &str) -> Result<String, TokenError> {
        self.generate(user_id, zodiac_sign, TokenType::Access, self.access_expiry)
    }

    /// Mint a long-lived refresh token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Invalid` if signing fails.
    pub fn generate_refresh_token(&self, user_id: Uuid, zodiac_sign: &str) -> Result<String, TokenError> {
        self.generate(user_id, zodiac_sign, TokenType::Refresh, self.refresh_expiry)
    }

    fn generate(
        &self,
        user_id: Uuid,
        zodiac_sign: &str,
        token_type: TokenType,
        expiry: Duration,
    ) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id,
            zodiac_sign: zodiac_sign.to_string(),
            token_type,
            exp: now + expiry.as_secs() as i64,
            iat: now,
            nbf: now,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|_| TokenError::Invalid)
    }

    /// Verify a token's signature and time claims.
    ///
    /// # Errors
    ///
    /// `Expired` for an out-of-date token, `Invalid` for anything else wrong
    /// with it (signature, algorithm, shape).
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Verify and additionally require a specific token type.
    ///
    /// # Errors
    ///
    /// Everything `verify` returns, plus `WrongType` on a type mismatch.
    pub fn verify_typed(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != expected {
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new("test-secret", Duration::from_secs(900), Duration::from_secs(3600))
    }

    #[test]
    fn access_token_round_trip() {
        let m = manager();
        let id = Uuid::new_v4();
        let token = m.generate_access_token(id, "Leo").unwrap();
        let claims = m.verify(&token).unwrap();
        assert_eq!(claims.user_id, id);
        assert_eq!(claims.zodiac_sign, "Leo");
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_has_refresh_type() {
        let m = manager();
        let token = m.generate_refresh_token(Uuid::new_v4(), "Aries").unwrap();
        let claims = m.verify_typed(&token, TokenType::Refresh).unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let m = manager();
        let token = m.generate_access_token(Uuid::new_v4(), "Aries").unwrap();
        assert!(matches!(m.verify_typed(&token, TokenType::Refresh), Err(TokenError::WrongType)));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let m = manager();
        let token = m.generate_access_token(Uuid::new_v4(), "Virgo").unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(matches!(m.verify(&tampered), Err(TokenError::Invalid)));
    }

    #[test]
    fn token_from_other_secret_is_invalid() {
        let m = manager();
        let other = TokenManager::new("different-secret", Duration::from_secs(900), Duration::from_secs(3600));
        let token = other.generate_access_token(Uuid::new_v4(), "Libra").unwrap();
        assert!(matches!(m.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn expired_token_reports_expired() {
        let m = manager();
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: Uuid::new_v4(),
            zodiac_sign: "Cancer".into(),
            token_type: TokenType::Access,
            exp: now - 3600,
            iat: now - 7200,
            nbf: now - 7200,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap();
        assert!(matches!(m.verify(&token), Err(TokenError::Expired)));
    }
}
