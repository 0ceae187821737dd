use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ISSUER: &str = "messenger";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub exp: i64,
    pub iss: String,
}

/// HS256 signing and validation keys, injected from configuration at
/// startup. There is deliberately no global key state.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            validation,
        }
    }

    /// Signs a token for the user, returning it with its expiry instant.
    pub fn sign(&self, user_id: i64) -> AppResult<(String, DateTime<Utc>)> {
        let expires_at = Utc::now()
            + ChronoDuration::from_std(self.ttl)
                .map_err(|_| AppError::Config("session token TTL out of range".into()))?;

        let claims = Claims {
            user_id,
            exp: expires_at.timestamp(),
            iss: ISSUER.to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|_| AppError::Internal)?;

        Ok((token, expires_at))
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthenticated(format!("invalid token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let keys = keys();
        let (token, expires_at) = keys.sign(42).unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp, expires_at.timestamp());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys();
        let claims = Claims {
            user_id: 42,
            exp: Utc::now().timestamp() - 300,
            iss: ISSUER.to_string(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();

        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = keys().sign(42).unwrap();
        let other = JwtKeys::new("other-secret", Duration::from_secs(3600));
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let keys = keys();
        let (token, _) = keys.sign(42).unwrap();
        let tampered = format!("{}x", token);
        assert!(keys.verify(&tampered).is_err());
    }
}
