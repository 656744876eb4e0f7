use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::config::JwtConfig;

/// Signing and verification keys plus the token lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

/// Why a token was refused. Callers collapse all of these into one response.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed or badly signed token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token has no subject")]
    MissingSubject,
    #[error("token expired")]
    Expired,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm,
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }
}

impl JwtKeys {
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `email` expiring one lifetime from now.
    pub fn sign(&self, email: &str) -> anyhow::Result<String> {
        self.sign_at(email, OffsetDateTime::now_utc())
    }

    pub fn sign_at(&self, email: &str, issued_at: OffsetDateTime) -> anyhow::Result<String> {
        let exp = issued_at + self.ttl;
        let claims = Claims {
            sub: Some(email.to_owned()),
            iat: issued_at.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        debug!(email = %email, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    /// Verify signature and expiry, returning the subject (email).
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// A token is valid strictly before its `exp`; there is no leeway.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<String, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if now.unix_timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        let sub = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::MissingSubject)?;
        debug!(email = %sub, "jwt verified");
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn make_keys(secret: &str, ttl_minutes: i64) -> JwtKeys {
        let cfg = JwtConfig::new(secret.into(), "HS256", ttl_minutes).expect("jwt config");
        JwtKeys::from(&cfg)
    }

    #[test]
    fn sign_and_verify_returns_subject() {
        let keys = make_keys("dev-secret", 30);
        let token = keys.sign("lex@dev.com").expect("sign");
        assert_eq!(keys.verify(&token).expect("verify"), "lex@dev.com");
    }

    #[test]
    fn token_is_valid_until_exactly_its_lifetime() {
        let keys = make_keys("dev-secret", 30);
        let t = datetime!(2025-01-01 12:00 UTC);
        let token = keys.sign_at("lex@dev.com", t).unwrap();

        assert!(keys.verify_at(&token, t).is_ok());
        assert!(keys
            .verify_at(&token, t + Duration::minutes(30) - Duration::seconds(1))
            .is_ok());
        assert!(matches!(
            keys.verify_at(&token, t + Duration::minutes(30)),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            keys.verify_at(&token, t + Duration::hours(2)),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = make_keys("one", 30).sign("lex@dev.com").unwrap();
        let err = make_keys("two", 30).verify(&token).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn rejects_garbage() {
        let keys = make_keys("dev-secret", 30);
        assert!(matches!(keys.verify("invalid-token"), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn rejects_token_without_subject() {
        let keys = make_keys("dev-secret", 30);
        let exp = (OffsetDateTime::now_utc() + Duration::minutes(5)).unix_timestamp();
        let token = encode(
            &Header::default(),
            &serde_json::json!({ "without-sub": "None", "iat": 0, "exp": exp }),
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .unwrap();
        assert!(matches!(keys.verify(&token), Err(TokenError::MissingSubject)));
    }

    #[test]
    fn rejects_token_without_exp() {
        let keys = make_keys("dev-secret", 30);
        let token = encode(
            &Header::default(),
            &serde_json::json!({ "sub": "lex@dev.com", "iat": 0 }),
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .unwrap();
        assert!(keys.verify(&token).is_err());
    }
}
