use std::str::FromStr;

use anyhow::Context;
use jsonwebtoken::Algorithm;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let secret = std::env::var("SECRET_KEY").context("SECRET_KEY is not set")?;
        let algorithm = std::env::var("ALGORITHM").unwrap_or_else(|_| "HS256".into());
        let ttl_minutes = match std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Ok(v) => v
                .parse::<i64>()
                .with_context(|| format!("ACCESS_TOKEN_EXPIRE_MINUTES is not a number: {v}"))?,
            Err(_) => 30,
        };
        Self::new(database_url, JwtConfig::new(secret, &algorithm, ttl_minutes)?)
    }

    pub fn new(database_url: String, jwt: JwtConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!database_url.trim().is_empty(), "DATABASE_URL is empty");
        Ok(Self { database_url, jwt })
    }
}

impl JwtConfig {
    /// Only HMAC algorithms are accepted since tokens are signed with a shared secret.
    pub fn new(secret: String, algorithm: &str, ttl_minutes: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(!secret.is_empty(), "SECRET_KEY is empty");
        anyhow::ensure!(ttl_minutes > 0, "ACCESS_TOKEN_EXPIRE_MINUTES must be positive");
        let algorithm = Algorithm::from_str(algorithm.trim())
            .with_context(|| format!("unknown ALGORITHM {algorithm}"))?;
        anyhow::ensure!(
            matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512),
            "ALGORITHM must be one of HS256, HS384, HS512"
        );
        Ok(Self {
            secret,
            algorithm,
            ttl_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hmac_algorithms() {
        for alg in ["HS256", "HS384", "HS512"] {
            let cfg = JwtConfig::new("secret".into(), alg, 30).expect("valid config");
            assert_eq!(cfg.ttl_minutes, 30);
        }
    }

    #[test]
    fn rejects_asymmetric_and_unknown_algorithms() {
        assert!(JwtConfig::new("secret".into(), "RS256", 30).is_err());
        assert!(JwtConfig::new("secret".into(), "nope", 30).is_err());
    }

    #[test]
    fn rejects_empty_secret_and_bad_ttl() {
        assert!(JwtConfig::new(String::new(), "HS256", 30).is_err());
        assert!(JwtConfig::new("secret".into(), "HS256", 0).is_err());
    }

    #[test]
    fn rejects_empty_database_url() {
        let jwt = JwtConfig::new("secret".into(), "HS256", 30).unwrap();
        assert!(AppConfig::new("  ".into(), jwt).is_err());
    }
}
