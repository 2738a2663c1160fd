use axum::extract::FromRef;
use anyhow::Context;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl_minutes: i64,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm,
            ttl_minutes: cfg.ttl_minutes,
        }
    }

    pub fn issue(&self, subject: &str) -> anyhow::Result<String> {
        self.issue_at(subject, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, subject: &str, issued_at: OffsetDateTime) -> anyhow::Result<String> {
        let ttl_secs = self
            .ttl_minutes
            .checked_mul(60)
            .context("token ttl overflows")?;
        let exp = issued_at
            .checked_add(TimeDuration::seconds(ttl_secs))
            .context("token expiry out of range")?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        debug!(alg = ?self.algorithm, "jwt signed");
        Ok(token)
    }

    /// Checks signature, algorithm and expiry with no leeway.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!("jwt verified");
        Ok(data.claims)
    }
}
