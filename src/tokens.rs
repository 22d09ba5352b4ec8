// Access and refresh tokens

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::users::User;

/// Clock skew tolerated when validating `nbf`/`exp`, in seconds
const VALIDATION_LEEWAY: u64 = 60;

const REFRESH_TOKEN_LEN: usize = 32;

/// Access token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_uuid: String,
    pub user_name: String,
    pub user_email: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Signed JWT identifying a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque random token exchanged for a new token pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken(String);

impl RefreshToken {
    pub fn generate() -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(REFRESH_TOKEN_LEN)
            .map(char::from)
            .collect();
        RefreshToken(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signs and validates access tokens (HS256)
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: u64) -> Result<Self> {
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .with_context(|| format!("Access token lifetime out of range: {}s", ttl_secs))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    /// Issue an access token for `user`
    pub fn issue(&self, user: &User) -> Result<AccessToken> {
        let now = Utc::now();
        let claims = Claims {
            user_uuid: user.uuid.clone(),
            user_name: user.name.clone(),
            user_email: user.email.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: now
                .checked_add_signed(self.ttl)
                .context("Access token expiry out of range")?
                .timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign access token")?;
        Ok(AccessToken(token))
    }

    /// Check signature, `exp` and `nbf`, returning the claims
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.leeway = VALIDATION_LEEWAY;

        decode::<Claims>(token, &self.decoding_key, &validation).map(|data| data.claims)
    }
}
