//! Credential primitives: argon2id password hashes and HS256 bearer tokens.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result};

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

pub fn hash_password(password: &str) -> Result<String> {
    let salt_bytes: [u8; 16] = rand::rng().random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| LedgerError::Credential(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| LedgerError::Credential(e.to_string()))?;
    Ok(hash.to_string())
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        tracing::error!(error = %e, "stored password hash could not be parsed");
        LedgerError::Credential(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// Same argon2id cost as `Argon2::default()`, so checking it takes as long as
// checking a real account's hash. Matches no password.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$\
     dGFsbHktZHVtbXktc2FsdA$\
     dGFsbHktdW5rbm93bi1hY2NvdW50LWR1bW15LWhhc2g";

/// Verify against `stored`, or against a dummy hash when there is no account,
/// so both cases cost one full argon2 run. Always `Ok(false)` without one.
pub fn verify_password_or_dummy(password: &str, stored: Option<&str>) -> Result<bool> {
    match stored {
        Some(hash) => verify_password(password, hash),
        None => {
            verify_password(password, DUMMY_HASH)?;
            Ok(false)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| LedgerError::Credential(e.to_string()))
    }

    /// Returns the user id carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            LedgerError::Unauthenticated("Token is invalid!".to_string())
        })?;
        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| LedgerError::Unauthenticated("Token is invalid!".to_string()))
    }
}
