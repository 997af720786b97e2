//! Session rows and retention rules.

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

/// Revoked sessions are deleted this many days after revocation.
pub const REVOKED_RETENTION_DAYS: i64 = 30;
/// Inactive sessions are deleted after this many idle days.
pub const IDLE_RETENTION_DAYS: i64 = 7;
/// Hard cap on session age regardless of state.
pub const MAX_AGE_DAYS: i64 = 90;

/// One authenticated device/browser login instance.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Session {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[serde(skip)]
    pub token_hash: Option<Vec<u8>>,
    pub device_type: String,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub ip_address: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub user_agent: String,
    pub login_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<String>,
}

/// Cutoffs for the three independent retention rules.
#[derive(Debug, Clone, Copy)]
pub struct RetentionCutoffs {
    /// Revoked before this moment -> delete.
    pub revoked_before: DateTime<Utc>,
    /// Inactive and idle since before this moment -> delete.
    pub idle_before: DateTime<Utc>,
    /// Created before this moment -> delete, active or not.
    pub created_before: DateTime<Utc>,
}

#[must_use]
pub fn retention_cutoffs(now: DateTime<Utc>) -> RetentionCutoffs {
    RetentionCutoffs {
        revoked_before: now - Duration::days(REVOKED_RETENTION_DAYS),
        idle_before: now - Duration::days(IDLE_RETENTION_DAYS),
        created_before: now - Duration::days(MAX_AGE_DAYS),
    }
}

/// Create a new session token for the issued credential.
/// The raw value is only returned to the caller; the database stores a hash.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// One-way hash bound to the issued credential; the raw token is never stored.
#[must_use]
pub fn hash_token(raw_token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_boundaries_straddle_the_cutoffs() {
        let now = Utc::now();
        let cutoffs = retention_cutoffs(now);

        // Revoked 31 days ago is purged, 29 days ago is kept.
        assert!(now - Duration::days(31) < cutoffs.revoked_before);
        assert!(now - Duration::days(29) > cutoffs.revoked_before);

        assert!(now - Duration::days(8) < cutoffs.idle_before);
        assert!(now - Duration::days(6) > cutoffs.idle_before);

        assert!(now - Duration::days(91) < cutoffs.created_before);
        assert!(now - Duration::days(89) > cutoffs.created_before);
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let first = generate_token().expect("token");
        let second = generate_token().expect("token");
        assert_ne!(first, second);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn token_hash_is_stable_and_one_way() {
        let first = hash_token("raw-token");
        let second = hash_token("raw-token");
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert_ne!(first, hash_token("other-token"));
    }
}
