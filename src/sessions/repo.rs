//! Database access for login sessions.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::sessions::device::DeviceFingerprint;
use crate::sessions::models::{RetentionCutoffs, Session};

pub struct SessionRepo;

impl SessionRepo {
    /// Insert a session with a placeholder token hash; the hash is bound
    /// after credential issuance. Returns the new session id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(
        pool: &PgPool,
        customer_id: Uuid,
        fingerprint: &DeviceFingerprint,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Uuid> {
        let query = r"
            INSERT INTO sessions
                (customer_id, device_type, browser, browser_version, os_name, os_version,
                 ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(customer_id)
            .bind(&fingerprint.device_type)
            .bind(fingerprint.browser.as_deref())
            .bind(fingerprint.browser_version.as_deref())
            .bind(fingerprint.os_name.as_deref())
            .bind(fingerprint.os_version.as_deref())
            .bind(ip_address)
            .bind(user_agent)
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(row.get("id"))
    }

    /// Bind the one-way token hash to the session.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_token_hash(pool: &PgPool, session_id: Uuid, token_hash: &[u8]) -> Result<()> {
        let query = "UPDATE sessions SET token_hash = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .bind(token_hash)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to set session token hash")?;
        Ok(())
    }

    /// Fetch the session if it is still active.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_active(pool: &PgPool, session_id: Uuid) -> Result<Option<Session>> {
        let query = "SELECT * FROM sessions WHERE id = $1 AND is_active = TRUE";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Session>(query)
            .bind(session_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch session")
    }

    /// Bump the activity timestamp.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn touch_activity(pool: &PgPool, session_id: Uuid) -> Result<()> {
        let query = "UPDATE sessions SET last_activity_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to update session activity")?;
        Ok(())
    }

    /// Active sessions for one customer, most recent activity first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn active_for_customer(pool: &PgPool, customer_id: Uuid) -> Result<Vec<Session>> {
        let query = r"
            SELECT * FROM sessions
            WHERE customer_id = $1
              AND is_active = TRUE
            ORDER BY last_activity_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Session>(query)
            .bind(customer_id)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to list active sessions")
    }

    /// Revoke one session. Idempotent; already-revoked rows are untouched.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke(pool: &PgPool, session_id: Uuid, reason: &str) -> Result<u64> {
        let query = r"
            UPDATE sessions
            SET is_active = FALSE,
                revoked_at = NOW(),
                revoke_reason = $2
            WHERE id = $1
              AND is_active = TRUE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(reason)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected())
    }

    /// Revoke every active session for the customer except `except_id`.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke_others(
        pool: &PgPool,
        customer_id: Uuid,
        except_id: Uuid,
        reason: &str,
    ) -> Result<u64> {
        let query = r"
            UPDATE sessions
            SET is_active = FALSE,
                revoked_at = NOW(),
                revoke_reason = $3
            WHERE customer_id = $1
              AND id != $2
              AND is_active = TRUE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(customer_id)
            .bind(except_id)
            .bind(reason)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to revoke other sessions")?;
        Ok(result.rows_affected())
    }

    /// Revoke every active session for the customer.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke_all(pool: &PgPool, customer_id: Uuid, reason: &str) -> Result<u64> {
        let query = r"
            UPDATE sessions
            SET is_active = FALSE,
                revoked_at = NOW(),
                revoke_reason = $2
            WHERE customer_id = $1
              AND is_active = TRUE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(customer_id)
            .bind(reason)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to revoke all sessions")?;
        Ok(result.rows_affected())
    }

    /// Delete rows matching any retention rule. Returns the deleted count.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn purge(pool: &PgPool, cutoffs: RetentionCutoffs) -> Result<u64> {
        let query = r"
            DELETE FROM sessions
            WHERE (revoked_at IS NOT NULL AND revoked_at < $1)
               OR (is_active = FALSE AND last_activity_at < $2)
               OR (login_at < $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(cutoffs.revoked_before)
            .bind(cutoffs.idle_before)
            .bind(cutoffs.created_before)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to purge sessions")?;
        Ok(result.rows_affected())
    }
}
