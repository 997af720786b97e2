//! Database access for the login attempt ledger and the customer locked flag.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::lockout::models::{LoginAttemptRecord, NewLoginAttempt};

pub struct LockoutRepo;

impl LockoutRepo {
    /// Append one immutable ledger row.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_attempt(pool: &PgPool, attempt: &NewLoginAttempt) -> Result<()> {
        let query = r"
            INSERT INTO login_attempts
                (customer_id, email, success, failure_reason, ip_address, user_agent,
                 device_type, device_browser, consecutive_failures, triggered_lockout)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(attempt.customer_id)
            .bind(&attempt.email)
            .bind(attempt.success)
            .bind(attempt.failure_reason.as_deref())
            .bind(&attempt.ip_address)
            .bind(attempt.user_agent.as_deref())
            .bind(attempt.device_type.as_deref())
            .bind(attempt.device_browser.as_deref())
            .bind(attempt.consecutive_failures)
            .bind(attempt.triggered_lockout)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to insert login attempt")?;
        Ok(())
    }

    /// Ledger rows for one email inside the sliding window, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn recent_attempts(
        pool: &PgPool,
        email: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<LoginAttemptRecord>> {
        let query = r"
            SELECT * FROM login_attempts
            WHERE email = $1
              AND attempted_at >= $2
            ORDER BY attempted_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, LoginAttemptRecord>(query)
            .bind(email)
            .bind(window_start)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to fetch recent login attempts")
    }

    /// Most recent row that triggered a lockout for this email.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn last_lockout(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<LoginAttemptRecord>> {
        let query = r"
            SELECT * FROM login_attempts
            WHERE email = $1
              AND triggered_lockout = TRUE
            ORDER BY attempted_at DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, LoginAttemptRecord>(query)
            .bind(email)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch last lockout row")
    }

    /// Whether a successful attempt exists after `since` for this email.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn success_since(
        pool: &PgPool,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let query = r"
            SELECT 1 AS hit FROM login_attempts
            WHERE email = $1
              AND success = TRUE
              AND attempted_at > $2
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(since)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to check for success after lockout")?;
        Ok(row.is_some())
    }

    /// Set the locked flag on the external customer record.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_customer_locked(
        pool: &PgPool,
        customer_id: Uuid,
        reason: &str,
    ) -> Result<()> {
        let query = r"
            UPDATE customers
            SET locked = TRUE,
                locked_reason = $2,
                locked_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(customer_id)
            .bind(reason)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to lock customer record")?;
        Ok(())
    }

    /// Clear the locked flag by customer id. Returns affected rows; clearing
    /// an already-unlocked record is an idempotent no-op.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn clear_customer_locked(pool: &PgPool, customer_id: Uuid) -> Result<u64> {
        let query = r"
            UPDATE customers
            SET locked = FALSE,
                locked_reason = NULL,
                locked_at = NULL
            WHERE id = $1
              AND locked = TRUE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(customer_id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to unlock customer record")?;
        Ok(result.rows_affected())
    }

    /// Clear the locked flag by email, for the post-login success path.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn clear_customer_locked_by_email(pool: &PgPool, email: &str) -> Result<u64> {
        let query = r"
            UPDATE customers
            SET locked = FALSE,
                locked_reason = NULL,
                locked_at = NULL
            WHERE email = $1
              AND locked = TRUE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(email)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to unlock customer record by email")?;
        Ok(result.rows_affected())
    }

    /// Locked flag for one customer; `None` when the record is absent.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn customer_locked(pool: &PgPool, customer_id: Uuid) -> Result<Option<bool>> {
        let query = "SELECT locked FROM customers WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(customer_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch customer locked flag")?;
        Ok(row.map(|row| row.get("locked")))
    }
}
