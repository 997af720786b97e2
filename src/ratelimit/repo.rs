//! Shared-store fixed-window request counters.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

pub struct RateLimitRepo;

impl RateLimitRepo {
    /// Atomically bump the counter for `(ip, window)` and return the new
    /// count; the first request in a window creates the row with count 1.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn increment_window(
        pool: &PgPool,
        ip_address: &str,
        window_start: DateTime<Utc>,
    ) -> Result<i64> {
        let query = r"
            INSERT INTO rate_limit_windows (ip_address, window_start, request_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (ip_address, window_start)
            DO UPDATE SET request_count = rate_limit_windows.request_count + 1
            RETURNING request_count
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(ip_address)
            .bind(window_start)
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to increment rate limit window")?;
        Ok(row.get("request_count"))
    }

    /// Drop counters for windows that ended before `cutoff`.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn purge_stale_windows(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM rate_limit_windows WHERE window_start < $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(cutoff)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to purge stale rate limit windows")?;
        Ok(result.rows_affected())
    }
}
