//! Database access for IP reputation records.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::Instrument;

use crate::reputation::models::{IpReputationRecord, ReputationQuery, ReputationStatistics};

pub struct ReputationRepo;

impl ReputationRepo {
    /// Fetch the record for one address, if ever seen.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get(pool: &PgPool, ip_address: &str) -> Result<Option<IpReputationRecord>> {
        let query = "SELECT * FROM ip_reputation WHERE ip_address = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, IpReputationRecord>(query)
            .bind(ip_address)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch ip reputation record")
    }

    /// Write the full record, creating it on first sighting.
    ///
    /// Plain read-then-write without optimistic concurrency: concurrent
    /// trackers can under-count, which is accepted (conservative by design).
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert(pool: &PgPool, record: &IpReputationRecord) -> Result<()> {
        let query = r"
            INSERT INTO ip_reputation
                (ip_address, reputation_score, failed_login_attempts, successful_logins,
                 rate_limit_violations, abuse_reports, is_blocked, block_reason,
                 blocked_at, blocked_until, first_seen_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (ip_address) DO UPDATE SET
                reputation_score = EXCLUDED.reputation_score,
                failed_login_attempts = EXCLUDED.failed_login_attempts,
                successful_logins = EXCLUDED.successful_logins,
                rate_limit_violations = EXCLUDED.rate_limit_violations,
                abuse_reports = EXCLUDED.abuse_reports,
                is_blocked = EXCLUDED.is_blocked,
                block_reason = EXCLUDED.block_reason,
                blocked_at = EXCLUDED.blocked_at,
                blocked_until = EXCLUDED.blocked_until,
                last_seen_at = EXCLUDED.last_seen_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&record.ip_address)
            .bind(record.reputation_score)
            .bind(record.failed_login_attempts)
            .bind(record.successful_logins)
            .bind(record.rate_limit_violations)
            .bind(record.abuse_reports)
            .bind(record.is_blocked)
            .bind(record.block_reason.as_deref())
            .bind(record.blocked_at)
            .bind(record.blocked_until)
            .bind(record.first_seen_at)
            .bind(record.last_seen_at)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to upsert ip reputation record")?;
        Ok(())
    }

    /// Explicit block, creating the record lazily for unseen addresses.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn set_block(
        pool: &PgPool,
        ip_address: &str,
        reason: &str,
        blocked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO ip_reputation
                (ip_address, is_blocked, block_reason, blocked_at, blocked_until)
            VALUES ($1, TRUE, $2, NOW(), $3)
            ON CONFLICT (ip_address) DO UPDATE SET
                is_blocked = TRUE,
                block_reason = EXCLUDED.block_reason,
                blocked_at = NOW(),
                blocked_until = EXCLUDED.blocked_until,
                last_seen_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(ip_address)
            .bind(reason)
            .bind(blocked_until)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to block ip")?;
        Ok(())
    }

    /// Clear any block on one address. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn clear_block(pool: &PgPool, ip_address: &str) -> Result<()> {
        let query = r"
            UPDATE ip_reputation
            SET is_blocked = FALSE,
                block_reason = NULL,
                blocked_at = NULL,
                blocked_until = NULL
            WHERE ip_address = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(ip_address)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to unblock ip")?;
        Ok(())
    }

    /// Unblock every record whose temporary block has lapsed.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn clear_expired_blocks(pool: &PgPool, now: DateTime<Utc>) -> Result<u64> {
        let query = r"
            UPDATE ip_reputation
            SET is_blocked = FALSE,
                block_reason = NULL,
                blocked_at = NULL,
                blocked_until = NULL
            WHERE is_blocked = TRUE
              AND blocked_until IS NOT NULL
              AND blocked_until <= $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to clear expired blocks")?;
        Ok(result.rows_affected())
    }

    /// Records below full score, candidates for reputation recovery.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn below_full_score(pool: &PgPool) -> Result<Vec<IpReputationRecord>> {
        let query = "SELECT * FROM ip_reputation WHERE reputation_score < 100";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, IpReputationRecord>(query)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to fetch recovery candidates")
    }

    /// Operator listing with optional score/block filters.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query(
        pool: &PgPool,
        filters: &ReputationQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<IpReputationRecord>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM ip_reputation WHERE 1 = 1");
        if filters.blocked_only.unwrap_or(false) {
            builder.push(" AND is_blocked = TRUE");
        }
        if let Some(min_score) = filters.min_score {
            builder.push(" AND reputation_score >= ");
            builder.push_bind(min_score);
        }
        if let Some(max_score) = filters.max_score {
            builder.push(" AND reputation_score <= ");
            builder.push_bind(max_score);
        }
        builder.push(" ORDER BY reputation_score ASC, last_seen_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        builder
            .build_query_as::<IpReputationRecord>()
            .fetch_all(pool)
            .await
            .context("failed to query ip reputation records")
    }

    /// Aggregates for the operator dashboard.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn statistics(pool: &PgPool) -> Result<ReputationStatistics> {
        let query = r"
            SELECT COUNT(*) AS tracked_ips,
                   COUNT(*) FILTER (WHERE is_blocked) AS blocked_ips,
                   COALESCE(AVG(reputation_score), 100)::FLOAT8 AS average_score,
                   COALESCE(SUM(rate_limit_violations), 0) AS total_rate_limit_violations,
                   COALESCE(SUM(abuse_reports), 0) AS total_abuse_reports
            FROM ip_reputation
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(pool)
            .instrument(span)
            .await
            .context("failed to aggregate ip reputation statistics")?;
        Ok(ReputationStatistics {
            tracked_ips: row.get("tracked_ips"),
            blocked_ips: row.get("blocked_ips"),
            average_score: row.get("average_score"),
            total_rate_limit_violations: row.get("total_rate_limit_violations"),
            total_abuse_reports: row.get("total_abuse_reports"),
        })
    }
}
