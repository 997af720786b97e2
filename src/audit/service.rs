//! Query, export, statistics, and retention for the audit log.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::audit::export;
use crate::audit::models::{AuditLogEntry, AuditQuery, AuditStatistics};
use crate::audit::repo::AuditRepo;

/// Entries are kept for 90 days, then bulk-purged.
pub const RETENTION_DAYS: i64 = 90;
/// Hard cap for a single export, regardless of filters.
pub const EXPORT_LIMIT: i64 = 10_000;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Paginated query, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query(&self, filters: &AuditQuery) -> Result<Vec<AuditLogEntry>> {
        let limit = page_limit(filters.limit);
        let offset = filters.offset.unwrap_or(0).max(0);
        AuditRepo::query(&self.pool, filters, limit, offset).await
    }

    /// Export matching entries as a JSON array, capped at [`EXPORT_LIMIT`].
    ///
    /// # Errors
    /// Returns an error if the query or serialization fails.
    pub async fn export_json(&self, filters: &AuditQuery) -> Result<String> {
        let entries = AuditRepo::query(&self.pool, filters, EXPORT_LIMIT, 0).await?;
        export::to_json(&entries)
    }

    /// Export matching entries as CSV, capped at [`EXPORT_LIMIT`].
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn export_csv(&self, filters: &AuditQuery) -> Result<String> {
        let entries = AuditRepo::query(&self.pool, filters, EXPORT_LIMIT, 0).await?;
        Ok(export::to_csv(&entries))
    }

    /// Counts by status and by event type for the matching entries.
    ///
    /// # Errors
    /// Returns an error if any aggregate query fails.
    pub async fn get_statistics(&self, filters: &AuditQuery) -> Result<AuditStatistics> {
        let total = AuditRepo::count(&self.pool, filters).await?;
        let by_status = AuditRepo::count_by_status(&self.pool, filters).await?;
        let by_event_type = AuditRepo::count_by_event_type(&self.pool, filters).await?;
        Ok(AuditStatistics {
            total,
            by_status,
            by_event_type,
        })
    }

    /// Purge entries older than [`RETENTION_DAYS`]. Returns the deleted count.
    ///
    /// Safe to run redundantly on multiple replicas.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn cleanup(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        AuditRepo::delete_older_than(&self.pool, cutoff).await
    }
}

fn page_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_defaults_and_clamps() {
        assert_eq!(page_limit(None), DEFAULT_PAGE_SIZE);
        assert_eq!(page_limit(Some(10)), 10);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(-5)), 1);
        assert_eq!(page_limit(Some(10_000)), MAX_PAGE_SIZE);
    }
}
