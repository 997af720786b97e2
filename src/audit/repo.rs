//! Database access for the append-only audit log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::Instrument;

use crate::audit::models::{AuditEvent, AuditLogEntry, AuditQuery, CountBucket};

pub struct AuditRepo;

impl AuditRepo {
    /// Append one entry to the audit log.
    ///
    /// # Errors
    /// Returns an error if the insert fails; callers on the request path go
    /// through [`crate::audit::AuditRecorder`], which absorbs the failure.
    pub async fn insert_entry(pool: &PgPool, event: &AuditEvent) -> Result<()> {
        let query = r"
            INSERT INTO audit_log
                (event_type, actor_type, actor_id, actor_email, target_type, target_id,
                 action, status, ip_address, user_agent, session_id, request_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(event.event_type.as_str())
            .bind(event.actor_type.as_str())
            .bind(event.actor_id)
            .bind(event.actor_email.as_deref())
            .bind(event.target_type.as_deref())
            .bind(event.target_id.as_deref())
            .bind(&event.action)
            .bind(event.status.as_str())
            .bind(event.ip_address.as_deref())
            .bind(event.user_agent.as_deref())
            .bind(event.session_id)
            .bind(event.request_id.as_deref())
            .bind(event.metadata.as_ref())
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to insert audit log entry")?;
        Ok(())
    }

    /// Paginated query, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query(
        pool: &PgPool,
        filters: &AuditQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLogEntry>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM audit_log WHERE 1 = 1");
        push_filters(&mut builder, filters);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        builder
            .build_query_as::<AuditLogEntry>()
            .fetch_all(pool)
            .await
            .context("failed to query audit log")
    }

    /// Total entries matching the filters.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count(pool: &PgPool, filters: &AuditQuery) -> Result<i64> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM audit_log WHERE 1 = 1");
        push_filters(&mut builder, filters);
        let row = builder
            .build()
            .fetch_one(pool)
            .await
            .context("failed to count audit log entries")?;
        Ok(row.get("total"))
    }

    /// Entry counts grouped by `status`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_by_status(pool: &PgPool, filters: &AuditQuery) -> Result<Vec<CountBucket>> {
        grouped_count(pool, "status", filters).await
    }

    /// Entry counts grouped by `event_type`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_by_event_type(
        pool: &PgPool,
        filters: &AuditQuery,
    ) -> Result<Vec<CountBucket>> {
        grouped_count(pool, "event_type", filters).await
    }

    /// Bulk-purge entries past the retention cutoff. Returns the deleted count.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn delete_older_than(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM audit_log WHERE created_at < $1";
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
            .context("failed to purge audit log entries")?;
        Ok(result.rows_affected())
    }
}

async fn grouped_count(
    pool: &PgPool,
    column: &str,
    filters: &AuditQuery,
) -> Result<Vec<CountBucket>> {
    // `column` is a compile-time constant at every call site, never user input.
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {column} AS key, COUNT(*) AS count FROM audit_log WHERE 1 = 1"
    ));
    push_filters(&mut builder, filters);
    builder.push(format!(" GROUP BY {column} ORDER BY count DESC"));

    let rows = builder
        .build()
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to count audit log entries by {column}"))?;

    Ok(rows
        .into_iter()
        .map(|row| CountBucket {
            key: row.get("key"),
            count: row.get("count"),
        })
        .collect())
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &AuditQuery) {
    if let Some(actor_id) = filters.actor_id {
        builder.push(" AND actor_id = ");
        builder.push_bind(actor_id);
    }
    if let Some(event_types) = &filters.event_types {
        let names: Vec<String> = event_types
            .iter()
            .map(|event_type| event_type.as_str().to_string())
            .collect();
        builder.push(" AND event_type = ANY(");
        builder.push_bind(names);
        builder.push(")");
    }
    if let Some(status) = filters.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(ip_address) = &filters.ip_address {
        builder.push(" AND ip_address = ");
        builder.push_bind(ip_address.clone());
    }
    if let Some(session_id) = filters.session_id {
        builder.push(" AND session_id = ");
        builder.push_bind(session_id);
    }
    if let Some(from) = filters.from {
        builder.push(" AND created_at >= ");
        builder.push_bind(from);
    }
    if let Some(to) = filters.to {
        builder.push(" AND created_at <= ");
        builder.push_bind(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::{AuditEventType, AuditStatus};
    use uuid::Uuid;

    fn rendered_sql(filters: &AuditQuery) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM audit_log WHERE 1 = 1");
        push_filters(&mut builder, filters);
        builder.sql().to_string()
    }

    #[test]
    fn no_filters_keeps_base_query() {
        let sql = rendered_sql(&AuditQuery::default());
        assert_eq!(sql, "SELECT * FROM audit_log WHERE 1 = 1");
    }

    #[test]
    fn all_filters_render_placeholders() {
        let filters = AuditQuery {
            actor_id: Some(Uuid::nil()),
            event_types: Some(vec![AuditEventType::LoginFailure]),
            status: Some(AuditStatus::Failure),
            ip_address: Some("1.2.3.4".to_string()),
            session_id: Some(Uuid::nil()),
            from: Some(chrono::Utc::now()),
            to: Some(chrono::Utc::now()),
            limit: None,
            offset: None,
        };
        let sql = rendered_sql(&filters);
        assert!(sql.contains("actor_id = $1"));
        assert!(sql.contains("event_type = ANY($2)"));
        assert!(sql.contains("status = $3"));
        assert!(sql.contains("ip_address = $4"));
        assert!(sql.contains("session_id = $5"));
        assert!(sql.contains("created_at >= $6"));
        assert!(sql.contains("created_at <= $7"));
    }
}
