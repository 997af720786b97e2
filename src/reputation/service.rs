//! IP reputation engine: tracking, blocking, recovery.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::audit::{ActorType, AuditEvent, AuditEventType, AuditRecorder, AuditStatus};
use crate::reputation::models::{
    IpReputationRecord, ReputationAction, ReputationQuery, ReputationStatistics,
};
use crate::reputation::repo::ReputationRepo;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

/// Counts reported by the periodic block/recovery sweep.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ReputationCleanup {
    pub unblocked: u64,
    pub improved: u64,
}

#[derive(Clone)]
pub struct ReputationService {
    pool: PgPool,
    recorder: AuditRecorder,
}

impl ReputationService {
    #[must_use]
    pub fn new(pool: PgPool, recorder: AuditRecorder) -> Self {
        Self { pool, recorder }
    }

    /// Track one action for an address: bump counters, recompute the score,
    /// auto-block under the threshold.
    ///
    /// Side-effect only. Failures are logged and swallowed so reputation
    /// bookkeeping can never abort the operation that triggered it.
    pub async fn track_ip(
        &self,
        ip_address: &str,
        action: ReputationAction,
        success: bool,
        metadata: Option<serde_json::Value>,
    ) {
        if let Err(err) = self.track_ip_inner(ip_address, action, success, metadata).await {
            error!(ip_address, "reputation tracking failed: {err:#}");
        }
    }

    async fn track_ip_inner(
        &self,
        ip_address: &str,
        action: ReputationAction,
        success: bool,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut record = ReputationRepo::get(&self.pool, ip_address)
            .await?
            .unwrap_or_else(|| IpReputationRecord::new(ip_address, now));

        let newly_blocked = record.apply_action(action, success, now);
        ReputationRepo::upsert(&self.pool, &record).await?;

        if newly_blocked {
            info!(
                ip_address,
                score = record.reputation_score,
                "ip auto-blocked on low reputation"
            );
            let mut details = serde_json::json!({ "score": record.reputation_score });
            if let Some(metadata) = metadata {
                details["context"] = metadata;
            }
            self.recorder.log(
                AuditEvent::new(
                    AuditEventType::IpBlocked,
                    ActorType::System,
                    "auto_block_ip",
                    AuditStatus::Success,
                )
                .with_target("ip", ip_address)
                .with_ip(ip_address)
                .with_metadata(details),
            );
        }
        Ok(())
    }

    /// Stored record, or the virtual default for an address never seen.
    ///
    /// # Errors
    /// Returns an error if the lookup fails.
    pub async fn get_reputation(&self, ip_address: &str) -> Result<IpReputationRecord> {
        let record = ReputationRepo::get(&self.pool, ip_address).await?;
        Ok(record.unwrap_or_else(|| IpReputationRecord::new(ip_address, Utc::now())))
    }

    /// Whether the address is currently blocked.
    ///
    /// A temporary block whose window has passed is cleared as a side effect
    /// and reported as not blocked.
    ///
    /// # Errors
    /// Returns an error if the lookup or the lazy unblock fails.
    pub async fn is_blocked(&self, ip_address: &str) -> Result<bool> {
        let Some(record) = ReputationRepo::get(&self.pool, ip_address).await? else {
            return Ok(false);
        };
        let now = Utc::now();
        if record.block_expired(now) {
            ReputationRepo::clear_block(&self.pool, ip_address).await?;
            info!(ip_address, "temporary ip block expired");
            return Ok(false);
        }
        Ok(record.has_active_block(now))
    }

    /// Administrative block, independent of the scoring formula.
    /// `duration_hours = None` blocks permanently.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn block_ip(
        &self,
        ip_address: &str,
        reason: &str,
        duration_hours: Option<i64>,
    ) -> Result<()> {
        let blocked_until = duration_hours.map(|hours| Utc::now() + Duration::hours(hours));
        ReputationRepo::set_block(&self.pool, ip_address, reason, blocked_until).await?;
        self.recorder.log(
            AuditEvent::new(
                AuditEventType::IpBlocked,
                ActorType::Admin,
                "block_ip",
                AuditStatus::Success,
            )
            .with_target("ip", ip_address)
            .with_metadata(serde_json::json!({
                "reason": reason,
                "duration_hours": duration_hours,
            })),
        );
        Ok(())
    }

    /// Administrative unblock. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn unblock_ip(&self, ip_address: &str) -> Result<()> {
        ReputationRepo::clear_block(&self.pool, ip_address).await?;
        self.recorder.log(
            AuditEvent::new(
                AuditEventType::IpUnblocked,
                ActorType::Admin,
                "unblock_ip",
                AuditStatus::Success,
            )
            .with_target("ip", ip_address),
        );
        Ok(())
    }

    /// Periodic sweep: lift lapsed temporary blocks and decay counters for
    /// every record below full score ("reputation recovery").
    ///
    /// Safe to run redundantly on multiple replicas.
    ///
    /// # Errors
    /// Returns an error if a storage call fails.
    pub async fn cleanup_expired_blocks(&self) -> Result<ReputationCleanup> {
        let unblocked = ReputationRepo::clear_expired_blocks(&self.pool, Utc::now()).await?;

        let mut improved = 0u64;
        for mut record in ReputationRepo::below_full_score(&self.pool).await? {
            if record.recover() {
                ReputationRepo::upsert(&self.pool, &record).await?;
                improved += 1;
            }
        }
        Ok(ReputationCleanup { unblocked, improved })
    }

    /// Aggregates for operator tooling.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_statistics(&self) -> Result<ReputationStatistics> {
        ReputationRepo::statistics(&self.pool).await
    }

    /// Paginated listing for operator tooling.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query(&self, filters: &ReputationQuery) -> Result<Vec<IpReputationRecord>> {
        let limit = filters
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = filters.offset.unwrap_or(0).max(0);
        ReputationRepo::query(&self.pool, filters, limit, offset).await
    }
}
