//! Periodic retention jobs on independent timers.
//!
//! Each loop invokes one idempotent cleanup operation. There is no ordering
//! dependency between jobs and no distributed lock: replicas may all run
//! their own timers, redundant execution is safe.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::audit::AuditService;
use crate::ratelimit::repo::RateLimitRepo;
use crate::reputation::ReputationService;
use crate::sessions::SessionService;

/// Stale window counters are dropped after this many hours.
const WINDOW_RETENTION_HOURS: i64 = 24;

#[derive(Clone, Copy, Debug)]
pub struct CleanupConfig {
    reputation_interval: Duration,
    session_interval: Duration,
    audit_interval: Duration,
}

impl CleanupConfig {
    /// Defaults: hourly block/recovery and session sweeps, daily audit purge.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reputation_interval: Duration::from_secs(60 * 60),
            session_interval: Duration::from_secs(60 * 60),
            audit_interval: Duration::from_secs(24 * 60 * 60),
        }
    }

    #[must_use]
    pub fn with_reputation_interval_seconds(mut self, seconds: u64) -> Self {
        self.reputation_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_session_interval_seconds(mut self, seconds: u64) -> Self {
        self.session_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_audit_interval_seconds(mut self, seconds: u64) -> Self {
        self.audit_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let floor = Duration::from_secs(1);
        Self {
            reputation_interval: self.reputation_interval.max(floor),
            session_interval: self.session_interval.max(floor),
            audit_interval: self.audit_interval.max(floor),
        }
    }

    #[must_use]
    pub fn reputation_interval(&self) -> Duration {
        self.reputation_interval
    }

    #[must_use]
    pub fn session_interval(&self) -> Duration {
        self.session_interval
    }

    #[must_use]
    pub fn audit_interval(&self) -> Duration {
        self.audit_interval
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the three independent cleanup loops.
pub fn spawn_cleanup_workers(
    pool: PgPool,
    reputation: ReputationService,
    sessions: SessionService,
    audit: AuditService,
    config: CleanupConfig,
) {
    let config = config.normalize();

    let interval = config.reputation_interval();
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match reputation.cleanup_expired_blocks().await {
                Ok(outcome) => info!(
                    unblocked = outcome.unblocked,
                    improved = outcome.improved,
                    "reputation cleanup finished"
                ),
                Err(err) => error!("reputation cleanup failed: {err:#}"),
            }
            let cutoff = Utc::now() - ChronoDuration::hours(WINDOW_RETENTION_HOURS);
            if let Err(err) = RateLimitRepo::purge_stale_windows(&pool, cutoff).await {
                error!("rate limit window purge failed: {err:#}");
            }
        }
    });

    let interval = config.session_interval();
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match sessions.cleanup_sessions().await {
                Ok(purged) => info!(purged, "session cleanup finished"),
                Err(err) => error!("session cleanup failed: {err:#}"),
            }
        }
    });

    let interval = config.audit_interval();
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match audit.cleanup().await {
                Ok(deleted) => info!(deleted, "audit retention sweep finished"),
                Err(err) => error!("audit retention sweep failed: {err:#}"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CleanupConfig::new();
        assert_eq!(config.reputation_interval(), Duration::from_secs(3600));
        assert_eq!(config.audit_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn normalize_floors_zero_intervals() {
        let config = CleanupConfig::new()
            .with_session_interval_seconds(0)
            .normalize();
        assert_eq!(config.session_interval(), Duration::from_secs(1));
    }
}
