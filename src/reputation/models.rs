//! Per-IP reputation scoring and block state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Records dropping below this score are blocked automatically.
pub const AUTO_BLOCK_THRESHOLD: i32 = 20;
/// Below this score the adaptive rate limiter halves the quota.
pub const SUSPICIOUS_THRESHOLD: i32 = 50;
/// Block reason written by the automatic path.
pub const AUTO_BLOCK_REASON: &str = "Automatic block due to low reputation score";

/// Tracked action kinds feeding the lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReputationAction {
    Login,
    RateLimit,
    AbuseReport,
    ApiRequest,
}

/// Deterministic score over the lifetime counters, clamped to [0, 100].
#[must_use]
pub fn compute_score(
    failed_login_attempts: i64,
    successful_logins: i64,
    rate_limit_violations: i64,
    abuse_reports: i64,
) -> i32 {
    let raw = 100
        - 5 * failed_login_attempts
        - 10 * rate_limit_violations
        - 20 * abuse_reports
        + 2 * successful_logins;
    i32::try_from(raw.clamp(0, 100)).unwrap_or(0)
}

/// One row per IP address ever seen by the engine.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct IpReputationRecord {
    pub ip_address: String,
    pub reputation_score: i32,
    pub failed_login_attempts: i64,
    pub successful_logins: i64,
    pub rate_limit_violations: i64,
    pub abuse_reports: i64,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl IpReputationRecord {
    /// Fresh record for a first sighting, and the virtual default returned
    /// for addresses that were never seen.
    #[must_use]
    pub fn new(ip_address: &str, now: DateTime<Utc>) -> Self {
        Self {
            ip_address: ip_address.to_string(),
            reputation_score: 100,
            failed_login_attempts: 0,
            successful_logins: 0,
            rate_limit_violations: 0,
            abuse_reports: 0,
            is_blocked: false,
            block_reason: None,
            blocked_at: None,
            blocked_until: None,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Whether the record carries a block that is still in force at `now`.
    /// `blocked_until = None` means permanent.
    #[must_use]
    pub fn has_active_block(&self, now: DateTime<Utc>) -> bool {
        self.is_blocked
            && self
                .blocked_until
                .is_none_or(|blocked_until| blocked_until > now)
    }

    /// Whether the record carries a temporary block whose window has passed.
    #[must_use]
    pub fn block_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_blocked
            && self
                .blocked_until
                .is_some_and(|blocked_until| blocked_until <= now)
    }

    /// Apply one tracked action: bump the matching counter, recompute the
    /// score, auto-block when it falls under the threshold.
    ///
    /// Returns true when this call newly blocked the address.
    pub fn apply_action(
        &mut self,
        action: ReputationAction,
        success: bool,
        now: DateTime<Utc>,
    ) -> bool {
        match action {
            ReputationAction::Login => {
                if success {
                    self.successful_logins += 1;
                } else {
                    self.failed_login_attempts += 1;
                }
            }
            ReputationAction::RateLimit => self.rate_limit_violations += 1,
            ReputationAction::AbuseReport => self.abuse_reports += 1,
            ReputationAction::ApiRequest => {}
        }
        self.last_seen_at = now;
        self.reputation_score = self.recomputed_score();

        if self.reputation_score < AUTO_BLOCK_THRESHOLD && !self.is_blocked {
            self.is_blocked = true;
            self.block_reason = Some(AUTO_BLOCK_REASON.to_string());
            self.blocked_at = Some(now);
            // Permanent until manual or automated recovery.
            self.blocked_until = None;
            return true;
        }
        false
    }

    /// Reputation recovery: decay the negative counters by 20% and recompute.
    ///
    /// Decaying the counters instead of adding points to the stored score
    /// keeps the score consistent with the next recompute in `apply_action`.
    /// Returns true when the score improved.
    pub fn recover(&mut self) -> bool {
        let before = self.reputation_score;
        self.failed_login_attempts = self.failed_login_attempts * 4 / 5;
        self.rate_limit_violations = self.rate_limit_violations * 4 / 5;
        self.abuse_reports = self.abuse_reports * 4 / 5;
        self.reputation_score = self.recomputed_score();
        self.reputation_score > before
    }

    fn recomputed_score(&self) -> i32 {
        compute_score(
            self.failed_login_attempts,
            self.successful_logins,
            self.rate_limit_violations,
            self.abuse_reports,
        )
    }
}

/// Filters for the operator listing endpoint.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReputationQuery {
    pub blocked_only: Option<bool>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Aggregates for operator dashboards.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReputationStatistics {
    pub tracked_ips: i64,
    pub blocked_ips: i64,
    pub average_score: f64,
    pub total_rate_limit_violations: i64,
    pub total_abuse_reports: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn score_formula_matches_counters() {
        assert_eq!(compute_score(0, 0, 0, 0), 100);
        assert_eq!(compute_score(4, 0, 0, 0), 80);
        assert_eq!(compute_score(0, 0, 3, 0), 70);
        assert_eq!(compute_score(0, 0, 3, 2), 30);
        assert_eq!(compute_score(0, 0, 3, 3), 10);
    }

    #[test]
    fn score_is_clamped_to_bounds() {
        assert_eq!(compute_score(1000, 0, 0, 0), 0);
        assert_eq!(compute_score(0, 1000, 0, 0), 100);
    }

    #[test]
    fn successful_logins_offset_failures() {
        // 100 - 5*10 + 2*5 = 60
        assert_eq!(compute_score(10, 5, 0, 0), 60);
    }

    #[test]
    fn tracked_actions_bump_the_right_counter() {
        let now = Utc::now();
        let mut record = IpReputationRecord::new("1.2.3.4", now);
        record.apply_action(ReputationAction::Login, false, now);
        record.apply_action(ReputationAction::Login, true, now);
        record.apply_action(ReputationAction::RateLimit, false, now);
        record.apply_action(ReputationAction::AbuseReport, false, now);
        record.apply_action(ReputationAction::ApiRequest, true, now);
        assert_eq!(record.failed_login_attempts, 1);
        assert_eq!(record.successful_logins, 1);
        assert_eq!(record.rate_limit_violations, 1);
        assert_eq!(record.abuse_reports, 1);
        assert_eq!(record.reputation_score, compute_score(1, 1, 1, 1));
    }

    #[test]
    fn descent_to_low_score_blocks_automatically() {
        // 1.2.3.4 starts at 100; 3 rate-limit violations -> 70, 2 abuse
        // reports -> 30, one more abuse report -> 10 and auto-block.
        let now = Utc::now();
        let mut record = IpReputationRecord::new("1.2.3.4", now);
        for _ in 0..3 {
            assert!(!record.apply_action(ReputationAction::RateLimit, false, now));
        }
        assert_eq!(record.reputation_score, 70);
        assert!(!record.is_blocked);

        for _ in 0..2 {
            assert!(!record.apply_action(ReputationAction::AbuseReport, false, now));
        }
        assert_eq!(record.reputation_score, 30);
        assert!(!record.is_blocked);

        assert!(record.apply_action(ReputationAction::AbuseReport, false, now));
        assert_eq!(record.reputation_score, 10);
        assert!(record.is_blocked);
        assert_eq!(record.block_reason.as_deref(), Some(AUTO_BLOCK_REASON));
        assert!(record.blocked_until.is_none());
    }

    #[test]
    fn already_blocked_record_is_not_reblocked() {
        let now = Utc::now();
        let mut record = IpReputationRecord::new("1.2.3.4", now);
        record.is_blocked = true;
        record.block_reason = Some("manual".to_string());
        record.failed_login_attempts = 20;
        assert!(!record.apply_action(ReputationAction::Login, false, now));
        assert_eq!(record.block_reason.as_deref(), Some("manual"));
    }

    #[test]
    fn temporary_block_expiry_is_detected() {
        let now = Utc::now();
        let mut record = IpReputationRecord::new("1.2.3.4", now);
        record.is_blocked = true;
        record.blocked_until = Some(now - Duration::minutes(1));
        assert!(record.block_expired(now));
        assert!(!record.has_active_block(now));

        record.blocked_until = Some(now + Duration::hours(1));
        assert!(record.has_active_block(now));

        record.blocked_until = None;
        assert!(record.has_active_block(now));
        assert!(!record.block_expired(now));
    }

    #[test]
    fn recovery_decays_counters_and_improves_score() {
        let now = Utc::now();
        let mut record = IpReputationRecord::new("1.2.3.4", now);
        record.failed_login_attempts = 10;
        record.reputation_score = compute_score(10, 0, 0, 0);
        assert_eq!(record.reputation_score, 50);

        assert!(record.recover());
        assert_eq!(record.failed_login_attempts, 8);
        assert_eq!(record.reputation_score, 60);
        // Score stays the deterministic function of the counters.
        assert_eq!(record.reputation_score, compute_score(8, 0, 0, 0));
    }

    #[test]
    fn recovery_is_a_noop_at_full_score() {
        let now = Utc::now();
        let mut record = IpReputationRecord::new("1.2.3.4", now);
        assert!(!record.recover());
        assert_eq!(record.reputation_score, 100);
    }
}
