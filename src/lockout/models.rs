//! Login attempt ledger rows and the derived lockout projection.
//!
//! Lockout is never persisted as a flag on the ledger side: it is a pure
//! function over the trailing run of attempt rows, which keeps the state
//! auditable and replayable.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Consecutive failures that trigger a lockout.
pub const MAX_ATTEMPTS: i32 = 5;
/// How long an account stays locked after triggering.
pub const LOCKOUT_DURATION_MINUTES: i64 = 15;
/// Sliding window for counting consecutive failures.
pub const ATTEMPT_WINDOW_MINUTES: i64 = 30;
/// Reason written to the customer record when a lockout triggers.
pub const LOCK_REASON: &str = "Too many failed login attempts";

/// One immutable ledger row per login attempt.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct LoginAttemptRecord {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub device_browser: Option<String>,
    pub consecutive_failures: i32,
    pub triggered_lockout: bool,
    pub attempted_at: DateTime<Utc>,
}

/// Fields computed at write time for a new ledger row.
#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub device_browser: Option<String>,
    pub consecutive_failures: i32,
    pub triggered_lockout: bool,
}

/// Derived lockout state for one email.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LockoutStatus {
    pub is_locked: bool,
    pub failed_attempts: i32,
    pub remaining_seconds: i64,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    #[must_use]
    pub fn unlocked(failed_attempts: i32) -> Self {
        Self {
            is_locked: false,
            failed_attempts,
            remaining_seconds: 0,
            locked_until: None,
        }
    }

    /// User-facing remaining-time message, rounded up to whole minutes.
    #[must_use]
    pub fn human_message(&self) -> String {
        if !self.is_locked {
            return "Account is not locked".to_string();
        }
        let minutes = (self.remaining_seconds + 59) / 60;
        if minutes <= 1 {
            "Account locked. Try again in 1 minute".to_string()
        } else {
            format!("Account locked. Try again in {minutes} minutes")
        }
    }
}

/// Whether appending an attempt with this failure run triggers a lockout.
#[must_use]
pub fn triggers_lockout(success: bool, consecutive_failures: i32) -> bool {
    !success && consecutive_failures >= MAX_ATTEMPTS
}

/// Count the trailing run of failures over rows ordered newest first.
///
/// Stops at the first success; callers pass only rows inside the sliding
/// window, so the window boundary is already applied.
#[must_use]
pub fn consecutive_failures(rows_newest_first: &[LoginAttemptRecord]) -> i32 {
    let mut count = 0;
    for row in rows_newest_first {
        if row.success {
            break;
        }
        count += 1;
    }
    count
}

/// Project the lockout state from the most recent trigger row.
///
/// `lockout_cleared` reports whether a later success or an admin unlock
/// already released the account.
#[must_use]
pub fn derive_lockout(
    last_triggered_at: Option<DateTime<Utc>>,
    lockout_cleared: bool,
    recent_failures: i32,
    now: DateTime<Utc>,
) -> LockoutStatus {
    let Some(triggered_at) = last_triggered_at else {
        return LockoutStatus::unlocked(recent_failures);
    };
    if lockout_cleared {
        return LockoutStatus::unlocked(recent_failures);
    }
    let locked_until = triggered_at + Duration::minutes(LOCKOUT_DURATION_MINUTES);
    if now >= locked_until {
        // Lockout elapsed; the failure run is considered reset.
        return LockoutStatus::unlocked(0);
    }
    LockoutStatus {
        is_locked: true,
        failed_attempts: recent_failures,
        remaining_seconds: (locked_until - now).num_seconds(),
        locked_until: Some(locked_until),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(success: bool, minutes_ago: i64) -> LoginAttemptRecord {
        LoginAttemptRecord {
            id: Uuid::new_v4(),
            customer_id: None,
            email: "a@b.com".to_string(),
            success,
            failure_reason: None,
            ip_address: "1.2.3.4".to_string(),
            user_agent: None,
            device_type: None,
            device_browser: None,
            consecutive_failures: 0,
            triggered_lockout: false,
            attempted_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn counts_trailing_failures_until_first_success() {
        let rows = vec![row(false, 1), row(false, 2), row(true, 3), row(false, 4)];
        assert_eq!(consecutive_failures(&rows), 2);
    }

    #[test]
    fn success_on_top_resets_the_run() {
        let rows = vec![row(true, 1), row(false, 2), row(false, 3)];
        assert_eq!(consecutive_failures(&rows), 0);
    }

    #[test]
    fn all_failures_count_fully() {
        let rows = vec![row(false, 1), row(false, 5), row(false, 9), row(false, 10)];
        assert_eq!(consecutive_failures(&rows), 4);
    }

    #[test]
    fn lockout_triggers_on_the_fifth_failure() {
        assert!(!triggers_lockout(false, MAX_ATTEMPTS - 1));
        assert!(triggers_lockout(false, MAX_ATTEMPTS));
        assert!(triggers_lockout(false, MAX_ATTEMPTS + 1));
        assert!(!triggers_lockout(true, MAX_ATTEMPTS));
    }

    #[test]
    fn no_trigger_row_means_unlocked() {
        let status = derive_lockout(None, false, 3, Utc::now());
        assert!(!status.is_locked);
        assert_eq!(status.failed_attempts, 3);
    }

    #[test]
    fn fresh_trigger_reports_locked_with_remaining_time() {
        let now = Utc::now();
        let status = derive_lockout(Some(now - Duration::minutes(5)), false, 5, now);
        assert!(status.is_locked);
        assert!(status.remaining_seconds > 0);
        assert!(status.remaining_seconds <= 10 * 60);
    }

    #[test]
    fn elapsed_lockout_reports_unlocked_with_reset_failures() {
        let now = Utc::now();
        let status = derive_lockout(
            Some(now - Duration::minutes(LOCKOUT_DURATION_MINUTES + 1)),
            false,
            5,
            now,
        );
        assert!(!status.is_locked);
        assert_eq!(status.failed_attempts, 0);
        assert_eq!(status.remaining_seconds, 0);
    }

    #[test]
    fn cleared_lockout_reports_unlocked() {
        let now = Utc::now();
        let status = derive_lockout(Some(now - Duration::minutes(2)), true, 0, now);
        assert!(!status.is_locked);
    }

    #[test]
    fn human_message_rounds_up_to_minutes() {
        let status = LockoutStatus {
            is_locked: true,
            failed_attempts: 5,
            remaining_seconds: 14 * 60 + 30,
            locked_until: None,
        };
        assert_eq!(
            status.human_message(),
            "Account locked. Try again in 15 minutes"
        );

        let status = LockoutStatus {
            remaining_seconds: 40,
            ..status
        };
        assert_eq!(
            status.human_message(),
            "Account locked. Try again in 1 minute"
        );
    }
}
