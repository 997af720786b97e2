//! Login attempt recording and the lockout state machine.
//!
//! UNLOCKED -> (5 consecutive failures within 30 min) -> LOCKED ->
//! (15 min elapse, a later success, or admin unlock) -> UNLOCKED.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::audit::{ActorType, AuditEvent, AuditEventType, AuditRecorder, AuditStatus};
use crate::lockout::models::{
    consecutive_failures, derive_lockout, triggers_lockout, LockoutStatus, NewLoginAttempt,
    ATTEMPT_WINDOW_MINUTES, LOCK_REASON,
};
use crate::lockout::repo::LockoutRepo;
use crate::sessions::device;

/// Outcome of recording one attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptOutcome {
    pub consecutive_failures: i32,
    pub triggered_lockout: bool,
}

#[derive(Clone)]
pub struct LockoutService {
    pool: PgPool,
    recorder: AuditRecorder,
}

impl LockoutService {
    #[must_use]
    pub fn new(pool: PgPool, recorder: AuditRecorder) -> Self {
        Self { pool, recorder }
    }

    /// Append one ledger row, computing the failure run and lockout trigger
    /// at write time. On trigger with a known customer, the external record
    /// is locked and an `ACCOUNT_LOCKED` event is emitted.
    ///
    /// # Errors
    /// Returns an error if a storage call fails; the authentication path
    /// fails closed on it.
    pub async fn record_attempt(
        &self,
        email: &str,
        success: bool,
        customer_id: Option<Uuid>,
        failure_reason: Option<&str>,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> Result<AttemptOutcome> {
        let consecutive = if success {
            0
        } else {
            self.get_recent_failures(email).await? + 1
        };
        let triggered_lockout = triggers_lockout(success, consecutive);

        let fingerprint = user_agent.map(device::parse_user_agent);
        let attempt = NewLoginAttempt {
            customer_id,
            email: email.to_string(),
            success,
            failure_reason: failure_reason.map(str::to_string),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.map(str::to_string),
            device_type: fingerprint
                .as_ref()
                .map(|fingerprint| fingerprint.device_type.clone()),
            device_browser: fingerprint.as_ref().and_then(|fingerprint| fingerprint.browser.clone()),
            consecutive_failures: consecutive,
            triggered_lockout,
        };
        LockoutRepo::insert_attempt(&self.pool, &attempt).await?;

        if triggered_lockout {
            info!(email, consecutive, "lockout triggered");
            if let Some(customer_id) = customer_id {
                LockoutRepo::set_customer_locked(&self.pool, customer_id, LOCK_REASON).await?;
                self.recorder.log(
                    AuditEvent::new(
                        AuditEventType::AccountLocked,
                        ActorType::System,
                        "lock_account",
                        AuditStatus::Success,
                    )
                    .with_actor(customer_id)
                    .with_actor_email(email)
                    .with_target("customer", &customer_id.to_string())
                    .with_ip(ip_address)
                    .with_metadata(serde_json::json!({ "consecutive_failures": consecutive })),
                );
            }
        }

        Ok(AttemptOutcome {
            consecutive_failures: consecutive,
            triggered_lockout,
        })
    }

    /// Trailing run of failures for this email inside the sliding window.
    ///
    /// # Errors
    /// Returns an error if the ledger query fails.
    pub async fn get_recent_failures(&self, email: &str) -> Result<i32> {
        let window_start = Utc::now() - Duration::minutes(ATTEMPT_WINDOW_MINUTES);
        let rows = LockoutRepo::recent_attempts(&self.pool, email, window_start).await?;
        Ok(consecutive_failures(&rows))
    }

    /// Derived lockout state for this email.
    ///
    /// # Errors
    /// Returns an error if a ledger or customer query fails; the caller
    /// fails closed.
    pub async fn check_lockout_status(&self, email: &str) -> Result<LockoutStatus> {
        let now = Utc::now();
        let recent = self.get_recent_failures(email).await?;
        let Some(trigger) = LockoutRepo::last_lockout(&self.pool, email).await? else {
            return Ok(LockoutStatus::unlocked(recent));
        };

        // A later success releases the lockout; so does an admin unlock,
        // visible through the cleared customer flag.
        let mut cleared =
            LockoutRepo::success_since(&self.pool, email, trigger.attempted_at).await?;
        if !cleared {
            if let Some(customer_id) = trigger.customer_id {
                cleared = matches!(
                    LockoutRepo::customer_locked(&self.pool, customer_id).await?,
                    Some(false)
                );
            }
        }

        Ok(derive_lockout(
            Some(trigger.attempted_at),
            cleared,
            recent,
            now,
        ))
    }

    /// Post-success reset: clears the customer locked flag if set. The
    /// ledger rows are kept as audit trail.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn clear_failed_attempts(&self, email: &str) -> Result<()> {
        let cleared = LockoutRepo::clear_customer_locked_by_email(&self.pool, email).await?;
        if cleared > 0 {
            info!(email, "customer lock cleared after successful login");
        }
        Ok(())
    }

    /// Administrative unlock.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn unlock_account(&self, customer_id: Uuid) -> Result<()> {
        LockoutRepo::clear_customer_locked(&self.pool, customer_id).await?;
        self.recorder.log(
            AuditEvent::new(
                AuditEventType::AccountUnlocked,
                ActorType::Admin,
                "unlock_account",
                AuditStatus::Success,
            )
            .with_target("customer", &customer_id.to_string()),
        );
        Ok(())
    }
}
