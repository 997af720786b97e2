//! Login-flow facade for the credential-issuer collaborator.
//!
//! Composes the lockout state machine, the IP reputation engine, the session
//! manager, and the audit sink into the three calls a login flow needs:
//! preflight gate, failure bookkeeping, success bookkeeping.

use anyhow::Result;
use uuid::Uuid;

use crate::api::context::RequestContext;
use crate::audit::{ActorType, AuditEvent, AuditEventType, AuditRecorder, AuditStatus};
use crate::lockout::models::LockoutStatus;
use crate::lockout::service::AttemptOutcome;
use crate::lockout::LockoutService;
use crate::reputation::models::ReputationAction;
use crate::reputation::ReputationService;
use crate::sessions::SessionService;

/// Outcome of the blocking pre-authentication checks.
#[derive(Debug, Clone)]
pub enum LoginPreflight {
    Allowed,
    IpBlocked,
    AccountLocked { status: LockoutStatus },
}

#[derive(Clone)]
pub struct AccessEngine {
    lockout: LockoutService,
    reputation: ReputationService,
    sessions: SessionService,
    recorder: AuditRecorder,
}

impl AccessEngine {
    #[must_use]
    pub fn new(
        lockout: LockoutService,
        reputation: ReputationService,
        sessions: SessionService,
        recorder: AuditRecorder,
    ) -> Self {
        Self {
            lockout,
            reputation,
            sessions,
            recorder,
        }
    }

    /// Blocking gate ahead of credential verification: IP block first, then
    /// derived lockout state.
    ///
    /// # Errors
    /// Returns an error if a storage call fails; authentication must deny
    /// on doubt, so the caller fails closed.
    pub async fn preflight(&self, email: &str, ip_address: &str) -> Result<LoginPreflight> {
        if self.reputation.is_blocked(ip_address).await? {
            return Ok(LoginPreflight::IpBlocked);
        }
        let status = self.lockout.check_lockout_status(email).await?;
        if status.is_locked {
            return Ok(LoginPreflight::AccountLocked { status });
        }
        Ok(LoginPreflight::Allowed)
    }

    /// Bookkeeping for a failed credential check: ledger row, reputation
    /// penalty, audit event.
    ///
    /// # Errors
    /// Returns an error if the ledger write fails. Reputation and audit
    /// side effects are recovered locally and never abort the flow.
    pub async fn on_login_failure(
        &self,
        email: &str,
        customer_id: Option<Uuid>,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<AttemptOutcome> {
        let ip = ctx.ip_address.clone().unwrap_or_else(|| "unknown".to_string());
        let outcome = self
            .lockout
            .record_attempt(
                email,
                false,
                customer_id,
                Some(reason),
                &ip,
                ctx.user_agent.as_deref(),
            )
            .await?;

        self.reputation
            .track_ip(&ip, ReputationAction::Login, false, None)
            .await;

        let mut event = AuditEvent::new(
            AuditEventType::LoginFailure,
            ActorType::Customer,
            "login",
            AuditStatus::Failure,
        )
        .with_actor_email(email)
        .with_metadata(serde_json::json!({
            "reason": reason,
            "consecutive_failures": outcome.consecutive_failures,
        }));
        if let Some(customer_id) = customer_id {
            event = event.with_actor(customer_id);
        }
        self.recorder.log_from_request(ctx, event);

        Ok(outcome)
    }

    /// Bookkeeping for a successful credential check: ledger row, session
    /// creation, lockout reset, reputation credit, audit event. Returns the
    /// session id for the issued credential.
    ///
    /// # Errors
    /// Returns an error if the ledger write or session creation fails.
    pub async fn on_login_success(
        &self,
        email: &str,
        customer_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Uuid> {
        let ip = ctx.ip_address.clone().unwrap_or_else(|| "unknown".to_string());
        let user_agent = ctx.user_agent.clone().unwrap_or_default();

        self.lockout
            .record_attempt(email, true, Some(customer_id), None, &ip, ctx.user_agent.as_deref())
            .await?;
        let session_id = self
            .sessions
            .create_session(customer_id, &user_agent, &ip)
            .await?;
        self.lockout.clear_failed_attempts(email).await?;
        self.reputation
            .track_ip(&ip, ReputationAction::Login, true, None)
            .await;

        self.recorder.log_from_request(
            ctx,
            AuditEvent::new(
                AuditEventType::LoginSuccess,
                ActorType::Customer,
                "login",
                AuditStatus::Success,
            )
            .with_actor(customer_id)
            .with_actor_email(email)
            .with_target("session", &session_id.to_string()),
        );

        Ok(session_id)
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn engine_wires_up_without_a_live_database() {
        // connect_lazy defers the connection; nothing here runs a query.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://custodia@localhost/custodia")
            .expect("lazy pool");
        let (tx, _rx) = mpsc::unbounded_channel();
        let recorder = AuditRecorder::from_sender(tx);

        let engine = AccessEngine::new(
            LockoutService::new(pool.clone(), recorder.clone()),
            ReputationService::new(pool.clone(), recorder.clone()),
            SessionService::new(pool, recorder.clone()),
            recorder,
        );
        let _sessions: &SessionService = engine.sessions();
    }

    #[test]
    fn preflight_outcomes_are_distinguishable() {
        let allowed = LoginPreflight::Allowed;
        assert!(matches!(allowed, LoginPreflight::Allowed));
        let locked = LoginPreflight::AccountLocked {
            status: LockoutStatus::unlocked(0),
        };
        assert!(matches!(locked, LoginPreflight::AccountLocked { .. }));
    }
}
