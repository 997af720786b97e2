//! Session lifecycle: create, validate, revoke, cleanup.

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::audit::{ActorType, AuditEvent, AuditEventType, AuditRecorder, AuditStatus};
use crate::sessions::device::parse_user_agent;
use crate::sessions::models::{generate_token, hash_token, retention_cutoffs, Session};
use crate::sessions::repo::SessionRepo;

#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
    recorder: AuditRecorder,
}

impl SessionService {
    #[must_use]
    pub fn new(pool: PgPool, recorder: AuditRecorder) -> Self {
        Self { pool, recorder }
    }

    /// Create a session for a fresh login and return its id for embedding
    /// into the issued credential. The token hash is bound afterwards via
    /// [`Self::set_token_hash`].
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn create_session(
        &self,
        customer_id: Uuid,
        user_agent: &str,
        ip_address: &str,
    ) -> Result<Uuid> {
        let fingerprint = parse_user_agent(user_agent);
        let session_id =
            SessionRepo::insert(&self.pool, customer_id, &fingerprint, ip_address, user_agent)
                .await?;
        self.recorder.log(
            AuditEvent::new(
                AuditEventType::SessionCreated,
                ActorType::Customer,
                "create_session",
                AuditStatus::Success,
            )
            .with_actor(customer_id)
            .with_target("session", &session_id.to_string())
            .with_ip(ip_address),
        );
        Ok(session_id)
    }

    /// Store the one-way hash of the issued token. The raw token is hashed
    /// here and never persisted.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_token_hash(&self, session_id: Uuid, raw_token: &str) -> Result<()> {
        SessionRepo::set_token_hash(&self.pool, session_id, &hash_token(raw_token)).await
    }

    /// Generate a fresh token, bind its hash to the session, and return the
    /// raw value for the credential issuer to hand out.
    ///
    /// # Errors
    /// Returns an error if token generation or the update fails.
    pub async fn issue_token(&self, session_id: Uuid) -> Result<String> {
        let raw_token = generate_token()?;
        self.set_token_hash(session_id, &raw_token).await?;
        Ok(raw_token)
    }

    /// The session if it is still active; `None` otherwise. Absence is a
    /// normal outcome consumed by the credential-verification collaborator.
    ///
    /// # Errors
    /// Returns an error if the lookup fails; authentication fails closed.
    pub async fn validate_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        SessionRepo::find_active(&self.pool, session_id).await
    }

    /// Best-effort activity bump, detached from the request path. Failures
    /// are logged and never propagated.
    pub fn update_activity(&self, session_id: Uuid) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(err) = SessionRepo::touch_activity(&pool, session_id).await {
                error!(%session_id, "session activity update failed: {err:#}");
            }
        });
    }

    /// Active sessions for one customer, most recent activity first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_active_sessions(&self, customer_id: Uuid) -> Result<Vec<Session>> {
        SessionRepo::active_for_customer(&self.pool, customer_id).await
    }

    /// Revoke one session. Terminal: revoked sessions are never resurrected.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke_session(&self, session_id: Uuid, reason: &str) -> Result<()> {
        let revoked = SessionRepo::revoke(&self.pool, session_id, reason).await?;
        if revoked > 0 {
            self.recorder.log(
                AuditEvent::new(
                    AuditEventType::SessionRevoked,
                    ActorType::Admin,
                    "revoke_session",
                    AuditStatus::Success,
                )
                .with_target("session", &session_id.to_string())
                .with_metadata(serde_json::json!({ "reason": reason })),
            );
        }
        Ok(())
    }

    /// Revoke every other session of the customer, sparing `except_id`
    /// (the caller's own session is never revoked by this path).
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke_other_sessions(
        &self,
        customer_id: Uuid,
        except_id: Uuid,
        reason: &str,
    ) -> Result<u64> {
        let revoked =
            SessionRepo::revoke_others(&self.pool, customer_id, except_id, reason).await?;
        if revoked > 0 {
            self.recorder.log(
                AuditEvent::new(
                    AuditEventType::SessionRevoked,
                    ActorType::Customer,
                    "revoke_other_sessions",
                    AuditStatus::Success,
                )
                .with_actor(customer_id)
                .with_metadata(serde_json::json!({ "revoked": revoked, "kept": except_id })),
            );
        }
        Ok(revoked)
    }

    /// Revoke every active session of the customer.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn revoke_all_sessions(&self, customer_id: Uuid, reason: &str) -> Result<u64> {
        let revoked = SessionRepo::revoke_all(&self.pool, customer_id, reason).await?;
        if revoked > 0 {
            self.recorder.log(
                AuditEvent::new(
                    AuditEventType::SessionRevoked,
                    ActorType::Admin,
                    "revoke_all_sessions",
                    AuditStatus::Success,
                )
                .with_target("customer", &customer_id.to_string())
                .with_metadata(serde_json::json!({ "revoked": revoked })),
            );
        }
        Ok(revoked)
    }

    /// Apply the three retention rules and delete matching rows.
    ///
    /// Safe to run redundantly on multiple replicas.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn cleanup_sessions(&self) -> Result<u64> {
        let purged = SessionRepo::purge(&self.pool, retention_cutoffs(Utc::now())).await?;
        if purged > 0 {
            info!(purged, "expired sessions purged");
        }
        Ok(purged)
    }
}
