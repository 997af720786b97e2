//! Fire-and-forget audit sink.
//!
//! Call sites emit events onto an unbounded channel; a background task drains
//! the channel and writes rows. A failed write is logged and dropped, so an
//! audit problem can never block a security decision or a login response.

use sqlx::PgPool;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::error;

use crate::api::context::RequestContext;
use crate::audit::models::AuditEvent;
use crate::audit::repo::AuditRepo;

#[derive(Clone)]
pub struct AuditRecorder {
    tx: UnboundedSender<AuditEvent>,
}

impl AuditRecorder {
    /// Spawn the background writer task and return the shared handle.
    #[must_use]
    pub fn spawn(pool: PgPool) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = AuditRepo::insert_entry(&pool, &event).await {
                    error!(
                        event_type = event.event_type.as_str(),
                        "audit log write failed: {err:#}"
                    );
                }
            }
        });
        Self { tx }
    }

    /// Handle backed by a caller-owned channel, without a writer task.
    pub(crate) fn from_sender(tx: UnboundedSender<AuditEvent>) -> Self {
        Self { tx }
    }

    /// Record an event. Infallible by contract: a closed channel is logged
    /// and the event is dropped.
    pub fn log(&self, event: AuditEvent) {
        if let Err(err) = self.tx.send(event) {
            error!(
                event_type = err.0.event_type.as_str(),
                "audit channel closed; dropping event"
            );
        }
    }

    /// Enrich a partial event with ambient request data, then record it.
    ///
    /// Fields already set on the event win over the request context.
    pub fn log_from_request(&self, ctx: &RequestContext, mut event: AuditEvent) {
        if event.ip_address.is_none() {
            event.ip_address.clone_from(&ctx.ip_address);
        }
        if event.user_agent.is_none() {
            event.user_agent.clone_from(&ctx.user_agent);
        }
        if event.session_id.is_none() {
            event.session_id = ctx.session_id;
        }
        if event.request_id.is_none() {
            event.request_id.clone_from(&ctx.request_id);
        }
        self.log(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::{ActorType, AuditEventType, AuditStatus};

    fn event() -> AuditEvent {
        AuditEvent::new(
            AuditEventType::LoginFailure,
            ActorType::Customer,
            "login",
            AuditStatus::Failure,
        )
    }

    #[test]
    fn log_returns_normally_when_writer_is_gone() {
        // Dropping the receiver simulates a dead writer (store failure path);
        // the caller must still observe a normal return.
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let recorder = AuditRecorder::from_sender(tx);
        recorder.log(event());
    }

    #[test]
    fn log_from_request_enriches_missing_fields() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recorder = AuditRecorder::from_sender(tx);
        let ctx = RequestContext {
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: Some("curl/8.0".to_string()),
            request_id: Some("01J00000000000000000000000".to_string()),
            session_id: None,
        };
        recorder.log_from_request(&ctx, event());

        let received = rx.try_recv().expect("event forwarded");
        assert_eq!(received.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(received.user_agent.as_deref(), Some("curl/8.0"));
        assert!(received.request_id.is_some());
    }

    #[test]
    fn log_from_request_keeps_explicit_fields() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recorder = AuditRecorder::from_sender(tx);
        let ctx = RequestContext {
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
            request_id: None,
            session_id: None,
        };
        recorder.log_from_request(&ctx, event().with_ip("1.2.3.4"));

        let received = rx.try_recv().expect("event forwarded");
        assert_eq!(received.ip_address.as_deref(), Some("1.2.3.4"));
    }
}
