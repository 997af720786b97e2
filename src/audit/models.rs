//! Typed audit events and the persisted audit log row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;
use uuid::Uuid;

/// Who performed the audited action.
///
/// Persisted as lowercase text in `audit_log.actor_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Customer,
    Admin,
    System,
}

impl ActorType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    /// Parse the persisted `audit_log.actor_type` textual value.
    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid audit_log.actor_type value: {value}"),
            )))),
        }
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
    Denied,
}

impl AuditStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Denied => "denied",
        }
    }

    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        Self::parse(value).ok_or_else(|| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid audit_log.status value: {value}"),
            )))
        })
    }

    /// Parse the lowercase wire form used in queries and storage.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

/// Closed set of security-relevant event types recorded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    LoginSuccess,
    LoginFailure,
    AccountLocked,
    AccountUnlocked,
    SessionCreated,
    SessionRevoked,
    IpBlocked,
    IpUnblocked,
    RateLimitExceeded,
    AdminAction,
}

impl AuditEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailure => "LOGIN_FAILURE",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountUnlocked => "ACCOUNT_UNLOCKED",
            Self::SessionCreated => "SESSION_CREATED",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::IpBlocked => "IP_BLOCKED",
            Self::IpUnblocked => "IP_UNBLOCKED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::AdminAction => "ADMIN_ACTION",
        }
    }

    /// Parse the wire form, e.g. `ACCOUNT_LOCKED`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOGIN_SUCCESS" => Some(Self::LoginSuccess),
            "LOGIN_FAILURE" => Some(Self::LoginFailure),
            "ACCOUNT_LOCKED" => Some(Self::AccountLocked),
            "ACCOUNT_UNLOCKED" => Some(Self::AccountUnlocked),
            "SESSION_CREATED" => Some(Self::SessionCreated),
            "SESSION_REVOKED" => Some(Self::SessionRevoked),
            "IP_BLOCKED" => Some(Self::IpBlocked),
            "IP_UNBLOCKED" => Some(Self::IpUnblocked),
            "RATE_LIMIT_EXCEEDED" => Some(Self::RateLimitExceeded),
            "ADMIN_ACTION" => Some(Self::AdminAction),
            _ => None,
        }
    }
}

/// An audit event as emitted by call sites, before persistence.
///
/// Request-scoped fields (ip, user agent, session id, request id) are usually
/// filled in by [`crate::audit::AuditRecorder::log_from_request`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub actor_type: ActorType,
    pub actor_id: Option<Uuid>,
    pub actor_email: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub action: String,
    pub status: AuditStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<Uuid>,
    pub request_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        event_type: AuditEventType,
        actor_type: ActorType,
        action: &str,
        status: AuditStatus,
    ) -> Self {
        Self {
            event_type,
            actor_type,
            actor_id: None,
            actor_email: None,
            target_type: None,
            target_id: None,
            action: action.to_string(),
            status,
            ip_address: None,
            user_agent: None,
            session_id: None,
            request_id: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    #[must_use]
    pub fn with_actor_email(mut self, email: &str) -> Self {
        self.actor_email = Some(email.to_string());
        self
    }

    #[must_use]
    pub fn with_target(mut self, target_type: &str, target_id: &str) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.to_string());
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A persisted audit log row. Immutable; only bulk-purged past retention.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub event_type: String,
    pub actor_type: ActorType,
    pub actor_id: Option<Uuid>,
    pub actor_email: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub action: String,
    pub status: AuditStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<Uuid>,
    pub request_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl<'r> FromRow<'r, PgRow> for AuditLogEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let actor_type: String = row.try_get("actor_type")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            event_type: row.try_get("event_type")?,
            actor_type: ActorType::from_db(&actor_type)?,
            actor_id: row.try_get("actor_id")?,
            actor_email: row.try_get("actor_email")?,
            target_type: row.try_get("target_type")?,
            target_id: row.try_get("target_id")?,
            action: row.try_get("action")?,
            status: AuditStatus::from_db(&status)?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            session_id: row.try_get("session_id")?,
            request_id: row.try_get("request_id")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

/// Filters for querying and exporting audit entries.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AuditQuery {
    pub actor_id: Option<Uuid>,
    pub event_types: Option<Vec<AuditEventType>>,
    pub status: Option<AuditStatus>,
    pub ip_address: Option<String>,
    pub session_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Aggregate counts for operator dashboards.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditStatistics {
    pub total: i64,
    pub by_status: Vec<CountBucket>,
    pub by_event_type: Vec<CountBucket>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CountBucket {
    pub key: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_type_round_trips_through_db_text() {
        for actor in [ActorType::Customer, ActorType::Admin, ActorType::System] {
            assert_eq!(ActorType::from_db(actor.as_str()).ok(), Some(actor));
        }
        assert!(ActorType::from_db("robot").is_err());
    }

    #[test]
    fn status_round_trips_through_db_text() {
        for status in [
            AuditStatus::Success,
            AuditStatus::Failure,
            AuditStatus::Denied,
        ] {
            assert_eq!(AuditStatus::from_db(status.as_str()).ok(), Some(status));
        }
        assert!(AuditStatus::from_db("unknown").is_err());
    }

    #[test]
    fn event_type_serializes_as_screaming_snake() {
        let value = serde_json::to_value(AuditEventType::AccountLocked).expect("serialize");
        assert_eq!(value, serde_json::json!("ACCOUNT_LOCKED"));
        assert_eq!(AuditEventType::AccountLocked.as_str(), "ACCOUNT_LOCKED");
    }

    #[test]
    fn event_builder_fills_optional_fields() {
        let event = AuditEvent::new(
            AuditEventType::AccountLocked,
            ActorType::System,
            "lock_account",
            AuditStatus::Success,
        )
        .with_actor(Uuid::nil())
        .with_actor_email("a@b.com")
        .with_target("customer", "42")
        .with_ip("1.2.3.4")
        .with_metadata(serde_json::json!({"attempts": 5}));

        assert_eq!(event.actor_id, Some(Uuid::nil()));
        assert_eq!(event.actor_email.as_deref(), Some("a@b.com"));
        assert_eq!(event.target_type.as_deref(), Some("customer"));
        assert_eq!(event.ip_address.as_deref(), Some("1.2.3.4"));
        assert!(event.metadata.is_some());
    }
}
