//! Operator endpoints over customer sessions.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::envelope::{internal_error, Envelope};
use crate::api::AppState;

const DEFAULT_REVOKE_REASON: &str = "Revoked by administrator";

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeOthersRequest {
    /// The session to spare, normally the caller's current one.
    pub except_session_id: Uuid,
    pub reason: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/admin/customers/{customer_id}/sessions",
    params(
        ("customer_id" = Uuid, Path, description = "Customer id")
    ),
    responses(
        (status = 200, description = "Active sessions, most recent activity first."),
    ),
    tag = "sessions"
)]
pub async fn customer_sessions(
    state: Extension<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Response {
    match state.sessions.get_active_sessions(customer_id).await {
        Ok(sessions) => (StatusCode::OK, Json(Envelope::ok(sessions))).into_response(),
        Err(err) => {
            error!(%customer_id, "session listing failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/sessions/{session_id}/revoke",
    params(
        ("session_id" = Uuid, Path, description = "Session id")
    ),
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "Session revoked; idempotent."),
    ),
    tag = "sessions"
)]
pub async fn revoke_session(
    state: Extension<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    request: Option<Json<RevokeRequest>>,
) -> Response {
    let reason = revoke_reason(request.and_then(|Json(request)| request.reason));
    match state.sessions.revoke_session(session_id, &reason).await {
        Ok(()) => (
            StatusCode::OK,
            Json(Envelope::ok(serde_json::json!({
                "session_id": session_id,
                "revoked": true,
            }))),
        )
            .into_response(),
        Err(err) => {
            error!(%session_id, "session revoke failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/customers/{customer_id}/sessions/revoke-others",
    params(
        ("customer_id" = Uuid, Path, description = "Customer id")
    ),
    request_body = RevokeOthersRequest,
    responses(
        (status = 200, description = "Other sessions revoked; reports the count."),
    ),
    tag = "sessions"
)]
pub async fn revoke_other_sessions(
    state: Extension<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<RevokeOthersRequest>,
) -> Response {
    let reason = revoke_reason(request.reason);
    match state
        .sessions
        .revoke_other_sessions(customer_id, request.except_session_id, &reason)
        .await
    {
        Ok(revoked) => (
            StatusCode::OK,
            Json(Envelope::ok(serde_json::json!({ "revoked": revoked }))),
        )
            .into_response(),
        Err(err) => {
            error!(%customer_id, "revoke-others failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/customers/{customer_id}/sessions/revoke-all",
    params(
        ("customer_id" = Uuid, Path, description = "Customer id")
    ),
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "All sessions revoked; reports the count."),
    ),
    tag = "sessions"
)]
pub async fn revoke_all_sessions(
    state: Extension<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    request: Option<Json<RevokeRequest>>,
) -> Response {
    let reason = revoke_reason(request.and_then(|Json(request)| request.reason));
    match state.sessions.revoke_all_sessions(customer_id, &reason).await {
        Ok(revoked) => (
            StatusCode::OK,
            Json(Envelope::ok(serde_json::json!({ "revoked": revoked }))),
        )
            .into_response(),
        Err(err) => {
            error!(%customer_id, "revoke-all failed: {err:#}");
            internal_error()
        }
    }
}

fn revoke_reason(requested: Option<String>) -> String {
    requested
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REVOKE_REASON.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoke_reason_defaults_when_missing_or_blank() {
        assert_eq!(revoke_reason(None), DEFAULT_REVOKE_REASON);
        assert_eq!(revoke_reason(Some("  ".to_string())), DEFAULT_REVOKE_REASON);
        assert_eq!(revoke_reason(Some("fraud".to_string())), "fraud");
    }
}
