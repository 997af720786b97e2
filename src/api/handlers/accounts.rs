//! Operator endpoints over account lockout state.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::envelope::{internal_error, Envelope};
use crate::api::AppState;
use crate::lockout::LockoutStatus;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LockoutParams {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LockoutStatusResponse {
    pub is_locked: bool,
    pub failed_attempts: i32,
    pub remaining_seconds: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub message: String,
}

impl From<LockoutStatus> for LockoutStatusResponse {
    fn from(status: LockoutStatus) -> Self {
        let message = status.human_message();
        Self {
            is_locked: status.is_locked,
            failed_attempts: status.failed_attempts,
            remaining_seconds: status.remaining_seconds,
            locked_until: status.locked_until,
            message,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/accounts/lockout",
    params(
        ("email" = String, Query, description = "Account email")
    ),
    responses(
        (status = 200, description = "Derived lockout state for the email.", body = LockoutStatusResponse),
    ),
    tag = "accounts"
)]
pub async fn lockout_status(
    state: Extension<Arc<AppState>>,
    Query(params): Query<LockoutParams>,
) -> Response {
    match state.lockout.check_lockout_status(&params.email).await {
        Ok(status) => (
            StatusCode::OK,
            Json(Envelope::ok(LockoutStatusResponse::from(status))),
        )
            .into_response(),
        Err(err) => {
            error!(email = params.email, "lockout status failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/accounts/{customer_id}/unlock",
    params(
        ("customer_id" = Uuid, Path, description = "Customer id")
    ),
    responses(
        (status = 200, description = "Account unlocked; idempotent."),
    ),
    tag = "accounts"
)]
pub async fn unlock_account(
    state: Extension<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Response {
    match state.lockout.unlock_account(customer_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(Envelope::ok(serde_json::json!({
                "customer_id": customer_id,
                "locked": false,
            }))),
        )
            .into_response(),
        Err(err) => {
            error!(%customer_id, "admin unlock failed: {err:#}");
            internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_carries_the_human_message() {
        let response = LockoutStatusResponse::from(LockoutStatus::unlocked(2));
        assert!(!response.is_locked);
        assert_eq!(response.failed_attempts, 2);
        assert!(!response.message.is_empty());
    }
}
