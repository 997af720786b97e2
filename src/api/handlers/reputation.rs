//! Operator endpoints over IP reputation: inspect, list, block, unblock.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::api::envelope::{error_response, internal_error, Envelope};
use crate::api::AppState;
use crate::reputation::ReputationQuery;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct BlockIpRequest {
    pub ip_address: String,
    pub reason: String,
    /// Omit for a permanent block.
    pub duration_hours: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UnblockIpRequest {
    pub ip_address: String,
}

#[utoipa::path(
    get,
    path = "/v1/admin/reputation/statistics",
    responses(
        (status = 200, description = "Aggregate reputation counters."),
    ),
    tag = "reputation"
)]
pub async fn reputation_statistics(state: Extension<Arc<AppState>>) -> Response {
    match state.reputation.get_statistics().await {
        Ok(statistics) => (StatusCode::OK, Json(Envelope::ok(statistics))).into_response(),
        Err(err) => {
            error!("reputation statistics failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/reputation",
    params(
        ("blocked_only" = Option<bool>, Query, description = "Only blocked addresses"),
        ("min_score" = Option<i32>, Query, description = "Inclusive score floor"),
        ("max_score" = Option<i32>, Query, description = "Inclusive score ceiling"),
        ("limit" = Option<i64>, Query, description = "Page size, max 500"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
    ),
    responses(
        (status = 200, description = "Tracked addresses, worst score first."),
    ),
    tag = "reputation"
)]
pub async fn reputation_list(
    state: Extension<Arc<AppState>>,
    Query(filters): Query<ReputationQuery>,
) -> Response {
    match state.reputation.query(&filters).await {
        Ok(records) => (StatusCode::OK, Json(Envelope::ok(records))).into_response(),
        Err(err) => {
            error!("reputation listing failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/reputation/{ip}",
    params(
        ("ip" = String, Path, description = "IP address")
    ),
    responses(
        (status = 200, description = "Reputation record; unseen addresses report the default score."),
        (status = 400, description = "Not a valid IP address."),
    ),
    tag = "reputation"
)]
pub async fn reputation_get(
    state: Extension<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Response {
    if ip.parse::<IpAddr>().is_err() {
        return invalid_ip(&ip);
    }
    match state.reputation.get_reputation(&ip).await {
        Ok(record) => (StatusCode::OK, Json(Envelope::ok(record))).into_response(),
        Err(err) => {
            error!(ip, "reputation lookup failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/reputation/block",
    request_body = BlockIpRequest,
    responses(
        (status = 200, description = "Address blocked."),
        (status = 400, description = "Not a valid IP address."),
    ),
    tag = "reputation"
)]
pub async fn reputation_block(
    state: Extension<Arc<AppState>>,
    Json(request): Json<BlockIpRequest>,
) -> Response {
    if request.ip_address.parse::<IpAddr>().is_err() {
        return invalid_ip(&request.ip_address);
    }
    match state
        .reputation
        .block_ip(&request.ip_address, &request.reason, request.duration_hours)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(Envelope::ok(serde_json::json!({
                "ip_address": request.ip_address,
                "blocked": true,
            }))),
        )
            .into_response(),
        Err(err) => {
            error!(ip = request.ip_address, "manual block failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/reputation/unblock",
    request_body = UnblockIpRequest,
    responses(
        (status = 200, description = "Address unblocked; idempotent."),
        (status = 400, description = "Not a valid IP address."),
    ),
    tag = "reputation"
)]
pub async fn reputation_unblock(
    state: Extension<Arc<AppState>>,
    Json(request): Json<UnblockIpRequest>,
) -> Response {
    if request.ip_address.parse::<IpAddr>().is_err() {
        return invalid_ip(&request.ip_address);
    }
    match state.reputation.unblock_ip(&request.ip_address).await {
        Ok(()) => (
            StatusCode::OK,
            Json(Envelope::ok(serde_json::json!({
                "ip_address": request.ip_address,
                "blocked": false,
            }))),
        )
            .into_response(),
        Err(err) => {
            error!(ip = request.ip_address, "manual unblock failed: {err:#}");
            internal_error()
        }
    }
}

fn invalid_ip(value: &str) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "INVALID_IP",
        &format!("not a valid IP address: {value}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_ip_is_a_400() {
        let response = invalid_ip("not-an-ip");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn block_request_parses_optional_duration() {
        let request: BlockIpRequest = serde_json::from_value(serde_json::json!({
            "ip_address": "203.0.113.7",
            "reason": "abuse",
        }))
        .expect("deserialize");
        assert_eq!(request.duration_hours, None);

        let request: BlockIpRequest = serde_json::from_value(serde_json::json!({
            "ip_address": "203.0.113.7",
            "reason": "abuse",
            "duration_hours": 24,
        }))
        .expect("deserialize");
        assert_eq!(request.duration_hours, Some(24));
    }
}
