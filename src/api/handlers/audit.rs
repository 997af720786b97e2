//! Operator endpoints over the audit log: query, export, statistics.

use axum::{
    extract::{Extension, Query},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::envelope::{error_response, internal_error, Envelope};
use crate::api::AppState;
use crate::audit::{AuditEventType, AuditQuery, AuditStatus};

/// Query-string filters shared by the audit endpoints. `event_type` accepts
/// a comma-separated list of wire names, e.g. `LOGIN_FAILURE,IP_BLOCKED`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AuditLogParams {
    pub actor_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub status: Option<String>,
    pub ip_address: Option<String>,
    pub session_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub format: Option<String>,
}

impl AuditLogParams {
    fn into_query(self) -> Result<AuditQuery, String> {
        let event_types = match self.event_type.as_deref() {
            None => None,
            Some(raw) => {
                let mut parsed = Vec::new();
                for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
                    let event_type = AuditEventType::parse(name)
                        .ok_or_else(|| format!("unknown event type: {name}"))?;
                    parsed.push(event_type);
                }
                (!parsed.is_empty()).then_some(parsed)
            }
        };
        let status = match self.status.as_deref() {
            None => None,
            Some(raw) => {
                Some(AuditStatus::parse(raw).ok_or_else(|| format!("unknown status: {raw}"))?)
            }
        };
        Ok(AuditQuery {
            actor_id: self.actor_id,
            event_types,
            status,
            ip_address: self.ip_address,
            session_id: self.session_id,
            from: self.from,
            to: self.to,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/audit/logs",
    params(
        ("actor_id" = Option<Uuid>, Query, description = "Filter by actor id"),
        ("event_type" = Option<String>, Query, description = "Comma-separated event types"),
        ("status" = Option<String>, Query, description = "success, failure or denied"),
        ("ip_address" = Option<String>, Query, description = "Filter by source IP"),
        ("session_id" = Option<Uuid>, Query, description = "Filter by session id"),
        ("from" = Option<String>, Query, description = "RFC 3339 lower bound"),
        ("to" = Option<String>, Query, description = "RFC 3339 upper bound"),
        ("limit" = Option<i64>, Query, description = "Page size, max 500"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
    ),
    responses(
        (status = 200, description = "Matching audit entries, newest first."),
        (status = 400, description = "Invalid filter value."),
    ),
    tag = "audit"
)]
pub async fn audit_logs(
    state: Extension<Arc<AppState>>,
    Query(params): Query<AuditLogParams>,
) -> Response {
    let filters = match params.into_query() {
        Ok(filters) => filters,
        Err(message) => {
            return error_response(StatusCode::BAD_REQUEST, "INVALID_FILTER", &message);
        }
    };
    match state.audit.query(&filters).await {
        Ok(entries) => (StatusCode::OK, Json(Envelope::ok(entries))).into_response(),
        Err(err) => {
            error!("audit query failed: {err:#}");
            internal_error()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/audit/export",
    params(
        ("format" = Option<String>, Query, description = "json (default) or csv"),
        ("event_type" = Option<String>, Query, description = "Comma-separated event types"),
        ("status" = Option<String>, Query, description = "success, failure or denied"),
        ("from" = Option<String>, Query, description = "RFC 3339 lower bound"),
        ("to" = Option<String>, Query, description = "RFC 3339 upper bound"),
    ),
    responses(
        (status = 200, description = "Export file, capped at 10000 entries."),
        (status = 400, description = "Invalid filter or format."),
    ),
    tag = "audit"
)]
pub async fn audit_export(
    state: Extension<Arc<AppState>>,
    Query(params): Query<AuditLogParams>,
) -> Response {
    let format = params
        .format
        .clone()
        .unwrap_or_else(|| "json".to_string());
    let filters = match params.into_query() {
        Ok(filters) => filters,
        Err(message) => {
            return error_response(StatusCode::BAD_REQUEST, "INVALID_FILTER", &message);
        }
    };

    match format.as_str() {
        "json" => match state.audit.export_json(&filters).await {
            Ok(body) => export_download(body, "application/json", "audit-export.json"),
            Err(err) => {
                error!("audit json export failed: {err:#}");
                internal_error()
            }
        },
        "csv" => match state.audit.export_csv(&filters).await {
            Ok(body) => export_download(body, "text/csv", "audit-export.csv"),
            Err(err) => {
                error!("audit csv export failed: {err:#}");
                internal_error()
            }
        },
        other => error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_FORMAT",
            &format!("unsupported export format: {other}"),
        ),
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/audit/statistics",
    params(
        ("from" = Option<String>, Query, description = "RFC 3339 lower bound"),
        ("to" = Option<String>, Query, description = "RFC 3339 upper bound"),
    ),
    responses(
        (status = 200, description = "Counts by status and event type."),
        (status = 400, description = "Invalid filter value."),
    ),
    tag = "audit"
)]
pub async fn audit_statistics(
    state: Extension<Arc<AppState>>,
    Query(params): Query<AuditLogParams>,
) -> Response {
    let filters = match params.into_query() {
        Ok(filters) => filters,
        Err(message) => {
            return error_response(StatusCode::BAD_REQUEST, "INVALID_FILTER", &message);
        }
    };
    match state.audit.get_statistics(&filters).await {
        Ok(statistics) => (StatusCode::OK, Json(Envelope::ok(statistics))).into_response(),
        Err(err) => {
            error!("audit statistics failed: {err:#}");
            internal_error()
        }
    }
}

fn export_download(body: String, content_type: &'static str, filename: &str) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
    {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_event_type_list() {
        let params = AuditLogParams {
            event_type: Some("LOGIN_FAILURE, IP_BLOCKED".to_string()),
            status: Some("denied".to_string()),
            ..AuditLogParams::default()
        };
        let query = params.into_query().expect("valid filters");
        assert_eq!(
            query.event_types,
            Some(vec![AuditEventType::LoginFailure, AuditEventType::IpBlocked])
        );
        assert_eq!(query.status, Some(AuditStatus::Denied));
    }

    #[test]
    fn params_reject_unknown_event_type() {
        let params = AuditLogParams {
            event_type: Some("NOT_A_THING".to_string()),
            ..AuditLogParams::default()
        };
        assert!(params.into_query().is_err());
    }

    #[test]
    fn params_reject_unknown_status() {
        let params = AuditLogParams {
            status: Some("maybe".to_string()),
            ..AuditLogParams::default()
        };
        assert!(params.into_query().is_err());
    }

    #[test]
    fn export_download_sets_attachment_headers() {
        let response = export_download("a,b\n".to_string(), "text/csv", "audit-export.csv");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/csv"
        );
        assert!(response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("audit-export.csv"));
    }
}
