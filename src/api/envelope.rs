//! Standard JSON response envelope for the admin surface.
//!
//! Success: `{"success": true, "data": ...}`.
//! Failure: `{"success": false, "error": {"code", "message"}}`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T: Serialize> Envelope<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<()> {
    #[must_use]
    pub fn err(code: &str, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Error response with the standard envelope body.
#[must_use]
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(Envelope::err(code, message))).into_response()
}

/// 500 with a generic body; the underlying error belongs in the log, not
/// the response.
#[must_use]
pub fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "Internal server error",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_error() {
        let value = serde_json::to_value(Envelope::ok(serde_json::json!({"n": 1})))
            .expect("serialize");
        assert_eq!(value["success"], serde_json::json!(true));
        assert_eq!(value["data"]["n"], serde_json::json!(1));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn error_envelope_carries_code_and_message() {
        let value = serde_json::to_value(Envelope::err("IP_BLOCKED", "Access denied"))
            .expect("serialize");
        assert_eq!(value["success"], serde_json::json!(false));
        assert_eq!(value["error"]["code"], serde_json::json!("IP_BLOCKED"));
        assert_eq!(value["error"]["message"], serde_json::json!("Access denied"));
        assert!(value.get("data").is_none());
    }
}
