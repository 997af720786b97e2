//! Axum middleware applying the adaptive limiter in front of all routes.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error, warn};

use crate::api::context;
use crate::api::envelope::Envelope;
use crate::audit::{ActorType, AuditEvent, AuditEventType, AuditRecorder, AuditStatus};
use crate::ratelimit::repo::RateLimitRepo;
use crate::ratelimit::{quota_for_score, window_end, window_start, RateLimitConfig};
use crate::reputation::models::ReputationAction;
use crate::reputation::ReputationService;

pub struct RateLimitState {
    pool: PgPool,
    reputation: ReputationService,
    recorder: AuditRecorder,
    config: RateLimitConfig,
}

impl RateLimitState {
    #[must_use]
    pub fn new(
        pool: PgPool,
        reputation: ReputationService,
        recorder: AuditRecorder,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            pool,
            reputation,
            recorder,
            config: config.normalize(),
        }
    }
}

/// Per-request gate: reject blocked IPs outright, then enforce the
/// reputation-scaled fixed-window quota.
pub async fn rate_limit(
    State(state): State<Arc<RateLimitState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ip) = resolve_client_ip(&request) else {
        // Nothing to key on; let the request through untouched.
        debug!("rate limiter skipped: no client ip");
        return next.run(request).await;
    };

    // Blocked IPs are rejected before any quota is consumed. An evaluation
    // error fails open to "not blocked" plus the fixed default quota below.
    match state.reputation.is_blocked(&ip).await {
        Ok(true) => return blocked_response(),
        Ok(false) => {}
        Err(err) => error!(ip, "ip block check failed: {err:#}"),
    }

    let score = match state.reputation.get_reputation(&ip).await {
        Ok(record) => Some(record.reputation_score),
        Err(err) => {
            error!(ip, "reputation lookup failed: {err:#}");
            None
        }
    };
    let limit = quota_for_score(&state.config, score);

    let now = Utc::now();
    let start = window_start(now, state.config.window_seconds());
    let count = match RateLimitRepo::increment_window(&state.pool, &ip, start).await {
        Ok(count) => count,
        Err(err) => {
            // Counter store failure: let the request pass rather than take
            // the whole surface down with it.
            error!(ip, "rate limit counter failed: {err:#}");
            return next.run(request).await;
        }
    };

    if count > limit {
        warn!(ip, count, limit, "rate limit exceeded");
        state
            .reputation
            .track_ip(
                &ip,
                ReputationAction::RateLimit,
                false,
                Some(serde_json::json!({ "count": count, "limit": limit })),
            )
            .await;
        state.recorder.log(
            AuditEvent::new(
                AuditEventType::RateLimitExceeded,
                ActorType::System,
                "rate_limit",
                AuditStatus::Denied,
            )
            .with_ip(&ip)
            .with_metadata(serde_json::json!({ "count": count, "limit": limit })),
        );
        return limited_response(&state.config, limit, now);
    }

    let remaining = (limit - count).max(0);
    let mut response = next.run(request).await;
    set_header(&mut response, "x-ratelimit-limit", &limit.to_string());
    set_header(&mut response, "x-ratelimit-remaining", &remaining.to_string());
    response
}

fn resolve_client_ip(request: &Request) -> Option<String> {
    if let Some(ip) = context::client_ip(request.headers()) {
        return Some(ip);
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

fn blocked_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(Envelope::err(
            "IP_BLOCKED",
            "Access denied. Contact support if you believe this is an error",
        )),
    )
        .into_response()
}

fn limited_response(
    config: &RateLimitConfig,
    limit: i64,
    now: chrono::DateTime<Utc>,
) -> Response {
    let reset_at = window_end(now, config.window_seconds());
    let retry_after = (reset_at - now).num_seconds().max(1);

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(Envelope::err(
            "RATE_LIMITED",
            "Too many requests. Please try again later",
        )),
    )
        .into_response();
    set_header(&mut response, "x-ratelimit-limit", &limit.to_string());
    set_header(&mut response, "x-ratelimit-remaining", "0");
    set_header(
        &mut response,
        "x-ratelimit-reset",
        &reset_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    set_header(&mut response, "retry-after", &retry_after.to_string());
    response
}

fn set_header(response: &mut Response, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn blocked_response_is_403_with_code() {
        let response = blocked_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn limited_response_carries_rate_limit_headers() {
        let config = RateLimitConfig::new();
        let now = Utc::now();
        let response = limited_response(&config, 100, now);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "100");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert!(headers.contains_key("x-ratelimit-reset"));

        let retry_after: i64 = headers
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap();
        assert!(retry_after >= 1);
        assert!(retry_after <= config.window_seconds());
    }

    #[test]
    fn header_ip_wins_over_peer_address() {
        let request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(resolve_client_ip(&request).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn peer_address_is_the_last_resort() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 443))));
        assert_eq!(resolve_client_ip(&request).as_deref(), Some("192.0.2.1"));
    }
}
