use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::options,
    Extension,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

use crate::audit::{AuditRecorder, AuditService};
use crate::cleanup::{spawn_cleanup_workers, CleanupConfig};
use crate::engine::AccessEngine;
use crate::lockout::LockoutService;
use crate::ratelimit::{self, RateLimitConfig, RateLimitState};
use crate::reputation::ReputationService;
use crate::sessions::SessionService;

pub mod context;
pub mod envelope;
pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Services shared by the admin handlers.
pub struct AppState {
    pub audit: AuditService,
    pub reputation: ReputationService,
    pub lockout: LockoutService,
    pub sessions: SessionService,
    pub engine: AccessEngine,
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    rate_limit_config: RateLimitConfig,
    cleanup_config: CleanupConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    // Background writer drains the audit channel; callers never block on it.
    let recorder = AuditRecorder::spawn(pool.clone());

    let audit = AuditService::new(pool.clone());
    let reputation = ReputationService::new(pool.clone(), recorder.clone());
    let lockout = LockoutService::new(pool.clone(), recorder.clone());
    let sessions = SessionService::new(pool.clone(), recorder.clone());
    let engine = AccessEngine::new(
        lockout.clone(),
        reputation.clone(),
        sessions.clone(),
        recorder.clone(),
    );

    spawn_cleanup_workers(
        pool.clone(),
        reputation.clone(),
        sessions.clone(),
        audit.clone(),
        cleanup_config,
    );

    let state = Arc::new(AppState {
        audit,
        reputation: reputation.clone(),
        lockout,
        sessions,
        engine,
    });
    let limiter = Arc::new(RateLimitState::new(
        pool.clone(),
        reputation,
        recorder.clone(),
        rate_limit_config,
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    // Build the router from OpenAPI-wired routes, then extend it with non-doc
    // routes like the preflight-only `OPTIONS /health`.
    let (router, _openapi) = router().split_for_parts();
    let app = router
        .route("/health", options(handlers::health::health_options))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(axum::middleware::from_fn_with_state(
                    limiter,
                    ratelimit::rate_limit,
                ))
                .layer(Extension(state))
                .layer(Extension(pool.clone())),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    // Peer addresses feed the rate limiter when no proxy headers are present.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_name_and_version() {
        assert!(APP_USER_AGENT.starts_with("custodia/"));
    }

    #[test]
    fn span_uses_request_id_header() {
        let request = Request::builder()
            .uri("/v1/admin/reputation")
            .header("x-request-id", "01J00000000000000000000000")
            .body(Body::empty())
            .expect("request");
        let _span = make_span(&request);
    }
}
