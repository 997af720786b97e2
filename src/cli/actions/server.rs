use crate::api;
use crate::cli::{actions::Action, telemetry};
use crate::cleanup::CleanupConfig;
use crate::ratelimit::RateLimitConfig;
use anyhow::Result;

/// Handle the server action
///
/// # Errors
/// Returns an error if the server fails to start or exits abnormally.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        rate_limit_max_requests,
        rate_limit_window_seconds,
    } = action;

    let mut rate_limit = RateLimitConfig::new();
    if let Some(max_requests) = rate_limit_max_requests {
        rate_limit = rate_limit.with_max_requests(max_requests);
    }
    if let Some(window_seconds) = rate_limit_window_seconds {
        rate_limit = rate_limit.with_window_seconds(window_seconds);
    }

    let result = api::new(port, dsn, rate_limit, CleanupConfig::new()).await;

    telemetry::shutdown_tracer();

    result
}
