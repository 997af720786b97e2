//! Adaptive fixed-window rate limiting driven by IP reputation.

pub mod middleware;
pub mod repo;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::reputation::models::SUSPICIOUS_THRESHOLD;

pub use middleware::{rate_limit, RateLimitState};

/// Fixed-window limiter settings. The suspicious quota applies to clients
/// whose reputation score dropped below the suspicious threshold.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    max_requests: i64,
    suspicious_max_requests: i64,
    window_seconds: i64,
}

impl RateLimitConfig {
    /// Defaults: 100 requests per 60 second window, half for suspicious IPs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_requests: 100,
            suspicious_max_requests: 50,
            window_seconds: 60,
        }
    }

    #[must_use]
    pub fn with_max_requests(mut self, max_requests: i64) -> Self {
        self.max_requests = max_requests;
        // Keep the suspicious quota at half unless set explicitly afterwards.
        self.suspicious_max_requests = (max_requests / 2).max(1);
        self
    }

    #[must_use]
    pub fn with_suspicious_max_requests(mut self, suspicious_max_requests: i64) -> Self {
        self.suspicious_max_requests = suspicious_max_requests;
        self
    }

    #[must_use]
    pub fn with_window_seconds(mut self, window_seconds: i64) -> Self {
        self.window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            max_requests: self.max_requests.max(1),
            suspicious_max_requests: self.suspicious_max_requests.clamp(1, self.max_requests.max(1)),
            window_seconds: self.window_seconds.max(1),
        }
    }

    #[must_use]
    pub fn max_requests(&self) -> i64 {
        self.max_requests
    }

    #[must_use]
    pub fn suspicious_max_requests(&self) -> i64 {
        self.suspicious_max_requests
    }

    #[must_use]
    pub fn window_seconds(&self) -> i64 {
        self.window_seconds
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Start of the fixed window containing `now`.
#[must_use]
pub fn window_start(now: DateTime<Utc>, window_seconds: i64) -> DateTime<Utc> {
    let seconds = now.timestamp();
    let start = seconds - seconds.rem_euclid(window_seconds.max(1));
    Utc.timestamp_opt(start, 0).single().unwrap_or(now)
}

/// End of the fixed window containing `now`.
#[must_use]
pub fn window_end(now: DateTime<Utc>, window_seconds: i64) -> DateTime<Utc> {
    window_start(now, window_seconds) + Duration::seconds(window_seconds.max(1))
}

/// Quota for a client. `score = None` means reputation could not be
/// evaluated: fail open to the fixed default quota, never to unlimited.
#[must_use]
pub fn quota_for_score(config: &RateLimitConfig, score: Option<i32>) -> i64 {
    match score {
        Some(score) if score < SUSPICIOUS_THRESHOLD => config.suspicious_max_requests,
        _ => config.max_requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_start_truncates_to_the_window() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 42).unwrap();
        let start = window_start(now, 60);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(
            window_end(now, 60),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 1, 0).unwrap()
        );
    }

    #[test]
    fn requests_in_one_window_share_a_start() {
        let first = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 1).unwrap();
        let last = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 59).unwrap();
        assert_eq!(window_start(first, 60), window_start(last, 60));
    }

    #[test]
    fn healthy_scores_get_the_full_quota() {
        let config = RateLimitConfig::new();
        assert_eq!(quota_for_score(&config, Some(100)), 100);
        assert_eq!(quota_for_score(&config, Some(SUSPICIOUS_THRESHOLD)), 100);
    }

    #[test]
    fn suspicious_scores_get_the_reduced_quota() {
        let config = RateLimitConfig::new();
        assert_eq!(quota_for_score(&config, Some(SUSPICIOUS_THRESHOLD - 1)), 50);
        assert_eq!(quota_for_score(&config, Some(0)), 50);
    }

    #[test]
    fn unknown_score_fails_open_to_the_default_quota() {
        let config = RateLimitConfig::new();
        assert_eq!(quota_for_score(&config, None), 100);
    }

    #[test]
    fn max_requests_adjusts_the_suspicious_quota() {
        let config = RateLimitConfig::new().with_max_requests(20);
        assert_eq!(config.suspicious_max_requests(), 10);
        let config = config.with_suspicious_max_requests(3);
        assert_eq!(config.suspicious_max_requests(), 3);
    }

    #[test]
    fn normalize_rejects_degenerate_settings() {
        let config = RateLimitConfig::new()
            .with_window_seconds(0)
            .with_suspicious_max_requests(0)
            .normalize();
        assert_eq!(config.window_seconds(), 1);
        assert_eq!(config.suspicious_max_requests(), 1);
    }
}
