//! # Custodia (Trust & Access-Control Engine)
//!
//! `custodia` sits next to a commerce platform's authentication endpoints and
//! decides who gets to keep talking to them. It tracks the reputation of every
//! client IP, locks accounts after repeated failed logins, scales rate limits
//! with reputation, manages session lifecycle, and records every
//! security-relevant event in an append-only audit log.
//!
//! ## Components
//!
//! - [`reputation`] — lifetime counters per IP, a deterministic score in
//!   `[0, 100]`, and automatic blocking when the score collapses.
//! - [`ratelimit`] — fixed-window counters in `PostgreSQL` shared across
//!   replicas; quotas shrink for suspicious clients.
//! - [`lockout`] — an immutable login-attempt ledger; lockout state is a pure
//!   projection over recent rows, never persisted.
//! - [`sessions`] — device-fingerprinted sessions with one-way token hashes
//!   and independent retention rules.
//! - [`audit`] — fire-and-forget recorder feeding a background writer; query,
//!   export, statistics, and retention on top.
//! - [`engine`] — the facade a credential issuer embeds: preflight gate plus
//!   success/failure bookkeeping.
//!
//! The admin HTTP surface under [`api`] exposes the operator endpoints and is
//! itself protected by the adaptive rate limiter.

pub mod api;
pub mod audit;
pub mod cleanup;
pub mod cli;
pub mod engine;
pub mod lockout;
pub mod ratelimit;
pub mod reputation;
pub mod sessions;

#[cfg(test)]
mod tests {
    use anyhow::{Context, Result};
    use std::fs;
    use std::path::PathBuf;

    // Normalize SQL to avoid brittle formatting checks in schema tests.
    fn canonicalize_sql(sql: &str) -> String {
        sql.chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_lowercase())
            .collect()
    }

    #[test]
    fn schema_defines_every_engine_table() -> Result<()> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("db/sql/01_custodia.sql");
        let sql = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SQL file at {}", path.display()))?;
        let canonical = canonicalize_sql(&sql);

        for table in [
            "audit_log",
            "ip_reputation",
            "login_attempts",
            "sessions",
            "rate_limit_windows",
            "customers",
        ] {
            let needle = format!("createtableifnotexists{table}");
            assert!(
                canonical.contains(&needle),
                "schema is missing table {table}"
            );
        }
        Ok(())
    }
}
