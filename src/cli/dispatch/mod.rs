use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        rate_limit_max_requests: matches.get_one::<i64>("rate-limit-max-requests").copied(),
        rate_limit_window_seconds: matches.get_one::<i64>("rate-limit-window-seconds").copied(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "custodia",
            "--dsn",
            "postgres://127.0.0.1:5432/custodia",
            "--rate-limit-max-requests",
            "250",
        ]);
        let action = handler(&matches).expect("action");
        let Action::Server {
            port,
            dsn,
            rate_limit_max_requests,
            rate_limit_window_seconds,
        } = action;
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://127.0.0.1:5432/custodia");
        assert_eq!(rate_limit_max_requests, Some(250));
        assert_eq!(rate_limit_window_seconds, None);
    }
}
