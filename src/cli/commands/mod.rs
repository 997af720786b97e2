use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("custodia")
        .about("Trust and access-control engine")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("CUSTODIA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("CUSTODIA_DSN")
                .required(true),
        )
        .arg(
            Arg::new("rate-limit-max-requests")
                .long("rate-limit-max-requests")
                .help("Requests allowed per window; suspicious IPs get half")
                .env("CUSTODIA_RATE_LIMIT_MAX_REQUESTS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("rate-limit-window-seconds")
                .long("rate-limit-window-seconds")
                .help("Fixed rate limit window length in seconds")
                .env("CUSTODIA_RATE_LIMIT_WINDOW_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("CUSTODIA_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "custodia");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Trust and access-control engine"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_port_and_dsn() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "custodia",
            "--port",
            "9090",
            "--dsn",
            "postgres://127.0.0.1:5432/custodia",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(9090));
        assert_eq!(
            matches.get_one::<String>("dsn").map(String::as_str),
            Some("postgres://127.0.0.1:5432/custodia")
        );
        assert_eq!(matches.get_one::<i64>("rate-limit-max-requests"), None);
    }

    #[test]
    fn test_rate_limit_overrides() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "custodia",
            "--dsn",
            "postgres://127.0.0.1:5432/custodia",
            "--rate-limit-max-requests",
            "200",
            "--rate-limit-window-seconds",
            "30",
        ]);

        assert_eq!(
            matches.get_one::<i64>("rate-limit-max-requests").copied(),
            Some(200)
        );
        assert_eq!(
            matches.get_one::<i64>("rate-limit-window-seconds").copied(),
            Some(30)
        );
    }

    #[test]
    fn test_log_level_validator() {
        let validator = validator_log_level();
        let command = Command::new("test").arg(
            Arg::new("level")
                .long("level")
                .value_parser(validator)
                .action(clap::ArgAction::Set),
        );

        let matches = command
            .clone()
            .get_matches_from(vec!["test", "--level", "debug"]);
        assert_eq!(matches.get_one::<u8>("level").copied(), Some(3));

        let result = command.try_get_matches_from(vec!["test", "--level", "nope"]);
        assert!(result.is_err());
    }
}
