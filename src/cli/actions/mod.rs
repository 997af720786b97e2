pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        rate_limit_max_requests: Option<i64>,
        rate_limit_window_seconds: Option<i64>,
    },
}
