pub mod models;
pub mod repo;
pub mod service;

pub use models::{LockoutStatus, LoginAttemptRecord, NewLoginAttempt};
pub use service::LockoutService;
