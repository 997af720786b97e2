pub mod device;
pub mod models;
pub mod repo;
pub mod service;

pub use device::{parse_user_agent, DeviceFingerprint};
pub use models::{generate_token, hash_token, Session};
pub use service::SessionService;
