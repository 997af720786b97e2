pub mod models;
pub mod repo;
pub mod service;

pub use models::{IpReputationRecord, ReputationAction, ReputationQuery, ReputationStatistics};
pub use service::ReputationService;
