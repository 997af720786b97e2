pub mod export;
pub mod models;
pub mod recorder;
pub mod repo;
pub mod service;

pub use models::{ActorType, AuditEvent, AuditEventType, AuditLogEntry, AuditQuery, AuditStatus};
pub use recorder::AuditRecorder;
pub use service::AuditService;
