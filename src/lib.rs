// ABOUTME: Library root for attendance-sync
// ABOUTME: Exposes session, source, mapping, upload and scheduling components

pub mod api;
pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod mapper;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod source;
pub mod uploader;
pub mod utils;

pub use audit::{AuditSink, MemorySink, Severity, TracingSink};
pub use checkpoint::Checkpoint;
pub use config::{ConfigFile, Configuration};
pub use error::SyncError;
pub use scheduler::{SchedulerState, SyncEngine, SyncScheduler, TickOutcome};
pub use service::AttendanceService;
pub use session::{SessionManager, SessionState};
pub use source::{EventQuery, EventStore, RawEvent, SourceReader};
pub use uploader::{SendOutcome, Uploader};
