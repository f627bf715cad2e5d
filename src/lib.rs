pub mod config;
pub mod dump;
pub mod error;
pub mod registry;
pub mod service;
pub mod storage;
pub mod types;

pub use config::Settings;
pub use error::{BackupError, ErrorKind};
pub use registry::DatabaseEntry;
pub use service::{BackupJob, BackupReporter, TracingReporter};
