use crate::error::BackupError;
use tracing::{error, info};

/// Receives the per-database result of a run.
pub trait BackupReporter: Send + Sync {
    fn succeeded(&self, database: &str, blob: &str);
    fn failed(&self, database: &str, error: &BackupError);
}

/// Reports through `tracing`: one info line per success, one error line per
/// failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl BackupReporter for TracingReporter {
    fn succeeded(&self, database: &str, blob: &str) {
        info!(database, blob, "Backup of {} successful", database);
    }

    fn failed(&self, database: &str, error: &BackupError) {
        error!(
            database,
            kind = ?error.kind(),
            "Database: {}, Message: {}",
            database,
            error
        );
    }
}
