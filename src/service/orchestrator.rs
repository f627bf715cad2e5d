use crate::config::Settings;
use crate::dump::DumpProducer;
use crate::error::BackupError;
use crate::registry::{self, DatabaseEntry};
use crate::service::report::BackupReporter;
use crate::storage::BlobUploader;
use crate::types::{BackupOutcome, RunSummary};
use std::sync::Arc;
use tracing::{debug, info};

/// One backup run: every configured database is dumped and uploaded in turn.
///
/// A failing database is reported and skipped; it never stops the run.
pub struct BackupJob {
    settings: Arc<Settings>,
    dumper: Arc<dyn DumpProducer>,
    uploader: Arc<dyn BlobUploader>,
    reporter: Arc<dyn BackupReporter>,
}

impl BackupJob {
    pub fn new(
        settings: Arc<Settings>,
        dumper: Arc<dyn DumpProducer>,
        uploader: Arc<dyn BlobUploader>,
        reporter: Arc<dyn BackupReporter>,
    ) -> Self {
        Self {
            settings,
            dumper,
            uploader,
            reporter,
        }
    }

    pub async fn run(&self) -> RunSummary {
        let databases = registry::resolve(&self.settings);
        if databases.is_empty() {
            info!("no databases configured; nothing to back up");
            return RunSummary::default();
        }

        info!(count = databases.len(), "starting backup run");
        let mut summary = RunSummary::default();
        for entry in &databases {
            let outcome = match self.backup_database(entry).await {
                Ok(blob) => {
                    self.reporter.succeeded(&entry.name, &blob);
                    BackupOutcome::Succeeded {
                        database: entry.name.clone(),
                        blob,
                    }
                }
                Err(error) => {
                    self.reporter.failed(&entry.name, &error);
                    BackupOutcome::Failed {
                        database: entry.name.clone(),
                        error,
                    }
                }
            };
            summary.outcomes.push(outcome);
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "backup run finished"
        );
        summary
    }

    async fn backup_database(&self, entry: &DatabaseEntry) -> Result<String, BackupError> {
        let sql = self.dumper.dump(&entry.connection_string).await?;
        debug!(database = %entry.name, bytes = sql.len(), "dump complete");
        self.uploader.upload(&entry.name, &sql).await
    }
}
