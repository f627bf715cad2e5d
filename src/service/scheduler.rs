use crate::config::{
    DEFAULT_SCHEDULE, RUN_ON_STARTUP_KEY, RUN_ONCE_KEY, SCHEDULE_KEY, Settings,
};
use crate::dump::MySqlDumper;
use crate::error::BackupError;
use crate::service::orchestrator::BackupJob;
use crate::service::report::TracingReporter;
use crate::storage::AzureBlobUploader;
use crate::types::RunSummary;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// When backups fire.
#[derive(Debug, Clone)]
pub struct Trigger {
    schedule: Schedule,
    pub run_on_startup: bool,
    pub run_once: bool,
}

impl Trigger {
    pub fn from_settings(settings: &Settings) -> Result<Self, BackupError> {
        let expression = settings.get(SCHEDULE_KEY).unwrap_or(DEFAULT_SCHEDULE);
        Ok(Self {
            schedule: Schedule::from_str(expression)?,
            run_on_startup: settings.flag(RUN_ON_STARTUP_KEY),
            run_once: settings.flag(RUN_ONCE_KEY),
        })
    }

    /// First firing strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Build a fresh configuration from `settings_path` and run one backup.
///
/// Returns `None` when the run could not start (unreadable configuration).
pub async fn run_once(settings_path: &Path) -> Option<RunSummary> {
    let settings = match Settings::load(settings_path) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            error!(path = %settings_path.display(), error = %e, "failed to load settings; skipping run");
            return None;
        }
    };
    let uploader = match AzureBlobUploader::new(settings.clone()) {
        Ok(uploader) => uploader,
        Err(e) => {
            error!(error = %e, "failed to initialize storage client; skipping run");
            return None;
        }
    };

    let job = BackupJob::new(
        settings,
        Arc::new(MySqlDumper::default()),
        Arc::new(uploader),
        Arc::new(TracingReporter),
    );
    Some(job.run().await)
}

/// Fire backups according to `trigger` until interrupted.
///
/// A run in progress is always allowed to finish; shutdown is only observed
/// while waiting for the next firing.
pub async fn serve(trigger: Trigger, settings_path: PathBuf) {
    if trigger.run_once {
        run_once(&settings_path).await;
        return;
    }
    if trigger.run_on_startup {
        info!("running startup backup");
        run_once(&settings_path).await;
    }

    loop {
        let now = Utc::now();
        let Some(next) = trigger.next_after(now) else {
            warn!("backup schedule has no upcoming firing; stopping");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next = %next, "next backup scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                run_once(&settings_path).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
}
