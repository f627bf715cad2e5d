use async_trait::async_trait;
use chrono::NaiveDate;
use dbvault::dump::DumpProducer;
use dbvault::storage::{AzureBlobUploader, BlobUploader, blob_name};
use dbvault::types::BackupOutcome;
use dbvault::{BackupError, BackupJob, BackupReporter, ErrorKind, Settings};
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};

/// Dumps succeed with canned text unless the connection string is listed as
/// unreachable or broken.
#[derive(Default)]
struct FakeDumper {
    unreachable: HashSet<String>,
    broken: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl DumpProducer for FakeDumper {
    async fn dump(&self, connection_string: &str) -> Result<String, BackupError> {
        self.calls.lock().unwrap().push(connection_string.to_string());
        if self.unreachable.contains(connection_string) {
            return Err(BackupError::Connection(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))));
        }
        if self.broken.contains(connection_string) {
            return Err(BackupError::Dump(sqlx::Error::Protocol(
                "lost connection during query".to_string(),
            )));
        }
        Ok(format!("-- dump of {connection_string}\n"))
    }
}

#[derive(Default)]
struct FakeUploader {
    rejected: HashSet<String>,
    uploads: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl BlobUploader for FakeUploader {
    async fn upload(&self, database: &str, sql: &str) -> Result<String, BackupError> {
        if self.rejected.contains(database) {
            return Err(BackupError::Storage {
                status: 403,
                message: "AuthorizationFailure".to_string(),
            });
        }
        let at = NaiveDate::from_ymd_opt(2024, 1, 7)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        let blob = blob_name("db", database, at);
        self.uploads
            .lock()
            .unwrap()
            .push((blob.clone(), sql.to_string()));
        Ok(blob)
    }
}

#[derive(Debug, PartialEq)]
enum Reported {
    Success(String),
    Failure(String, String),
}

#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<Reported>>,
}

impl BackupReporter for RecordingReporter {
    fn succeeded(&self, database: &str, _blob: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Reported::Success(database.to_string()));
    }

    fn failed(&self, database: &str, error: &BackupError) {
        self.events
            .lock()
            .unwrap()
            .push(Reported::Failure(database.to_string(), error.to_string()));
    }
}

fn two_database_settings() -> Arc<Settings> {
    Arc::new(
        [
            ("ConnectionStrings:Database-Orders", "connA"),
            ("ConnectionStrings:Database-Users", "connB"),
            ("ConnectionStrings:Storage", "UseDevelopmentStorage=true"),
            ("StorageContainerName", "backups"),
            ("StorageBlobPrefix", "db"),
        ]
        .into_iter()
        .collect(),
    )
}

fn job(
    settings: Arc<Settings>,
    dumper: &Arc<FakeDumper>,
    uploader: &Arc<FakeUploader>,
    reporter: &Arc<RecordingReporter>,
) -> BackupJob {
    BackupJob::new(settings, dumper.clone(), uploader.clone(), reporter.clone())
}

#[tokio::test]
async fn every_database_is_dumped_and_uploaded_in_order() {
    let dumper = Arc::new(FakeDumper::default());
    let uploader = Arc::new(FakeUploader::default());
    let reporter = Arc::new(RecordingReporter::default());

    let summary = job(two_database_settings(), &dumper, &uploader, &reporter)
        .run()
        .await;

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 0);

    let uploads = uploader.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2);
    assert!(uploads[0].0.starts_with("db/Orders/2024_1_7_"));
    assert!(uploads[0].0.ends_with(".sql"));
    assert_eq!(uploads[0].1, "-- dump of connA\n");
    assert!(uploads[1].0.starts_with("db/Users/2024_1_7_"));
    assert_eq!(uploads[1].1, "-- dump of connB\n");

    assert_eq!(
        *reporter.events.lock().unwrap(),
        vec![
            Reported::Success("Orders".into()),
            Reported::Success("Users".into()),
        ]
    );
}

#[tokio::test]
async fn connection_failure_is_isolated_to_its_database() {
    let dumper = Arc::new(FakeDumper {
        unreachable: HashSet::from(["connB".to_string()]),
        ..Default::default()
    });
    let uploader = Arc::new(FakeUploader::default());
    let reporter = Arc::new(RecordingReporter::default());

    let summary = job(two_database_settings(), &dumper, &uploader, &reporter)
        .run()
        .await;

    let uploads = uploader.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].0.starts_with("db/Orders/"));

    let events = reporter.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Reported::Success("Orders".into()));
    match &events[1] {
        Reported::Failure(database, message) => {
            assert_eq!(database, "Users");
            assert!(message.contains("connection refused"), "{message}");
        }
        other => panic!("expected a failure, got {other:?}"),
    }

    let failed: Vec<_> = summary
        .outcomes
        .iter()
        .filter_map(|o| match o {
            BackupOutcome::Failed { database, error } => Some((database.as_str(), error.kind())),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![("Users", ErrorKind::Connection)]);
}

#[tokio::test]
async fn dump_failure_skips_the_upload() {
    let dumper = Arc::new(FakeDumper {
        broken: HashSet::from(["connA".to_string()]),
        ..Default::default()
    });
    let uploader = Arc::new(FakeUploader::default());
    let reporter = Arc::new(RecordingReporter::default());

    job(two_database_settings(), &dumper, &uploader, &reporter)
        .run()
        .await;

    assert_eq!(*dumper.calls.lock().unwrap(), vec!["connA", "connB"]);
    let uploads = uploader.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].0.starts_with("db/Users/"));

    let events = reporter.events.lock().unwrap();
    let orders_failures = events
        .iter()
        .filter(|e| matches!(e, Reported::Failure(db, _) if db == "Orders"))
        .count();
    assert_eq!(orders_failures, 1);
    assert!(!events.contains(&Reported::Success("Orders".into())));
}

#[tokio::test]
async fn upload_failure_reports_failure_and_no_success() {
    let dumper = Arc::new(FakeDumper::default());
    let uploader = Arc::new(FakeUploader {
        rejected: HashSet::from(["Orders".to_string()]),
        ..Default::default()
    });
    let reporter = Arc::new(RecordingReporter::default());

    let summary = job(two_database_settings(), &dumper, &uploader, &reporter)
        .run()
        .await;

    assert_eq!(
        *reporter.events.lock().unwrap(),
        vec![
            Reported::Failure(
                "Orders".into(),
                "Storage error with status 403: AuthorizationFailure".into()
            ),
            Reported::Success("Users".into()),
        ]
    );
    assert_eq!(summary.succeeded(), 1);
    assert!(!summary.outcomes[0].is_success());
    assert_eq!(summary.outcomes[0].database(), "Orders");
}

#[tokio::test]
async fn no_configured_databases_means_no_work() {
    let settings: Arc<Settings> = Arc::new(
        [
            ("ConnectionStrings:Storage", "UseDevelopmentStorage=true"),
            ("StorageContainerName", "backups"),
        ]
        .into_iter()
        .collect(),
    );
    let dumper = Arc::new(FakeDumper::default());
    let uploader = Arc::new(FakeUploader::default());
    let reporter = Arc::new(RecordingReporter::default());

    let summary = job(settings, &dumper, &uploader, &reporter).run().await;

    assert!(summary.is_empty());
    assert!(dumper.calls.lock().unwrap().is_empty());
    assert!(uploader.uploads.lock().unwrap().is_empty());
    assert!(reporter.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_storage_settings_fail_each_database() {
    let settings: Arc<Settings> = Arc::new(
        [
            ("ConnectionStrings:Database-Orders", "connA"),
            ("ConnectionStrings:Database-Users", "connB"),
        ]
        .into_iter()
        .collect(),
    );
    let dumper = Arc::new(FakeDumper::default());
    let uploader = Arc::new(AzureBlobUploader::new(settings.clone()).unwrap());
    let reporter = Arc::new(RecordingReporter::default());

    let summary = BackupJob::new(settings, dumper.clone(), uploader, reporter.clone())
        .run()
        .await;

    assert_eq!(dumper.calls.lock().unwrap().len(), 2);
    assert_eq!(summary.failed(), 2);
    for outcome in &summary.outcomes {
        match outcome {
            BackupOutcome::Failed { error, .. } => {
                assert_eq!(error.kind(), ErrorKind::ConfigMissing);
                assert_eq!(
                    error.to_string(),
                    "Missing configuration key: ConnectionStrings:Storage"
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
