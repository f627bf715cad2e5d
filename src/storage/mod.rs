//! Blob storage for finished dumps.
//!
//! `azure.rs` holds the Azure Blob Storage uploader built on the Azure SDK.

pub mod azure;

use crate::error::BackupError;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime};

pub use azure::AzureBlobUploader;

/// Ticks (100 ns units) between 0001-01-01T00:00:00 and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Stores a dump under a fresh blob name and returns that name.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    async fn upload(&self, database: &str, sql: &str) -> Result<String, BackupError>;
}

/// `{prefix}/{database}/{year}_{month}_{day}_{ticks}.sql` for a wall-clock time.
pub fn blob_name(prefix: &str, database: &str, at: NaiveDateTime) -> String {
    format!(
        "{}/{}/{}_{}_{}_{}.sql",
        prefix,
        database,
        at.year(),
        at.month(),
        at.day(),
        ticks(at)
    )
}

/// 100-nanosecond intervals since 0001-01-01T00:00:00.
pub fn ticks(at: NaiveDateTime) -> i64 {
    let utc = at.and_utc();
    UNIX_EPOCH_TICKS
        + utc.timestamp() * TICKS_PER_SECOND
        + i64::from(utc.timestamp_subsec_nanos() / 100)
}
