use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Missing configuration key: {0}")]
    ConfigMissing(String),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Unable to connect to database: {0}")]
    Connection(#[source] SqlxError),

    #[error("Dump failed: {0}")]
    Dump(#[from] SqlxError),

    #[error("No database selected by the connection string")]
    NoDatabaseSelected,

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Storage error with status {status}: {message}")]
    Storage { status: u16, message: String },

    #[error("Azure storage error: {0}")]
    Azure(#[from] azure_core::Error),

    #[error("Invalid storage connection string: {0}")]
    InvalidStorageAccount(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid backup schedule: {0}")]
    Schedule(#[from] cron::error::Error),
}

/// Coarse classification used when reporting per-database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    ConfigMissing,
    Connection,
    Dump,
    Storage,
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Config(_) | BackupError::Schedule(_) => ErrorKind::Config,
            BackupError::ConfigMissing(_) => ErrorKind::ConfigMissing,
            BackupError::InvalidConnectionString(_) | BackupError::Connection(_) => {
                ErrorKind::Connection
            }
            BackupError::Dump(_) | BackupError::NoDatabaseSelected => ErrorKind::Dump,
            BackupError::Reqwest(_)
            | BackupError::Storage { .. }
            | BackupError::Azure(_)
            | BackupError::InvalidStorageAccount(_)
            | BackupError::UrlParse(_) => ErrorKind::Storage,
        }
    }
}
