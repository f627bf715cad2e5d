//! Logical SQL dumps.
//!
//! Layout:
//! - `connection_string.rs`: ADO-style / URL connection strings into sqlx options
//! - `sql.rs`: text rendering of identifiers, values and INSERT batches
//! - `mysql.rs`: the MySQL exporter built on sqlx

pub mod connection_string;
pub mod mysql;
pub mod sql;

use crate::error::BackupError;
use async_trait::async_trait;

pub use connection_string::MySqlTarget;
pub use mysql::{DumpOptions, MySqlDumper};

/// Produces a complete textual dump of one database.
#[async_trait]
pub trait DumpProducer: Send + Sync {
    async fn dump(&self, connection_string: &str) -> Result<String, BackupError>;
}
