use crate::config::Settings;
use tracing::{debug, warn};

/// Key prefix marking a database to back up; the remainder is its name.
pub const DATABASE_KEY_PREFIX: &str = "ConnectionStrings:Database-";

/// One database to back up during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub name: String,
    pub connection_string: String,
}

/// Collect every `ConnectionStrings:Database-{name}` entry, in key order.
pub fn resolve(settings: &Settings) -> Vec<DatabaseEntry> {
    let databases: Vec<DatabaseEntry> = settings
        .with_prefix(DATABASE_KEY_PREFIX)
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(DATABASE_KEY_PREFIX)?;
            if name.is_empty() {
                warn!(key, "database connection string without a name; skipping");
                return None;
            }
            Some(DatabaseEntry {
                name: name.to_string(),
                connection_string: value.to_string(),
            })
        })
        .collect();

    debug!(count = databases.len(), "resolved databases to back up");
    databases
}
