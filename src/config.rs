//! Layered key/value settings.
//!
//! Two layers are merged, lowest precedence first:
//! - an optional JSON settings file (`local.settings.json` by default)
//! - process environment variables, with `__` as the hierarchy separator
//!
//! Both layers are flattened into `:`-separated keys, so
//! `{"ConnectionStrings": {"Storage": "..."}}` and the environment variable
//! `ConnectionStrings__Storage` both resolve to `ConnectionStrings:Storage`.
//! Environment values are kept exactly as set.

use crate::error::BackupError;
use figment::{
    Figment,
    providers::{Env, Format, Json},
    value::{Dict, Value},
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_FILE: &str = "local.settings.json";
/// Environment variable overriding the settings file location.
pub const SETTINGS_PATH_ENV: &str = "DBVAULT_SETTINGS";

pub const KEY_SEPARATOR: &str = ":";
const ENV_SEPARATOR: &str = "__";
pub const CONNECTION_STRINGS_SECTION: &str = "ConnectionStrings";
pub const VALUES_SECTION: &str = "Values";

pub const STORAGE_CONNECTION_NAME: &str = "Storage";
pub const STORAGE_CONTAINER_KEY: &str = "StorageContainerName";
pub const STORAGE_PREFIX_KEY: &str = "StorageBlobPrefix";

pub const SCHEDULE_KEY: &str = "BackupSchedule";
pub const RUN_ON_STARTUP_KEY: &str = "BackupRunOnStartup";
pub const RUN_ONCE_KEY: &str = "BackupRunOnce";
pub const LOG_LEVEL_KEY: &str = "LogLevel";

/// Sundays at 15:00 (UTC), seconds-first cron syntax.
pub const DEFAULT_SCHEDULE: &str = "0 0 15 * * Sun";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Resolved settings for one run. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    entries: BTreeMap<String, String>,
}

impl Settings {
    /// Build settings from the given file (optional) overlaid with the
    /// process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BackupError> {
        let mut settings = Self::default();
        settings.merge_file(path.as_ref())?;
        settings.merge_env(Env::raw().lowercase(false));
        Ok(settings)
    }

    /// Merge a JSON settings file, opened at exactly `path`. A missing file
    /// contributes nothing.
    ///
    /// Entries of a top-level `Values` object are also exposed at the root,
    /// without shadowing keys the file already defines there.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), BackupError> {
        let dict: Dict = Figment::from(Json::file_exact(path)).extract()?;

        let mut layer = BTreeMap::new();
        flatten_dict(None, &dict, &mut layer);

        if let Some(Value::Dict(_, values)) = dict.get(VALUES_SECTION) {
            let mut promoted = BTreeMap::new();
            flatten_dict(None, values, &mut promoted);
            for (key, value) in promoted {
                layer.entry(key).or_insert(value);
            }
        }

        self.entries.extend(layer);
        Ok(())
    }

    /// Merge environment variables; their keys override existing ones.
    /// `__` in a name becomes the `:` separator and values stay raw strings.
    pub fn merge_env(&mut self, env: Env) {
        for (key, value) in env.iter() {
            self.entries
                .insert(key.as_str().replace(ENV_SEPARATOR, KEY_SEPARATOR), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up `ConnectionStrings:{name}`.
    pub fn connection_string(&self, name: &str) -> Option<&str> {
        self.get(&format!(
            "{CONNECTION_STRINGS_SECTION}{KEY_SEPARATOR}{name}"
        ))
    }

    /// Like [`Settings::get`], but an absent key is an error.
    pub fn require(&self, key: &str) -> Result<&str, BackupError> {
        self.get(key)
            .ok_or_else(|| BackupError::ConfigMissing(key.to_string()))
    }

    pub fn require_connection_string(&self, name: &str) -> Result<&str, BackupError> {
        self.connection_string(name).ok_or_else(|| {
            BackupError::ConfigMissing(format!(
                "{CONNECTION_STRINGS_SECTION}{KEY_SEPARATOR}{name}"
            ))
        })
    }

    /// `true`, `yes`, `on` and `1` (any case) are truthy; everything else,
    /// including an absent key, is false.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "on" | "1"
            )
        })
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries whose key starts with `prefix`, in key order.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Settings file location: `$DBVAULT_SETTINGS`, else `local.settings.json`.
pub fn settings_path() -> PathBuf {
    std::env::var_os(SETTINGS_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
}

fn flatten_dict(prefix: Option<&str>, dict: &Dict, out: &mut BTreeMap<String, String>) {
    for (key, value) in dict {
        let path = match prefix {
            Some(p) => format!("{p}{KEY_SEPARATOR}{key}"),
            None => key.clone(),
        };
        flatten_value(path, value, out);
    }
}

fn flatten_value(path: String, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Dict(_, dict) => flatten_dict(Some(&path), dict, out),
        Value::Array(_, items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(format!("{path}{KEY_SEPARATOR}{index}"), item, out);
            }
        }
        scalar => {
            out.insert(path, scalar_to_string(scalar));
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(_, s) => s.clone(),
        Value::Char(_, c) => c.to_string(),
        Value::Bool(_, b) => b.to_string(),
        Value::Empty(..) => String::new(),
        other => serde_json::to_value(other)
            .map(|v| v.to_string())
            .unwrap_or_default(),
    }
}
