use crate::error::BackupError;
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use std::str::FromStr;
use tracing::debug;

const DEFAULT_PORT: u16 = 3306;

/// Connection parameters for a MySQL server, parsed from either an
/// ADO-style `Key=Value;` string or a `mysql://` URL.
#[derive(Clone)]
pub struct MySqlTarget {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub ssl_mode: Option<MySqlSslMode>,
    pub charset: Option<String>,
}

impl std::fmt::Debug for MySqlTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("charset", &self.charset)
            .finish()
    }
}

impl Default for MySqlTarget {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            charset: None,
        }
    }
}

impl MySqlTarget {
    /// Build connect options for sqlx. URLs are handed to sqlx unchanged.
    pub fn connect_options(connection_string: &str) -> Result<MySqlConnectOptions, BackupError> {
        let trimmed = connection_string.trim();
        if trimmed.starts_with("mysql://") || trimmed.starts_with("mariadb://") {
            return MySqlConnectOptions::from_str(trimmed)
                .map_err(|e| BackupError::InvalidConnectionString(e.to_string()));
        }
        Ok(Self::parse(trimmed)?.to_connect_options())
    }

    /// Parse an ADO-style connection string such as
    /// `Server=db;Port=3306;Database=shop;Uid=backup;Pwd=secret`.
    pub fn parse(connection_string: &str) -> Result<Self, BackupError> {
        let mut target = Self::default();
        let mut saw_pair = false;

        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                BackupError::InvalidConnectionString(format!("expected key=value, got `{segment}`"))
            })?;
            saw_pair = true;

            let value = unquote(value.trim()).to_string();
            let key = key.trim().to_ascii_lowercase().replace(' ', "");
            match key.as_str() {
                "server" | "host" | "datasource" | "address" | "addr" | "networkaddress" => {
                    target.host = value;
                }
                "port" => {
                    target.port = value.parse().map_err(|_| {
                        BackupError::InvalidConnectionString(format!("invalid port `{value}`"))
                    })?;
                }
                "database" | "initialcatalog" => target.database = Some(value),
                "uid" | "userid" | "user" | "username" => target.username = Some(value),
                "pwd" | "password" => target.password = Some(value),
                "sslmode" => target.ssl_mode = Some(parse_ssl_mode(&value)?),
                "charset" | "characterset" => target.charset = Some(value),
                other => debug!(key = other, "ignoring unsupported connection string option"),
            }
        }

        if !saw_pair {
            return Err(BackupError::InvalidConnectionString(
                "connection string is empty".to_string(),
            ));
        }
        Ok(target)
    }

    pub fn to_connect_options(&self) -> MySqlConnectOptions {
        let mut opts = MySqlConnectOptions::new().host(&self.host).port(self.port);
        if let Some(user) = &self.username {
            opts = opts.username(user);
        }
        if let Some(password) = &self.password {
            opts = opts.password(password);
        }
        if let Some(database) = &self.database {
            opts = opts.database(database);
        }
        if let Some(mode) = &self.ssl_mode {
            opts = opts.ssl_mode(mode.clone());
        }
        if let Some(charset) = &self.charset {
            opts = opts.charset(charset);
        }
        opts
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn parse_ssl_mode(value: &str) -> Result<MySqlSslMode, BackupError> {
    match value.to_ascii_lowercase().as_str() {
        "none" | "disabled" => Ok(MySqlSslMode::Disabled),
        "preferred" => Ok(MySqlSslMode::Preferred),
        "required" => Ok(MySqlSslMode::Required),
        "verifyca" | "verify_ca" => Ok(MySqlSslMode::VerifyCa),
        "verifyfull" | "verify_identity" | "verifyidentity" => Ok(MySqlSslMode::VerifyIdentity),
        _ => Err(BackupError::InvalidConnectionString(format!(
            "unknown SslMode `{value}`"
        ))),
    }
}
