use super::DumpProducer;
use super::connection_string::MySqlTarget;
use super::sql::{ColumnClass, InsertBatcher, quote_identifier, render_value};
use crate::error::BackupError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};
use tracing::{debug, info, warn};

/// Largest INSERT statement emitted before starting a new one.
pub const DEFAULT_MAX_STATEMENT_LEN: usize = 1024 * 1024;

/// Position of `Extra` in `SHOW FULL COLUMNS` output.
const EXTRA_COLUMN: usize = 6;

#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub max_statement_len: usize,
    pub include_views: bool,
    pub include_triggers: bool,
    pub include_routines: bool,
    /// Emit `CREATE DATABASE IF NOT EXISTS` and `USE` for the source schema.
    pub create_database: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            max_statement_len: DEFAULT_MAX_STATEMENT_LEN,
            include_views: true,
            include_triggers: true,
            include_routines: true,
            create_database: false,
        }
    }
}

/// Exports a MySQL database (schema and data) as a SQL script.
///
/// Every query runs through the text protocol so each value arrives as the
/// server's own textual rendering and can be written back without decoding.
#[derive(Debug, Clone, Default)]
pub struct MySqlDumper {
    options: DumpOptions,
}

#[async_trait]
impl DumpProducer for MySqlDumper {
    async fn dump(&self, connection_string: &str) -> Result<String, BackupError> {
        let opts = MySqlTarget::connect_options(connection_string)?;
        let mut conn = MySqlConnection::connect_with(&opts)
            .await
            .map_err(BackupError::Connection)?;

        let result = self.export(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "failed to close database connection cleanly");
        }
        result
    }
}

impl MySqlDumper {
    pub fn new(options: DumpOptions) -> Self {
        Self { options }
    }

    async fn export(&self, conn: &mut MySqlConnection) -> Result<String, BackupError> {
        let database = query_scalar(conn, "SELECT DATABASE()")
            .await?
            .ok_or(BackupError::NoDatabaseSelected)?;
        let server_version = query_scalar(conn, "SELECT VERSION()")
            .await?
            .unwrap_or_default();

        let mut out = String::new();
        write_header(
            &mut out,
            &database,
            &server_version,
            Utc::now(),
            self.options.create_database,
        );

        let mut tables = Vec::new();
        let mut views = Vec::new();
        for row in query_text(conn, "SHOW FULL TABLES").await? {
            let (Some(name), kind) = (cell(&row, 0), cell(&row, 1)) else {
                continue;
            };
            if kind.as_deref() == Some("VIEW") {
                views.push(name);
            } else {
                tables.push(name);
            }
        }

        for table in &tables {
            self.export_table(conn, table, &mut out).await?;
        }
        if self.options.include_views {
            for view in &views {
                export_view(conn, view, &mut out).await?;
            }
        }
        if self.options.include_triggers {
            export_triggers(conn, &mut out).await?;
        }
        if self.options.include_routines {
            export_routines(conn, &mut out).await?;
        }

        write_footer(&mut out, Utc::now());
        info!(
            database = %database,
            tables = tables.len(),
            views = views.len(),
            bytes = out.len(),
            "database exported"
        );
        Ok(out)
    }

    async fn export_table(
        &self,
        conn: &mut MySqlConnection,
        table: &str,
        out: &mut String,
    ) -> Result<(), BackupError> {
        let ident = quote_identifier(table);
        let create_rows = query_text(conn, &format!("SHOW CREATE TABLE {ident}")).await?;
        let create = create_rows
            .first()
            .and_then(|row| cell(row, 1))
            .unwrap_or_default();

        out.push_str(&format!(
            "\n--\n-- Definition of {ident}\n--\n\nDROP TABLE IF EXISTS {ident};\n{create};\n"
        ));

        out.push_str(&format!(
            "\n--\n-- Dumping data for table {ident}\n--\n\n/*!40000 ALTER TABLE {ident} DISABLE KEYS */;\n"
        ));

        let columns = insertable_columns(conn, table).await?;
        let mut row_count = 0usize;
        if !columns.is_empty() {
            let select = format!(
                "SELECT {} FROM {ident}",
                columns
                    .iter()
                    .map(|c| quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(",")
            );
            let mut rows = (&mut *conn).fetch(sqlx::raw_sql(&select));
            let mut batcher = InsertBatcher::new(table, &columns, self.options.max_statement_len);
            let mut classes: Option<Vec<ColumnClass>> = None;

            while let Some(row) = rows.try_next().await? {
                let classes = classes.get_or_insert_with(|| {
                    row.columns()
                        .iter()
                        .map(|c| ColumnClass::from_type_name(c.type_info().name()))
                        .collect()
                });
                let literals: Vec<String> = raw_values(&row)?
                    .iter()
                    .zip(classes.iter())
                    .map(|(value, class)| render_value(*class, value.as_deref()))
                    .collect();
                batcher.push_row(&literals, out);
                row_count += 1;
            }
            drop(rows);
            batcher.finish(out);
        }
        out.push_str(&format!("/*!40000 ALTER TABLE {ident} ENABLE KEYS */;\n"));

        debug!(table, rows = row_count, "table exported");
        Ok(())
    }
}

/// Columns that can be given a value on restore, in table order.
/// Generated columns are computed by the server and rejected in an INSERT.
async fn insertable_columns(
    conn: &mut MySqlConnection,
    table: &str,
) -> Result<Vec<String>, BackupError> {
    let rows = query_text(
        conn,
        &format!("SHOW FULL COLUMNS FROM {}", quote_identifier(table)),
    )
    .await?;
    Ok(rows
        .iter()
        .filter(|row| !is_generated(cell(row, EXTRA_COLUMN).as_deref().unwrap_or_default()))
        .filter_map(|row| cell(row, 0))
        .collect())
}

/// MySQL reports `VIRTUAL GENERATED` / `STORED GENERATED`; older MariaDB
/// releases use `VIRTUAL` / `PERSISTENT`.
fn is_generated(extra: &str) -> bool {
    extra.split_whitespace().any(|word| {
        ["VIRTUAL", "STORED", "PERSISTENT"]
            .iter()
            .any(|kind| word.eq_ignore_ascii_case(kind))
    })
}

async fn export_view(
    conn: &mut MySqlConnection,
    view: &str,
    out: &mut String,
) -> Result<(), BackupError> {
    let ident = quote_identifier(view);
    let rows = query_text(conn, &format!("SHOW CREATE VIEW {ident}")).await?;
    let Some(create) = rows.first().and_then(|row| cell(row, 1)) else {
        warn!(view, "view definition unavailable; skipping");
        return Ok(());
    };
    out.push_str(&format!(
        "\n--\n-- Definition of view {ident}\n--\n\nDROP TABLE IF EXISTS {ident};\nDROP VIEW IF EXISTS {ident};\n{create};\n"
    ));
    Ok(())
}

async fn export_triggers(conn: &mut MySqlConnection, out: &mut String) -> Result<(), BackupError> {
    let names: Vec<String> = query_text(conn, "SHOW TRIGGERS")
        .await?
        .iter()
        .filter_map(|row| cell(row, 0))
        .collect();

    for name in names {
        let ident = quote_identifier(&name);
        let rows = query_text(conn, &format!("SHOW CREATE TRIGGER {ident}")).await?;
        let Some(create) = rows.first().and_then(|row| cell(row, 2)) else {
            warn!(trigger = %name, "trigger definition unavailable; skipping");
            continue;
        };
        write_delimited(out, "trigger", &ident, "TRIGGER", &create);
    }
    Ok(())
}

async fn export_routines(conn: &mut MySqlConnection, out: &mut String) -> Result<(), BackupError> {
    let routines: Vec<(String, String)> = query_text(
        conn,
        "SELECT ROUTINE_NAME, ROUTINE_TYPE FROM information_schema.ROUTINES \
         WHERE ROUTINE_SCHEMA = DATABASE() ORDER BY ROUTINE_TYPE, ROUTINE_NAME",
    )
    .await?
    .iter()
    .filter_map(|row| Some((cell(row, 0)?, cell(row, 1)?)))
    .collect();

    for (name, kind) in routines {
        let kind = kind.to_ascii_uppercase();
        if kind != "PROCEDURE" && kind != "FUNCTION" {
            continue;
        }
        let ident = quote_identifier(&name);
        let rows = query_text(conn, &format!("SHOW CREATE {kind} {ident}")).await?;
        let Some(create) = rows.first().and_then(|row| cell(row, 2)) else {
            warn!(routine = %name, "routine definition unavailable (missing privileges?); skipping");
            continue;
        };
        write_delimited(out, &kind.to_ascii_lowercase(), &ident, &kind, &create);
    }
    Ok(())
}

fn write_delimited(out: &mut String, label: &str, ident: &str, kind: &str, create: &str) {
    out.push_str(&format!(
        "\n--\n-- Definition of {label} {ident}\n--\n\nDELIMITER |\nDROP {kind} IF EXISTS {ident} |\n{create} |\nDELIMITER ;\n"
    ));
}

fn write_header(
    out: &mut String,
    database: &str,
    server_version: &str,
    at: DateTime<Utc>,
    create_database: bool,
) {
    out.push_str(&format!(
        "-- dbvault {}\n\
         -- Dump time: {}\n\
         -- ------------------------------------------------------\n\
         -- Server version\t{}\n\
         -- Database: {}\n\n\
         /*!40101 SET NAMES utf8mb4 */;\n\
         /*!40014 SET @OLD_UNIQUE_CHECKS=@@UNIQUE_CHECKS, UNIQUE_CHECKS=0 */;\n\
         /*!40014 SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */;\n\
         /*!40101 SET @OLD_SQL_MODE=@@SQL_MODE, SQL_MODE='NO_AUTO_VALUE_ON_ZERO' */;\n\
         /*!40111 SET @OLD_SQL_NOTES=@@SQL_NOTES, SQL_NOTES=0 */;\n",
        env!("CARGO_PKG_VERSION"),
        at.format("%Y-%m-%d %H:%M:%S"),
        server_version,
        database,
    ));
    if create_database {
        let ident = quote_identifier(database);
        out.push_str(&format!(
            "\nCREATE DATABASE IF NOT EXISTS {ident};\nUSE {ident};\n"
        ));
    }
}

fn write_footer(out: &mut String, at: DateTime<Utc>) {
    out.push_str(&format!(
        "\n/*!40101 SET SQL_MODE=@OLD_SQL_MODE */;\n\
         /*!40014 SET FOREIGN_KEY_CHECKS=@OLD_FOREIGN_KEY_CHECKS */;\n\
         /*!40014 SET UNIQUE_CHECKS=@OLD_UNIQUE_CHECKS */;\n\
         /*!40111 SET SQL_NOTES=@OLD_SQL_NOTES */;\n\n\
         -- Dump completed on {}\n",
        at.format("%Y-%m-%d %H:%M:%S")
    ));
}

/// Raw text-protocol bytes for every column of `row`.
fn raw_values(row: &MySqlRow) -> Result<Vec<Option<Vec<u8>>>, BackupError> {
    (0..row.len())
        .map(|i| {
            row.try_get_unchecked::<Option<Vec<u8>>, _>(i)
                .map_err(BackupError::from)
        })
        .collect()
}

/// Run a metadata query and return every row as lossily decoded text.
async fn query_text(
    conn: &mut MySqlConnection,
    sql: &str,
) -> Result<Vec<Vec<Option<String>>>, BackupError> {
    let rows = (&mut *conn).fetch_all(sqlx::raw_sql(sql)).await?;
    rows.iter()
        .map(|row| -> Result<Vec<Option<String>>, BackupError> {
            Ok(raw_values(row)?
                .into_iter()
                .map(|v| v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
                .collect())
        })
        .collect()
}

async fn query_scalar(conn: &mut MySqlConnection, sql: &str) -> Result<Option<String>, BackupError> {
    Ok(query_text(conn, sql)
        .await?
        .first()
        .and_then(|row| cell(row, 0)))
}

fn cell(row: &[Option<String>], index: usize) -> Option<String> {
    row.get(index).cloned().flatten()
}
