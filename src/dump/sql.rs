//! Text rendering for MySQL dump statements.

use std::fmt::Write as _;

/// How a column's text-protocol value is written back as a SQL literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    Numeric,
    Binary,
    Text,
}

impl ColumnClass {
    /// Classify by the server-reported type name, e.g. `INT UNSIGNED` or `BLOB`.
    pub fn from_type_name(type_name: &str) -> Self {
        let base = type_name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match base.as_str() {
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "DECIMAL"
            | "NUMERIC" | "FLOAT" | "DOUBLE" | "YEAR" | "BOOLEAN" => ColumnClass::Numeric,
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => ColumnClass::Binary,
            _ => ColumnClass::Text,
        }
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Backslash-escape a string for use inside single quotes.
pub fn escape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    for ch in raw.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out
}

/// Render one value as a SQL literal.
pub fn render_value(class: ColumnClass, raw: Option<&[u8]>) -> String {
    let Some(bytes) = raw else {
        return "NULL".to_string();
    };
    match class {
        ColumnClass::Numeric => String::from_utf8_lossy(bytes).into_owned(),
        ColumnClass::Binary if bytes.is_empty() => "''".to_string(),
        ColumnClass::Binary => {
            let mut out = String::with_capacity(2 + bytes.len() * 2);
            out.push_str("0x");
            for b in bytes {
                let _ = write!(out, "{b:02X}");
            }
            out
        }
        ColumnClass::Text => format!("'{}'", escape_string(&String::from_utf8_lossy(bytes))),
    }
}

/// Accumulates row tuples into multi-row INSERT statements, starting a new
/// statement whenever the next row would push the current one past
/// `max_statement_len` bytes. A single oversized row still gets its own
/// statement.
pub struct InsertBatcher {
    header: String,
    max_statement_len: usize,
    current: String,
    rows: usize,
}

impl InsertBatcher {
    pub fn new(table: &str, columns: &[String], max_statement_len: usize) -> Self {
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(",");
        Self {
            header: format!(
                "INSERT INTO {}({}) VALUES",
                quote_identifier(table),
                column_list
            ),
            max_statement_len,
            current: String::new(),
            rows: 0,
        }
    }

    /// Append a row of already rendered literals. Completed statements are
    /// flushed into `out`.
    pub fn push_row(&mut self, values: &[String], out: &mut String) {
        let tuple = format!("({})", values.join(","));

        if self.rows > 0 && self.current.len() + tuple.len() + 2 > self.max_statement_len {
            self.flush(out);
        }
        if self.rows == 0 {
            self.current.push_str(&self.header);
            self.current.push('\n');
        } else {
            self.current.push_str(",\n");
        }
        self.current.push_str(&tuple);
        self.rows += 1;
    }

    pub fn finish(mut self, out: &mut String) {
        self.flush(out);
    }

    fn flush(&mut self, out: &mut String) {
        if self.rows == 0 {
            return;
        }
        out.push_str(&self.current);
        out.push_str(";\n");
        self.current.clear();
        self.rows = 0;
    }
}
