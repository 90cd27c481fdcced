//! Delimited-text parser for the grade and attendance datasets.

use anyhow::Result;
use csv::ReaderBuilder;
use thiserror::Error;

/// Schema problems detected while reading or querying a table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing column '{column}' in {table} table")]
    MissingColumn { table: String, column: String },

    #[error("{0} table has no group column (expected 'school' or 'School DBN')")]
    NoAttendanceGroup(String),

    #[error(
        "{0} table has no attendance measure (expected 'Present'/'Enrolled', 'Status' or 'attendance_rate')"
    )]
    NoAttendanceMeasure(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

/// An untyped table: one header row and string cells.
///
/// Every row has exactly `headers.len()` cells; short rows are padded with
/// empty strings and surplus cells are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Position of `name` in the header row.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Fails with the first of `columns` that the table does not carry.
    pub fn require(&self, table: &str, columns: &[&str]) -> Result<(), SchemaError> {
        match columns.iter().find(|c| !self.has_column(c)) {
            Some(column) => Err(SchemaError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Cell text at (`row`, `col`), empty if out of range.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads a delimited table from raw bytes.
///
/// Header names and cells are trimmed. A UTF-8 byte-order mark on the first
/// header is stripped.
///
/// # Errors
///
/// Returns an error if the bytes are not valid delimited text.
pub fn read_table(bytes: &[u8], delimiter: u8) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            // The UCI exports quote their headers, which csv already strips.
            h.trim().to_string()
        })
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable::new(headers, rows))
}
