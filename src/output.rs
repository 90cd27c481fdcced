//! Output formatting and persistence for merged tables and reports.
//!
//! Supports pretty-printing, JSON serialization, and CSV export.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Debug;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::model::MergedTable;
use crate::risk::{RiskThresholds, classify};
use csv::WriterBuilder;

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty(value: &impl Debug) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Renders a merged table as delimited text with a header row.
pub fn table_to_csv(table: &MergedTable, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(table.headers())?;
    for record in &table.records {
        writer.write_record(table.row(record))?;
    }
    Ok(writer.into_inner()?)
}

/// Renders an at-risk table with one extra column per risk condition.
pub fn at_risk_to_csv(
    table: &MergedTable,
    thresholds: &RiskThresholds,
    delimiter: u8,
) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    let mut headers = table.headers();
    headers.extend(["low_grade", "low_attendance"].map(String::from));
    writer.write_record(&headers)?;

    for record in &table.records {
        let flags = classify(record, thresholds);
        let mut row = table.row(record);
        row.push(flags.low_grade.to_string());
        row.push(flags.low_attendance.to_string());
        writer.write_record(&row)?;
    }
    Ok(writer.into_inner()?)
}

/// Writes the merged table to `path` as comma-separated values.
pub fn write_table(path: &str, table: &MergedTable) -> Result<()> {
    write_bytes(path, &table_to_csv(table, b',')?)?;
    info!(path, rows = table.len(), "Wrote merged table");
    Ok(())
}

/// Writes the at-risk subset to `path` as comma-separated values.
pub fn write_at_risk(path: &str, table: &MergedTable, thresholds: &RiskThresholds) -> Result<()> {
    write_bytes(path, &at_risk_to_csv(table, thresholds, b',')?)?;
    info!(path, rows = table.len(), "Wrote at-risk students");
    Ok(())
}

/// Writes a value to `path` as pretty-printed JSON.
pub fn write_json(path: &str, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &body)?;
    info!(path, bytes = body.len(), "Wrote JSON");
    Ok(())
}

fn write_bytes(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
    }
    debug!(path, bytes = bytes.len(), "Writing file");
    let mut file = File::create(path).with_context(|| format!("creating {path}"))?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(())
}
