//! End-to-end flow: load → clean → merge, plus the views built on top.

use anyhow::{Context, Result};

use crate::analyzers::analyzer::build_report;
use crate::analyzers::types::DashboardReport;
use crate::cleaner::{CleanedData, Cleaner};
use crate::config::DashboardConfig;
use crate::fetch::{HttpClient, load_source};
use crate::merger::Merger;
use crate::model::MergedTable;
use crate::parser::{RawTable, read_table};
use crate::risk::{RiskThresholds, detect_at_risk};

/// Where the three datasets come from: file paths or URLs.
#[derive(Debug, Clone)]
pub struct Sources {
    pub first: String,
    pub second: String,
    pub attendance: Option<String>,
}

/// Raw tables as read from the sources.
#[derive(Debug, Clone)]
pub struct RawTables {
    pub first: RawTable,
    pub second: RawTable,
    pub attendance: Option<RawTable>,
}

/// Loads and parses all sources concurrently.
pub async fn load_tables<C: HttpClient>(
    client: &C,
    sources: &Sources,
    config: &DashboardConfig,
) -> Result<RawTables> {
    let attendance = async {
        match &sources.attendance {
            Some(source) => load_source(client, source).await.map(Some),
            None => Ok(None),
        }
    };
    let (first, second, attendance) = tokio::try_join!(
        load_source(client, &sources.first),
        load_source(client, &sources.second),
        attendance,
    )?;

    let subject_delimiter = config.subject_delimiter_byte();
    Ok(RawTables {
        first: read_table(&first, subject_delimiter)
            .with_context(|| format!("parsing {}", sources.first))?,
        second: read_table(&second, subject_delimiter)
            .with_context(|| format!("parsing {}", sources.second))?,
        attendance: match (attendance, &sources.attendance) {
            (Some(bytes), Some(source)) => Some(
                read_table(&bytes, config.attendance_delimiter_byte())
                    .with_context(|| format!("parsing {source}"))?,
            ),
            _ => None,
        },
    })
}

/// Cleaned inputs and the merged table derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub data: CleanedData,
    pub merged: MergedTable,
}

impl Dashboard {
    pub fn from_tables(tables: &RawTables, config: &DashboardConfig) -> Result<Self> {
        let data = Cleaner::new(
            &tables.first,
            &tables.second,
            tables.attendance.as_ref(),
            config,
        )
        .clean()?;
        let merged = Merger::new(config.fallback_to_absences).merge(&data);
        Ok(Self { data, merged })
    }

    pub fn at_risk(&self, thresholds: &RiskThresholds) -> MergedTable {
        detect_at_risk(&self.merged, thresholds)
    }

    pub fn report(&self, thresholds: &RiskThresholds) -> Result<DashboardReport> {
        build_report(&self.data, &self.merged, thresholds)
    }
}
