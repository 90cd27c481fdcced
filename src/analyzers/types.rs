//! Data types used by the aggregation pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::GroupRate;
use crate::risk::RiskThresholds;

/// Means of several numeric columns for one group value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub group: String,
    pub count: usize,
    pub means: BTreeMap<String, Option<f64>>,
}

/// Mean grade for one semester column in both subjects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterTrend {
    pub semester: String,
    pub first: Option<f64>,
    pub second: Option<f64>,
}

/// Descriptive statistics for a single numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub median: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

/// Square matrix of pairwise correlations; `None` where undefined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

/// One histogram bin, `[lower, upper)` except the last which is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub label: String,
    pub bins: Vec<Bin>,
    /// Values outside the grade scale.
    pub out_of_range: usize,
    pub missing: usize,
}

/// Mean attendance rate per (month, day) cell; months and days are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceCalendar {
    pub months: Vec<u32>,
    pub days: Vec<u32>,
    pub rates: Vec<Vec<Option<f64>>>,
}

/// Record counts at each stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowCounts {
    pub first: usize,
    pub second: usize,
    pub attendance: Option<usize>,
    pub merged: usize,
    pub at_risk: usize,
    pub low_grade: usize,
    pub low_attendance: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlations {
    pub all: CorrelationMatrix,
    pub by_school: BTreeMap<String, CorrelationMatrix>,
    pub subjects: CorrelationMatrix,
    pub grades_attendance: CorrelationMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distributions {
    pub by_subject: Vec<Histogram>,
    pub by_semester: Vec<Histogram>,
}

/// Everything the dashboard charts consume, serialized as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub schema_version: u8,
    pub generated_at: DateTime<Utc>,
    pub subjects: [String; 2],
    pub thresholds: RiskThresholds,
    pub counts: RowCounts,
    pub grade_summary: Vec<ColumnSummary>,
    pub grade_bands: BTreeMap<String, Vec<(String, usize)>>,
    pub attendance_summary: Option<Vec<GroupRate>>,
    pub school_comparison: Vec<GroupMean>,
    pub gender_comparison: Vec<GroupMean>,
    pub grade_by_age: Vec<GroupMean>,
    pub semester_trends: Vec<SemesterTrend>,
    pub distributions: Distributions,
    pub correlations: Correlations,
    pub attendance_calendar: Option<AttendanceCalendar>,
}
