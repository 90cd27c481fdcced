//! At-risk detection over a merged table.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{MergedRecord, MergedTable};

/// Floors below which a student is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Average final grade floor (0–20 scale).
    pub grade: f64,
    /// Attendance rate floor (0–1).
    pub attendance: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            grade: 10.0,
            attendance: 0.90,
        }
    }
}

/// Which conditions fired for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskFlags {
    pub low_grade: bool,
    pub low_attendance: bool,
}

impl RiskFlags {
    pub fn at_risk(&self) -> bool {
        self.low_grade || self.low_attendance
    }
}

/// Evaluates both floors independently. A missing value never falls below a floor.
pub fn classify(record: &MergedRecord, thresholds: &RiskThresholds) -> RiskFlags {
    RiskFlags {
        low_grade: below(record.avg_grade, thresholds.grade),
        low_attendance: below(record.attendance_rate, thresholds.attendance),
    }
}

fn below(value: Option<f64>, floor: f64) -> bool {
    matches!(value, Some(v) if v < floor)
}

/// Rows whose average grade or attendance rate is below its floor.
pub fn detect_at_risk(table: &MergedTable, thresholds: &RiskThresholds) -> MergedTable {
    let records: Vec<MergedRecord> = table
        .records
        .iter()
        .filter(|r| classify(r, thresholds).at_risk())
        .cloned()
        .collect();

    info!(
        grade_threshold = thresholds.grade,
        attendance_threshold = thresholds.attendance,
        at_risk = records.len(),
        total = table.len(),
        "At-risk detection complete"
    );

    table.with_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceSource, DemographicKey, Scores};

    fn record(avg_grade: Option<f64>, attendance_rate: Option<f64>) -> MergedRecord {
        MergedRecord {
            key: DemographicKey::from_values(Default::default()),
            first: Scores::default(),
            second: Scores::default(),
            attendance_rate,
            attendance_source: AttendanceSource::Attendance,
            avg_grade,
            total_absences: None,
        }
    }

    fn table(records: Vec<MergedRecord>) -> MergedTable {
        MergedTable {
            first_subject: "math".into(),
            second_subject: "por".into(),
            first_extra_columns: vec![],
            second_extra_columns: vec![],
            records,
        }
    }

    #[test]
    fn test_defaults() {
        let t = RiskThresholds::default();
        assert_eq!(t.grade, 10.0);
        assert_eq!(t.attendance, 0.90);
    }

    #[test]
    fn test_grade_alone_flags() {
        let flags = classify(&record(Some(8.5), Some(18.0 / 20.0)), &RiskThresholds::default());
        assert!(flags.low_grade);
        assert!(!flags.low_attendance);
        assert!(flags.at_risk());
    }

    #[test]
    fn test_attendance_alone_flags() {
        let flags = classify(&record(Some(15.0), Some(0.5)), &RiskThresholds::default());
        assert!(!flags.low_grade);
        assert!(flags.low_attendance);
    }

    #[test]
    fn test_floors_are_exclusive() {
        let flags = classify(&record(Some(10.0), Some(0.9)), &RiskThresholds::default());
        assert!(!flags.at_risk());
    }

    #[test]
    fn test_missing_values_never_flag() {
        let flags = classify(&record(None, None), &RiskThresholds::default());
        assert_eq!(flags, RiskFlags::default());
    }

    #[test]
    fn test_detect_filters_rows() {
        let t = table(vec![
            record(Some(8.5), Some(0.95)),
            record(Some(14.0), Some(0.95)),
            record(Some(14.0), Some(0.7)),
        ]);
        let at_risk = detect_at_risk(&t, &RiskThresholds::default());

        assert_eq!(at_risk.len(), 2);
        assert_eq!(at_risk.records[0].avg_grade, Some(8.5));
        assert_eq!(at_risk.records[1].attendance_rate, Some(0.7));
        assert_eq!(at_risk.headers(), t.headers());
    }

    #[test]
    fn test_detect_on_empty_table() {
        let at_risk = detect_at_risk(&table(vec![]), &RiskThresholds::default());
        assert!(at_risk.is_empty());
    }
}
