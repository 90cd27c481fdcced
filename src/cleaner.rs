//! Type coercion and normalization of the raw input tables.
//!
//! The [`Cleaner`] owns copies of the raw tables it was built from, so callers
//! keep their originals untouched and cleaning can be repeated with identical
//! results.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::analyzers::utility::mean;
use crate::config::DashboardConfig;
use crate::model::{
    AttendanceRecord, AttendanceTable, DemographicKey, GroupRate, KEY_COLUMNS, SCORE_COLUMNS,
    Scores, SubjectRecord, SubjectTable, parse_number,
};
use crate::parser::{RawTable, SchemaError};

const DATE_FORMATS: [&str; 3] = ["%Y%m%d", "%Y-%m-%d", "%m/%d/%Y"];

/// Output of [`Cleaner::clean`].
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedData {
    pub first: SubjectTable,
    pub second: SubjectTable,
    /// `None` when no attendance dataset was supplied.
    pub attendance: Option<AttendanceTable>,
    /// Mean attendance rate per group, ordered by group label.
    pub group_attendance: Option<Vec<GroupRate>>,
}

impl CleanedData {
    /// Group → rate lookup for the left join.
    pub fn group_rates(&self) -> BTreeMap<&str, f64> {
        self.group_attendance
            .iter()
            .flatten()
            .map(|g| (g.group.as_str(), g.attendance_rate))
            .collect()
    }
}

pub struct Cleaner {
    first: RawTable,
    second: RawTable,
    attendance: Option<RawTable>,
    config: DashboardConfig,
}

impl Cleaner {
    pub fn new(
        first: &RawTable,
        second: &RawTable,
        attendance: Option<&RawTable>,
        config: &DashboardConfig,
    ) -> Self {
        Self {
            first: first.clone(),
            second: second.clone(),
            attendance: attendance.cloned(),
            config: config.clone(),
        }
    }

    /// Coerces, normalizes and aggregates all tables.
    ///
    /// # Errors
    ///
    /// Fails with a [`SchemaError`] when an expected column is missing.
    #[tracing::instrument(skip(self))]
    pub fn clean(&self) -> Result<CleanedData> {
        let first = clean_subject(&self.first, &self.config.first_subject)?;
        let second = clean_subject(&self.second, &self.config.second_subject)?;

        let attendance = match &self.attendance {
            Some(raw) => Some(clean_attendance(raw, &self.config.school_map)?),
            None => None,
        };
        let group_attendance = attendance.as_ref().map(aggregate_by_group);

        info!(
            first_rows = first.len(),
            second_rows = second.len(),
            attendance_rows = attendance.as_ref().map(|a| a.records.len()),
            groups = group_attendance.as_ref().map(Vec::len),
            "Cleaned input tables"
        );

        Ok(CleanedData {
            first,
            second,
            attendance,
            group_attendance,
        })
    }
}

/// Converts a raw grade table into typed records.
///
/// Grades and absences that do not parse become missing. School codes are
/// trimmed and uppercased.
pub fn clean_subject(raw: &RawTable, subject: &str) -> Result<SubjectTable, SchemaError> {
    raw.require(subject, &KEY_COLUMNS)?;
    raw.require(subject, &SCORE_COLUMNS)?;

    let key_idx: Vec<usize> = KEY_COLUMNS
        .iter()
        .filter_map(|c| raw.column(c))
        .collect();
    let score_idx: Vec<usize> = SCORE_COLUMNS
        .iter()
        .filter_map(|c| raw.column(c))
        .collect();
    let reserved: HashSet<usize> = key_idx.iter().chain(&score_idx).copied().collect();

    let extra_idx: Vec<usize> = (0..raw.headers.len())
        .filter(|i| !reserved.contains(i))
        .collect();
    let extra_columns = extra_idx.iter().map(|&i| raw.headers[i].clone()).collect();

    let mut invalid = 0usize;
    let mut records = Vec::with_capacity(raw.len());

    for row in 0..raw.len() {
        let mut values: [String; 12] = Default::default();
        for (slot, &col) in values.iter_mut().zip(&key_idx) {
            *slot = raw.cell(row, col).to_string();
        }
        values[0] = values[0].to_uppercase();

        let mut numbers = [None; 4];
        for (slot, &col) in numbers.iter_mut().zip(&score_idx) {
            let cell = raw.cell(row, col);
            *slot = parse_number(cell);
            if slot.is_none() && !cell.is_empty() {
                invalid += 1;
            }
        }
        let [g1, g2, g3, absences] = numbers;

        records.push(SubjectRecord {
            key: DemographicKey::from_values(values),
            scores: Scores {
                g1,
                g2,
                g3,
                absences,
                extra: extra_idx
                    .iter()
                    .map(|&c| raw.cell(row, c).to_string())
                    .collect(),
            },
        });
    }

    if invalid > 0 {
        warn!(subject, invalid, "Non-numeric grade or absence values set to missing");
    }

    Ok(SubjectTable {
        subject: subject.to_string(),
        extra_columns,
        records,
    })
}

/// Converts a raw attendance table into typed records with a per-row rate.
///
/// The group label comes from a `school` column when present, otherwise from
/// `School DBN` mapped through `school_map`. The rate is taken, in order of
/// preference, from a `Status` label (which replaces any `Present`/`Enrolled`
/// counts), from `Present`/`Enrolled`, or from an `attendance_rate` column.
pub fn clean_attendance(
    raw: &RawTable,
    school_map: &BTreeMap<String, String>,
) -> Result<AttendanceTable, SchemaError> {
    const TABLE: &str = "attendance";

    let school_col = raw.column("school");
    let dbn_col = raw.column("School DBN");
    if school_col.is_none() && dbn_col.is_none() {
        return Err(SchemaError::NoAttendanceGroup(TABLE.to_string()));
    }

    let counts = raw.column("Present").zip(raw.column("Enrolled"));
    let status_col = raw.column("Status");
    let rate_col = raw.column("attendance_rate");
    if counts.is_none() && status_col.is_none() && rate_col.is_none() {
        return Err(SchemaError::NoAttendanceMeasure(TABLE.to_string()));
    }
    let date_col = raw.column("Date");

    let mut unmapped = 0usize;
    let mut records = Vec::with_capacity(raw.len());

    for row in 0..raw.len() {
        let group = match (school_col, dbn_col) {
            (Some(col), _) => Some(raw.cell(row, col).to_uppercase()).filter(|s| !s.is_empty()),
            (None, Some(col)) => school_map.get(raw.cell(row, col)).cloned(),
            (None, None) => None,
        };
        if group.is_none() {
            unmapped += 1;
        }

        let (present, enrolled) = match (status_col, counts) {
            (Some(s), _) => {
                let present = raw.cell(row, s).eq_ignore_ascii_case("present");
                (Some(if present { 1.0 } else { 0.0 }), Some(1.0))
            }
            (None, Some((p, e))) => (
                parse_number(raw.cell(row, p)),
                parse_number(raw.cell(row, e)),
            ),
            (None, None) => (None, None),
        };

        let rate = match (present, enrolled) {
            (Some(p), Some(e)) => Some(p / e).filter(|r| r.is_finite()),
            _ => rate_col.and_then(|c| parse_number(raw.cell(row, c))),
        };

        records.push(AttendanceRecord {
            group,
            date: date_col.and_then(|c| parse_date(raw.cell(row, c))),
            present,
            enrolled,
            rate,
        });
    }

    if unmapped > 0 {
        warn!(unmapped, "Attendance rows without a known school were ignored");
    }
    debug!(rows = records.len(), "Attendance cleaned");

    Ok(AttendanceTable { records })
}

/// Mean rate per group. Rows without a group or rate are skipped, as are
/// groups left with no rate at all.
pub fn aggregate_by_group(attendance: &AttendanceTable) -> Vec<GroupRate> {
    let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for record in &attendance.records {
        if let (Some(group), Some(rate)) = (&record.group, record.rate) {
            series.entry(group.as_str()).or_default().push(rate);
        }
    }

    series
        .into_iter()
        .map(|(group, rates)| GroupRate {
            group: group.to_string(),
            attendance_rate: mean(&rates),
            observations: rates.len(),
        })
        .collect()
}

/// Parses an attendance date in any of the accepted formats.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject_raw(rows: &[[&str; 16]]) -> RawTable {
        let mut headers: Vec<String> = KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
        headers.extend(SCORE_COLUMNS.iter().map(|c| c.to_string()));
        RawTable::new(
            headers,
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn row<'a>(school: &'a str, grades: [&'a str; 4]) -> [&'a str; 16] {
        [
            school, "F", "18", "U", "GT3", "A", "4", "4", "at_home", "teacher", "course",
            "mother", grades[0], grades[1], grades[2], grades[3],
        ]
    }

    fn attendance_raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_clean_subject_coerces_numbers() {
        let raw = subject_raw(&[row("gp", ["10", "x", "", "3"])]);
        let table = clean_subject(&raw, "math").unwrap();

        let scores = &table.records[0].scores;
        assert_eq!(scores.g1, Some(10.0));
        assert_eq!(scores.g2, None);
        assert_eq!(scores.g3, None);
        assert_eq!(scores.absences, Some(3.0));
        assert_eq!(table.records[0].key.school, "GP");
    }

    #[test]
    fn test_clean_subject_keeps_extra_columns() {
        let mut raw = subject_raw(&[row("GP", ["1", "2", "3", "4"])]);
        raw.headers.push("studytime".into());
        raw.rows[0].push("2".into());

        let table = clean_subject(&raw, "por").unwrap();
        assert_eq!(table.extra_columns, vec!["studytime"]);
        assert_eq!(table.records[0].scores.extra, vec!["2"]);
    }

    #[test]
    fn test_clean_subject_missing_grade_column() {
        let raw = RawTable::new(KEY_COLUMNS.iter().map(|c| c.to_string()).collect(), vec![]);
        let err = clean_subject(&raw, "math").unwrap_err();
        assert_eq!(err.to_string(), "missing column 'G1' in math table");
    }

    #[test]
    fn test_attendance_from_counts_and_dbn_map() {
        let map: BTreeMap<String, String> =
            [("01M015".to_string(), "GP".to_string())].into_iter().collect();
        let raw = attendance_raw(
            &["School DBN", "Date", "Enrolled", "Present"],
            &[
                &["01M015", "20180905", "20", "18"],
                &["99X999", "20180905", "10", "10"],
            ],
        );
        let table = clean_attendance(&raw, &map).unwrap();

        let first = &table.records[0];
        assert_eq!(first.group.as_deref(), Some("GP"));
        assert_eq!(first.rate, Some(0.9));
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2018, 9, 5));
        assert_eq!(table.records[1].group, None);
    }

    #[test]
    fn test_attendance_from_status_labels() {
        let raw = attendance_raw(
            &["school", "Date", "Status"],
            &[
                &["gp", "2024-01-02", "Present"],
                &["GP", "2024-01-03", "absent"],
            ],
        );
        let table = clean_attendance(&raw, &BTreeMap::new()).unwrap();

        assert_eq!(table.records[0].rate, Some(1.0));
        assert_eq!(table.records[1].rate, Some(0.0));
        assert_eq!(table.records[0].group.as_deref(), Some("GP"));

        let groups = aggregate_by_group(&table);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].attendance_rate, 0.5);
        assert_eq!(groups[0].observations, 2);
    }

    #[test]
    fn test_status_overrides_counts() {
        let raw = attendance_raw(
            &["school", "Status", "Present", "Enrolled"],
            &[&["GP", "Absent", "18", "20"], &["GP", "present", "0", "20"]],
        );
        let table = clean_attendance(&raw, &BTreeMap::new()).unwrap();

        assert_eq!(table.records[0].present, Some(0.0));
        assert_eq!(table.records[0].enrolled, Some(1.0));
        assert_eq!(table.records[0].rate, Some(0.0));
        assert_eq!(table.records[1].rate, Some(1.0));
    }

    #[test]
    fn test_attendance_pre_aggregated_rate() {
        let raw = attendance_raw(&["school", "attendance_rate"], &[&["MS", "0.82"]]);
        let table = clean_attendance(&raw, &BTreeMap::new()).unwrap();
        assert_eq!(table.records[0].rate, Some(0.82));
    }

    #[test]
    fn test_zero_enrolled_is_missing_rate() {
        let raw = attendance_raw(&["school", "Present", "Enrolled"], &[&["GP", "0", "0"]]);
        let table = clean_attendance(&raw, &BTreeMap::new()).unwrap();
        assert_eq!(table.records[0].rate, None);
        assert!(aggregate_by_group(&table).is_empty());
    }

    #[test]
    fn test_attendance_without_group_or_measure() {
        let no_group = attendance_raw(&["Present", "Enrolled"], &[]);
        assert_eq!(
            clean_attendance(&no_group, &BTreeMap::new()).unwrap_err(),
            SchemaError::NoAttendanceGroup("attendance".into())
        );

        let no_measure = attendance_raw(&["school", "Date"], &[]);
        assert_eq!(
            clean_attendance(&no_measure, &BTreeMap::new()).unwrap_err(),
            SchemaError::NoAttendanceMeasure("attendance".into())
        );
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2018, 9, 5);
        assert_eq!(parse_date("20180905"), expected);
        assert_eq!(parse_date("2018-09-05"), expected);
        assert_eq!(parse_date("09/05/2018"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_cleaner_leaves_inputs_untouched() {
        let raw = subject_raw(&[row("gp", ["10", "11", "12", "0"])]);
        let before = raw.clone();
        let config = DashboardConfig::default();
        let cleaner = Cleaner::new(&raw, &raw, None, &config);

        let a = cleaner.clean().unwrap();
        let b = cleaner.clean().unwrap();

        assert_eq!(raw, before);
        assert_eq!(a, b);
        assert!(a.group_attendance.is_none());
    }
}
