use chrono::Datelike;
use std::collections::{BTreeMap, BTreeSet};

use crate::analyzers::types::{AttendanceCalendar, GroupMean, SemesterTrend};
use crate::analyzers::utility::{mean, mean_present};
use crate::model::{AttendanceTable, KEY_COLUMNS, MergedTable, NumericColumn, parse_number};
use crate::parser::SchemaError;

/// Semester columns, in teaching order.
pub const SEMESTERS: [&str; 3] = ["G1", "G2", "G3"];

/// Looks up the named numeric columns, failing on the first unknown name.
pub(crate) fn select_columns(
    table: &MergedTable,
    names: &[&str],
) -> Result<Vec<NumericColumn>, SchemaError> {
    let all = table.numeric_columns();
    names
        .iter()
        .map(|name| {
            all.iter()
                .find(|c| c.name == *name)
                .cloned()
                .ok_or_else(|| SchemaError::UnknownColumn(name.to_string()))
        })
        .collect()
}

/// Orders group labels numerically when they are all finite numbers, else as
/// text.
pub(crate) fn sort_labels(labels: &mut [String]) {
    let numeric: Option<Vec<f64>> = labels.iter().map(|l| parse_number(l)).collect();
    match numeric {
        Some(values) => {
            let mut keyed: Vec<(f64, String)> =
                values.into_iter().zip(labels.iter().cloned()).collect();
            keyed.sort_by(|(x, a), (y, b)| x.total_cmp(y).then_with(|| a.cmp(b)));
            for (slot, (_, label)) in labels.iter_mut().zip(keyed) {
                *slot = label;
            }
        }
        None => labels.sort(),
    }
}

/// Means of `columns` for every value of the key column `group_column`.
///
/// Missing values are skipped per column; a group with no values for a column
/// gets `None` there.
pub fn group_means(
    table: &MergedTable,
    group_column: &str,
    columns: &[&str],
) -> Result<Vec<GroupMean>, SchemaError> {
    if !KEY_COLUMNS.contains(&group_column) {
        return Err(SchemaError::UnknownColumn(group_column.to_string()));
    }
    let selected = select_columns(table, columns)?;

    let mut rows_by_group: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, record) in table.records.iter().enumerate() {
        if let Some(label) = record.key.get(group_column) {
            rows_by_group.entry(label.to_string()).or_default().push(i);
        }
    }

    let mut labels: Vec<String> = rows_by_group.keys().cloned().collect();
    sort_labels(&mut labels);

    Ok(labels
        .into_iter()
        .map(|label| {
            let rows = &rows_by_group[&label];
            let means = selected
                .iter()
                .map(|col| {
                    let value = mean_present(rows.iter().map(|&i| col.values[i]));
                    (col.name.clone(), value)
                })
                .collect();
            GroupMean {
                group: label,
                count: rows.len(),
                means,
            }
        })
        .collect())
}

/// Mean G1, G2 and G3 of each subject across all rows.
pub fn semester_trends(table: &MergedTable) -> Vec<SemesterTrend> {
    SEMESTERS
        .iter()
        .enumerate()
        .map(|(i, semester)| SemesterTrend {
            semester: semester.to_string(),
            first: mean_present(table.records.iter().map(|r| r.first.grade(i))),
            second: mean_present(table.records.iter().map(|r| r.second.grade(i))),
        })
        .collect()
}

/// Month × day grid of mean attendance rates.
///
/// `None` when no record carries both a date and a rate.
pub fn attendance_calendar(attendance: &AttendanceTable) -> Option<AttendanceCalendar> {
    let mut cells: BTreeMap<(u32, u32), Vec<f64>> = BTreeMap::new();
    for record in &attendance.records {
        if let (Some(date), Some(rate)) = (record.date, record.rate) {
            cells
                .entry((date.month(), date.day()))
                .or_default()
                .push(rate);
        }
    }
    if cells.is_empty() {
        return None;
    }

    let months: Vec<u32> = cells
        .keys()
        .map(|(m, _)| *m)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let days: Vec<u32> = cells
        .keys()
        .map(|(_, d)| *d)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rates = months
        .iter()
        .map(|m| {
            days.iter()
                .map(|d| cells.get(&(*m, *d)).map(|v| mean(v)))
                .collect()
        })
        .collect();

    Some(AttendanceCalendar {
        months,
        days,
        rates,
    })
}
