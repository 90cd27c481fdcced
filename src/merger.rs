//! Joins the two subject tables and attaches attendance.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

use crate::cleaner::CleanedData;
use crate::model::{
    AttendanceSource, DemographicKey, MergedRecord, MergedTable, SCORE_COLUMNS, Scores,
    SubjectTable,
};

#[derive(Debug, Clone, Copy)]
pub struct Merger {
    /// Derive attendance from absences for rows with no attendance match.
    pub fallback_to_absences: bool,
}

impl Default for Merger {
    fn default() -> Self {
        Self {
            fallback_to_absences: true,
        }
    }
}

impl Merger {
    pub fn new(fallback_to_absences: bool) -> Self {
        Self {
            fallback_to_absences,
        }
    }

    /// Inner-joins both subjects on the demographic key, left-joins group
    /// attendance on `school`, and derives `avg_grade` and `total_absences`.
    #[tracing::instrument(skip_all, fields(first = %data.first.subject, second = %data.second.subject))]
    pub fn merge(&self, data: &CleanedData) -> MergedTable {
        let mut table = inner_join(&data.first, &data.second);

        let rates = data.group_rates();
        attach_attendance(&mut table, &rates);
        if self.fallback_to_absences {
            apply_absence_fallback(&mut table);
        }

        if table.is_empty() {
            warn!(
                first_rows = data.first.len(),
                second_rows = data.second.len(),
                "Join on demographic key produced no rows"
            );
        } else {
            info!(rows = table.len(), "Merged subject tables");
        }

        table
    }
}

/// Output names for the extra columns of both tables: names present in both
/// get the subject suffix, the rest keep their name.
fn extra_column_names(first: &SubjectTable, second: &SubjectTable) -> (Vec<String>, Vec<String>) {
    let a: HashSet<&str> = first.extra_columns.iter().map(String::as_str).collect();
    let b: HashSet<&str> = second.extra_columns.iter().map(String::as_str).collect();
    let reserved: HashSet<String> = SCORE_COLUMNS
        .iter()
        .flat_map(|c| [format!("{c}_{}", first.subject), format!("{c}_{}", second.subject)])
        .chain(
            ["attendance_rate", "attendance_source", "avg_grade", "total_absences"]
                .iter()
                .map(|c| c.to_string()),
        )
        .collect();

    let rename = |cols: &[String], other: &HashSet<&str>, subject: &str| -> Vec<String> {
        cols.iter()
            .map(|c| {
                if other.contains(c.as_str()) || reserved.contains(c) {
                    format!("{c}_{subject}")
                } else {
                    c.clone()
                }
            })
            .collect()
    };

    (
        rename(&first.extra_columns, &b, &first.subject),
        rename(&second.extra_columns, &a, &second.subject),
    )
}

/// Joins rows sharing a [`DemographicKey`]. Left order is kept; duplicate keys
/// fan out into one row per pair.
pub fn inner_join(first: &SubjectTable, second: &SubjectTable) -> MergedTable {
    let mut index: HashMap<&DemographicKey, Vec<&Scores>> = HashMap::new();
    for record in &second.records {
        index.entry(&record.key).or_default().push(&record.scores);
    }

    let duplicated = duplicate_keys(first) + index.values().filter(|v| v.len() > 1).count();
    if duplicated > 0 {
        warn!(
            duplicated,
            "Demographic key is not unique; join rows will fan out"
        );
    }

    let mut records = Vec::new();
    for left in &first.records {
        let Some(matches) = index.get(&left.key) else {
            continue;
        };
        for right in matches {
            records.push(merged_record(left.key.clone(), &left.scores, right));
        }
    }

    let (first_extra_columns, second_extra_columns) = extra_column_names(first, second);

    MergedTable {
        first_subject: first.subject.clone(),
        second_subject: second.subject.clone(),
        first_extra_columns,
        second_extra_columns,
        records,
    }
}

fn duplicate_keys(table: &SubjectTable) -> usize {
    let mut counts: HashMap<&DemographicKey, usize> = HashMap::new();
    for record in &table.records {
        *counts.entry(&record.key).or_default() += 1;
    }
    counts.values().filter(|&&n| n > 1).count()
}

fn merged_record(key: DemographicKey, first: &Scores, second: &Scores) -> MergedRecord {
    let avg_grade = match (first.g3, second.g3) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        _ => None,
    };
    let total_absences = match (first.absences, second.absences) {
        (Some(a), Some(b)) => Some(a + b),
        _ => None,
    };

    MergedRecord {
        key,
        first: first.clone(),
        second: second.clone(),
        attendance_rate: None,
        attendance_source: AttendanceSource::Missing,
        avg_grade,
        total_absences,
    }
}

/// Left join of group attendance on the `school` key column.
pub fn attach_attendance(table: &mut MergedTable, rates: &BTreeMap<&str, f64>) {
    let mut unmatched = 0usize;
    for record in &mut table.records {
        match rates.get(record.key.school.as_str()) {
            Some(&rate) => {
                record.attendance_rate = Some(rate);
                record.attendance_source = AttendanceSource::Attendance;
            }
            None => unmatched += 1,
        }
    }
    if unmatched > 0 && !rates.is_empty() {
        warn!(unmatched, "Rows without attendance for their school");
    }
}

/// Fills rows still lacking attendance with `1 - total_absences / max`.
///
/// The maximum is taken over every row with known absences. When it is zero
/// nobody missed a class and the rate is 1.
pub fn apply_absence_fallback(table: &mut MergedTable) {
    let max = table
        .records
        .iter()
        .filter_map(|r| r.total_absences)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));
    let Some(max) = max else {
        return;
    };

    let mut filled = 0usize;
    for record in &mut table.records {
        if record.attendance_source != AttendanceSource::Missing {
            continue;
        }
        if let Some(absences) = record.total_absences {
            record.attendance_rate = Some(if max == 0.0 {
                1.0
            } else {
                1.0 - absences / max
            });
            record.attendance_source = AttendanceSource::AbsenceFallback;
            filled += 1;
        }
    }
    if filled > 0 {
        info!(filled, max_absences = max, "Attendance derived from absences");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupRate, SubjectRecord};
    use std::io;
    use std::sync::{Arc, Mutex};

    fn key(school: &str, age: &str) -> DemographicKey {
        DemographicKey::from_values([
            school.into(),
            "F".into(),
            age.into(),
            "U".into(),
            "GT3".into(),
            "A".into(),
            "4".into(),
            "4".into(),
            "at_home".into(),
            "teacher".into(),
            "course".into(),
            "mother".into(),
        ])
    }

    fn scores(g: [f64; 3], absences: f64) -> Scores {
        Scores {
            g1: Some(g[0]),
            g2: Some(g[1]),
            g3: Some(g[2]),
            absences: Some(absences),
            extra: vec![],
        }
    }

    fn subject(name: &str, records: Vec<(DemographicKey, Scores)>) -> SubjectTable {
        SubjectTable {
            subject: name.into(),
            extra_columns: vec![],
            records: records
                .into_iter()
                .map(|(key, scores)| SubjectRecord { key, scores })
                .collect(),
        }
    }

    fn cleaned(first: SubjectTable, second: SubjectTable, rates: &[(&str, f64)]) -> CleanedData {
        CleanedData {
            first,
            second,
            attendance: None,
            group_attendance: if rates.is_empty() {
                None
            } else {
                Some(
                    rates
                        .iter()
                        .map(|(g, r)| GroupRate {
                            group: g.to_string(),
                            attendance_rate: *r,
                            observations: 1,
                        })
                        .collect(),
                )
            },
        }
    }

    #[test]
    fn test_avg_grade_from_final_grades() {
        let data = cleaned(
            subject("math", vec![(key("GP", "18"), scores([10.0, 12.0, 8.0], 4.0))]),
            subject("por", vec![(key("GP", "18"), scores([14.0, 16.0, 9.0], 2.0))]),
            &[("GP", 0.9)],
        );
        let table = Merger::default().merge(&data);

        assert_eq!(table.len(), 1);
        let record = &table.records[0];
        assert_eq!(record.avg_grade, Some(8.5));
        assert_eq!(record.total_absences, Some(6.0));
        assert_eq!(record.attendance_rate, Some(0.9));
        assert_eq!(record.attendance_source, AttendanceSource::Attendance);
    }

    #[test]
    fn test_disjoint_keys_give_empty_table() {
        let data = cleaned(
            subject("math", vec![(key("GP", "18"), scores([1.0, 2.0, 3.0], 0.0))]),
            subject("por", vec![(key("MS", "18"), scores([1.0, 2.0, 3.0], 0.0))]),
            &[],
        );
        let table = Merger::default().merge(&data);
        assert!(table.is_empty());
        assert_eq!(table.headers().len(), 12 + 4 + 4 + 4);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn merge_capturing_logs(data: &CleanedData) -> (MergedTable, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let table = tracing::subscriber::with_default(subscriber, || Merger::default().merge(data));
        (table, logs.text())
    }

    #[test]
    fn test_empty_join_emits_warning() {
        let data = cleaned(
            subject("math", vec![(key("GP", "18"), scores([1.0, 2.0, 3.0], 0.0))]),
            subject("por", vec![(key("MS", "18"), scores([1.0, 2.0, 3.0], 0.0))]),
            &[],
        );
        let (table, logs) = merge_capturing_logs(&data);

        assert!(table.is_empty());
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("Join on demographic key produced no rows"), "{logs}");
    }

    #[test]
    fn test_non_empty_join_emits_no_warning() {
        let data = cleaned(
            subject("math", vec![(key("GP", "18"), scores([1.0, 2.0, 3.0], 0.0))]),
            subject("por", vec![(key("GP", "18"), scores([1.0, 2.0, 3.0], 0.0))]),
            &[("GP", 0.9)],
        );
        let (table, logs) = merge_capturing_logs(&data);

        assert_eq!(table.len(), 1);
        assert!(!logs.contains("produced no rows"), "{logs}");
    }

    #[test]
    fn test_join_keeps_left_order_and_drops_unmatched() {
        let data = cleaned(
            subject(
                "math",
                vec![
                    (key("GP", "17"), scores([1.0, 1.0, 1.0], 0.0)),
                    (key("GP", "16"), scores([2.0, 2.0, 2.0], 0.0)),
                    (key("GP", "15"), scores([3.0, 3.0, 3.0], 0.0)),
                ],
            ),
            subject(
                "por",
                vec![
                    (key("GP", "15"), scores([5.0, 5.0, 5.0], 0.0)),
                    (key("GP", "17"), scores([6.0, 6.0, 6.0], 0.0)),
                ],
            ),
            &[],
        );
        let table = Merger::default().merge(&data);

        let ages: Vec<&str> = table.records.iter().map(|r| r.key.age.as_str()).collect();
        assert_eq!(ages, vec!["17", "15"]);
    }

    #[test]
    fn test_duplicate_keys_fan_out() {
        let data = cleaned(
            subject(
                "math",
                vec![
                    (key("GP", "17"), scores([1.0, 1.0, 1.0], 0.0)),
                    (key("GP", "17"), scores([2.0, 2.0, 2.0], 0.0)),
                ],
            ),
            subject(
                "por",
                vec![
                    (key("GP", "17"), scores([5.0, 5.0, 5.0], 0.0)),
                    (key("GP", "17"), scores([6.0, 6.0, 6.0], 0.0)),
                ],
            ),
            &[],
        );
        assert_eq!(Merger::default().merge(&data).len(), 4);
    }

    #[test]
    fn test_missing_grade_gives_missing_average() {
        let mut math = scores([10.0, 10.0, 10.0], 1.0);
        math.g3 = None;
        let data = cleaned(
            subject("math", vec![(key("GP", "18"), math)]),
            subject("por", vec![(key("GP", "18"), scores([14.0, 16.0, 9.0], 2.0))]),
            &[],
        );
        assert_eq!(Merger::default().merge(&data).records[0].avg_grade, None);
    }

    #[test]
    fn test_absence_fallback_for_unmatched_rows() {
        let data = cleaned(
            subject(
                "math",
                vec![
                    (key("GP", "17"), scores([1.0, 1.0, 1.0], 2.0)),
                    (key("MS", "17"), scores([1.0, 1.0, 1.0], 6.0)),
                    (key("MS", "18"), scores([1.0, 1.0, 1.0], 1.0)),
                ],
            ),
            subject(
                "por",
                vec![
                    (key("GP", "17"), scores([1.0, 1.0, 1.0], 2.0)),
                    (key("MS", "17"), scores([1.0, 1.0, 1.0], 2.0)),
                    (key("MS", "18"), scores([1.0, 1.0, 1.0], 1.0)),
                ],
            ),
            &[("GP", 0.95)],
        );
        let table = Merger::default().merge(&data);

        assert_eq!(table.records[0].attendance_rate, Some(0.95));
        assert_eq!(table.records[1].attendance_rate, Some(0.0));
        assert_eq!(
            table.records[1].attendance_source,
            AttendanceSource::AbsenceFallback
        );
        assert_eq!(table.records[2].attendance_rate, Some(0.75));

        let strict = Merger::new(false).merge(&data);
        assert_eq!(strict.records[1].attendance_rate, None);
        assert_eq!(strict.records[1].attendance_source, AttendanceSource::Missing);
    }

    #[test]
    fn test_absence_fallback_with_no_absences() {
        let data = cleaned(
            subject("math", vec![(key("GP", "17"), scores([1.0, 1.0, 1.0], 0.0))]),
            subject("por", vec![(key("GP", "17"), scores([1.0, 1.0, 1.0], 0.0))]),
            &[],
        );
        let table = Merger::default().merge(&data);
        assert_eq!(table.records[0].attendance_rate, Some(1.0));
    }

    #[test]
    fn test_shared_extra_columns_are_suffixed() {
        let mut first = subject("math", vec![]);
        first.extra_columns = vec!["studytime".into(), "paid".into()];
        let mut second = subject("por", vec![]);
        second.extra_columns = vec!["studytime".into(), "avg_grade".into()];

        let table = inner_join(&first, &second);
        assert_eq!(table.first_extra_columns, vec!["studytime_math", "paid"]);
        assert_eq!(table.second_extra_columns, vec!["studytime_por", "avg_grade_por"]);
    }
}
