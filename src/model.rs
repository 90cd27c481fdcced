//! Typed records produced by the cleaner and merger.

use chrono::NaiveDate;
use serde::Serialize;

/// Demographic columns that together identify a student in both grade tables.
pub const KEY_COLUMNS: [&str; 12] = [
    "school", "sex", "age", "address", "famsize", "Pstatus", "Medu", "Fedu", "Mjob", "Fjob",
    "reason", "guardian",
];

/// Key columns that hold numbers in the source data.
pub const NUMERIC_KEY_COLUMNS: [&str; 3] = ["age", "Medu", "Fedu"];

/// Grade and absence columns every subject table must carry.
pub const SCORE_COLUMNS: [&str; 4] = ["G1", "G2", "G3", "absences"];

/// The composite join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DemographicKey {
    pub school: String,
    pub sex: String,
    pub age: String,
    pub address: String,
    pub famsize: String,
    pub pstatus: String,
    pub medu: String,
    pub fedu: String,
    pub mjob: String,
    pub fjob: String,
    pub reason: String,
    pub guardian: String,
}

impl DemographicKey {
    /// Builds a key from values ordered as [`KEY_COLUMNS`].
    pub fn from_values(values: [String; 12]) -> Self {
        let [
            school,
            sex,
            age,
            address,
            famsize,
            pstatus,
            medu,
            fedu,
            mjob,
            fjob,
            reason,
            guardian,
        ] = values;
        Self {
            school,
            sex,
            age,
            address,
            famsize,
            pstatus,
            medu,
            fedu,
            mjob,
            fjob,
            reason,
            guardian,
        }
    }

    /// Values ordered as [`KEY_COLUMNS`].
    pub fn values(&self) -> [&str; 12] {
        [
            &self.school,
            &self.sex,
            &self.age,
            &self.address,
            &self.famsize,
            &self.pstatus,
            &self.medu,
            &self.fedu,
            &self.mjob,
            &self.fjob,
            &self.reason,
            &self.guardian,
        ]
    }

    /// Looks up a key column by its source name.
    pub fn get(&self, column: &str) -> Option<&str> {
        KEY_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.values()[i])
    }
}

/// Grades, absences and passthrough columns for one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scores {
    pub g1: Option<f64>,
    pub g2: Option<f64>,
    pub g3: Option<f64>,
    pub absences: Option<f64>,
    /// Cells of the table's extra columns, in the table's column order.
    pub extra: Vec<String>,
}

impl Scores {
    /// Grade for semester index 0..3 (G1..G3).
    pub fn grade(&self, semester: usize) -> Option<f64> {
        match semester {
            0 => self.g1,
            1 => self.g2,
            2 => self.g3,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRecord {
    pub key: DemographicKey,
    pub scores: Scores,
}

/// A cleaned grade table for a single subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectTable {
    /// Subject name, used as the column suffix after merging.
    pub subject: String,
    /// Columns that are neither key nor score columns.
    pub extra_columns: Vec<String>,
    pub records: Vec<SubjectRecord>,
}

impl SubjectTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One cleaned attendance observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    /// Canonical group label (school code); `None` when it could not be mapped.
    pub group: Option<String>,
    pub date: Option<NaiveDate>,
    pub present: Option<f64>,
    pub enrolled: Option<f64>,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceTable {
    pub records: Vec<AttendanceRecord>,
}

/// Mean attendance rate for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRate {
    pub group: String,
    pub attendance_rate: f64,
    pub observations: usize,
}

/// Where a merged row's attendance rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceSource {
    Attendance,
    AbsenceFallback,
    Missing,
}

impl AttendanceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceSource::Attendance => "attendance",
            AttendanceSource::AbsenceFallback => "absence_fallback",
            AttendanceSource::Missing => "missing",
        }
    }
}

/// A student present in both subject tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub key: DemographicKey,
    pub first: Scores,
    pub second: Scores,
    pub attendance_rate: Option<f64>,
    pub attendance_source: AttendanceSource,
    pub avg_grade: Option<f64>,
    pub total_absences: Option<f64>,
}

impl MergedRecord {
    /// Scores of the first or second subject.
    pub fn scores(&self, second: bool) -> &Scores {
        if second { &self.second } else { &self.first }
    }
}

/// A named numeric column extracted from a [`MergedTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Result of joining both subject tables and the attendance aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    pub first_subject: String,
    pub second_subject: String,
    /// Output names for the first table's extra columns.
    pub first_extra_columns: Vec<String>,
    /// Output names for the second table's extra columns.
    pub second_extra_columns: Vec<String>,
    pub records: Vec<MergedRecord>,
}

impl MergedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Same columns, different rows.
    pub fn with_records(&self, records: Vec<MergedRecord>) -> Self {
        Self {
            first_subject: self.first_subject.clone(),
            second_subject: self.second_subject.clone(),
            first_extra_columns: self.first_extra_columns.clone(),
            second_extra_columns: self.second_extra_columns.clone(),
            records,
        }
    }

    /// Suffixed name of a score column, e.g. `G3_math`.
    pub fn score_column(&self, base: &str, second: bool) -> String {
        let subject = if second {
            &self.second_subject
        } else {
            &self.first_subject
        };
        format!("{base}_{subject}")
    }

    /// Header row, in output order.
    pub fn headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
        for base in SCORE_COLUMNS {
            headers.push(self.score_column(base, false));
        }
        headers.extend(self.first_extra_columns.iter().cloned());
        for base in SCORE_COLUMNS {
            headers.push(self.score_column(base, true));
        }
        headers.extend(self.second_extra_columns.iter().cloned());
        headers.extend(
            ["attendance_rate", "attendance_source", "avg_grade", "total_absences"]
                .iter()
                .map(|c| c.to_string()),
        );
        headers
    }

    /// Cells of `record`, aligned with [`MergedTable::headers`].
    pub fn row(&self, record: &MergedRecord) -> Vec<String> {
        let mut row: Vec<String> = record.key.values().iter().map(|v| v.to_string()).collect();
        for scores in [&record.first, &record.second] {
            for v in [scores.g1, scores.g2, scores.g3, scores.absences] {
                row.push(format_number(v));
            }
            row.extend(scores.extra.iter().cloned());
        }
        row.push(format_number(record.attendance_rate));
        row.push(record.attendance_source.as_str().to_string());
        row.push(format_number(record.avg_grade));
        row.push(format_number(record.total_absences));
        row
    }

    /// Every column that holds numbers.
    ///
    /// Extra columns qualify when each non-empty cell parses as a number and at
    /// least one cell is non-empty.
    pub fn numeric_columns(&self) -> Vec<NumericColumn> {
        let mut columns = Vec::new();

        for name in NUMERIC_KEY_COLUMNS {
            let values = self
                .records
                .iter()
                .map(|r| r.key.get(name).and_then(parse_number))
                .collect();
            columns.push(NumericColumn {
                name: name.to_string(),
                values,
            });
        }

        for (second, extra_names) in [
            (false, &self.first_extra_columns),
            (true, &self.second_extra_columns),
        ] {
            for (i, base) in SCORE_COLUMNS.iter().enumerate() {
                let values = self
                    .records
                    .iter()
                    .map(|r| match i {
                        3 => r.scores(second).absences,
                        s => r.scores(second).grade(s),
                    })
                    .collect();
                columns.push(NumericColumn {
                    name: self.score_column(base, second),
                    values,
                });
            }
            for (i, name) in extra_names.iter().enumerate() {
                let cells: Vec<&str> = self
                    .records
                    .iter()
                    .map(|r| r.scores(second).extra.get(i).map(String::as_str).unwrap_or(""))
                    .collect();
                let numeric = cells.iter().any(|c| !c.is_empty())
                    && cells
                        .iter()
                        .all(|c| c.is_empty() || parse_number(c).is_some());
                if numeric {
                    columns.push(NumericColumn {
                        name: name.clone(),
                        values: cells.iter().map(|c| parse_number(c)).collect(),
                    });
                }
            }
        }

        let derived: [(&str, Vec<Option<f64>>); 3] = [
            (
                "attendance_rate",
                self.records.iter().map(|r| r.attendance_rate).collect(),
            ),
            ("avg_grade", self.records.iter().map(|r| r.avg_grade).collect()),
            (
                "total_absences",
                self.records.iter().map(|r| r.total_absences).collect(),
            ),
        ];
        for (name, values) in derived {
            columns.push(NumericColumn {
                name: name.to_string(),
                values,
            });
        }

        columns
    }

    /// A single numeric column by output name.
    pub fn numeric_column(&self, name: &str) -> Option<NumericColumn> {
        self.numeric_columns().into_iter().find(|c| c.name == name)
    }
}

/// Parses a finite number; anything else is missing.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Formats an optional number for tabular output; missing becomes empty.
pub fn format_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
