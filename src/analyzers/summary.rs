//! Descriptive statistics and grade distributions.

use crate::analyzers::types::{Bin, ColumnSummary, Histogram};
use crate::analyzers::utility::{mean, quantile, sample_stddev};
use crate::model::MergedTable;

/// Grades run from 0 to 20; one bin per integer grade.
const SCALE_LOWER: f64 = -0.5;
const SCALE_UPPER: f64 = 20.5;
const BIN_WIDTH: f64 = 1.0;

/// How grade histograms are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionBy {
    /// Final grade (G3) of each subject.
    Subject,
    /// G1, G2 and G3, both subjects pooled.
    Semester,
}

impl ColumnSummary {
    pub fn from_values(column: &str, values: &[Option<f64>]) -> Self {
        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        present.sort_by(f64::total_cmp);

        let m = if present.is_empty() {
            None
        } else {
            Some(mean(&present))
        };

        ColumnSummary {
            column: column.to_string(),
            count: present.len(),
            mean: m,
            std: m.and_then(|m| sample_stddev(&present, m)),
            min: present.first().copied(),
            p25: quantile(&present, 0.25),
            median: quantile(&present, 0.5),
            p75: quantile(&present, 0.75),
            max: present.last().copied(),
        }
    }
}

impl Histogram {
    /// Bins `values` over the grade scale.
    pub fn from_values(label: &str, values: impl IntoIterator<Item = Option<f64>>) -> Self {
        let n = ((SCALE_UPPER - SCALE_LOWER) / BIN_WIDTH).ceil() as usize;
        let mut bins: Vec<Bin> = (0..n)
            .map(|i| Bin {
                lower: SCALE_LOWER + i as f64 * BIN_WIDTH,
                upper: SCALE_LOWER + (i + 1) as f64 * BIN_WIDTH,
                count: 0,
            })
            .collect();

        let mut out_of_range = 0;
        let mut missing = 0;
        for value in values {
            let Some(v) = value else {
                missing += 1;
                continue;
            };
            if !(SCALE_LOWER..=SCALE_UPPER).contains(&v) {
                out_of_range += 1;
                continue;
            }
            let i = (((v - SCALE_LOWER) / BIN_WIDTH) as usize).min(n - 1);
            bins[i].count += 1;
        }

        Histogram {
            label: label.to_string(),
            bins,
            out_of_range,
            missing,
        }
    }

    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// Count, mean, sample std, min, quartiles and max of both final grades and
/// the average grade.
pub fn grade_summary(table: &MergedTable) -> Vec<ColumnSummary> {
    let g3_first: Vec<Option<f64>> = table.records.iter().map(|r| r.first.g3).collect();
    let g3_second: Vec<Option<f64>> = table.records.iter().map(|r| r.second.g3).collect();
    let avg: Vec<Option<f64>> = table.records.iter().map(|r| r.avg_grade).collect();

    vec![
        ColumnSummary::from_values(&table.score_column("G3", false), &g3_first),
        ColumnSummary::from_values(&table.score_column("G3", true), &g3_second),
        ColumnSummary::from_values("avg_grade", &avg),
    ]
}

pub fn grade_distribution(table: &MergedTable, by: DistributionBy) -> Vec<Histogram> {
    match by {
        DistributionBy::Subject => [false, true]
            .iter()
            .map(|&second| {
                Histogram::from_values(
                    &table.score_column("G3", second),
                    table.records.iter().map(|r| r.scores(second).g3),
                )
            })
            .collect(),
        DistributionBy::Semester => ["G1", "G2", "G3"]
            .iter()
            .enumerate()
            .map(|(i, label)| {
                Histogram::from_values(
                    label,
                    table
                        .records
                        .iter()
                        .flat_map(|r| [r.first.grade(i), r.second.grade(i)]),
                )
            })
            .collect(),
    }
}
