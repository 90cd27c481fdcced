use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::info;

use crate::analyzers::aggregate::{attendance_calendar, group_means, semester_trends};
use crate::analyzers::correlation::{
    Scope, complete_case_matrix, correlation_matrix, subject_grade_columns,
};
use crate::analyzers::grade::band_counts;
use crate::analyzers::summary::{DistributionBy, grade_distribution, grade_summary};
use crate::analyzers::types::{Correlations, DashboardReport, Distributions, RowCounts};
use crate::analyzers::writetos3::write_json_to_s3;
use crate::cleaner::CleanedData;
use crate::model::MergedTable;
use crate::risk::{RiskThresholds, classify};

/// Builds every chart table of the dashboard from cleaned and merged data.
#[tracing::instrument(skip_all, fields(rows = merged.len()))]
pub fn build_report(
    data: &CleanedData,
    merged: &MergedTable,
    thresholds: &RiskThresholds,
) -> Result<DashboardReport> {
    let flags: Vec<_> = merged
        .records
        .iter()
        .map(|r| classify(r, thresholds))
        .collect();

    let counts = RowCounts {
        first: data.first.len(),
        second: data.second.len(),
        attendance: data.attendance.as_ref().map(|a| a.records.len()),
        merged: merged.len(),
        at_risk: flags.iter().filter(|f| f.at_risk()).count(),
        low_grade: flags.iter().filter(|f| f.low_grade).count(),
        low_attendance: flags.iter().filter(|f| f.low_attendance).count(),
    };

    let g3_first = merged.score_column("G3", false);
    let g3_second = merged.score_column("G3", true);
    let final_grades = [g3_first.as_str(), g3_second.as_str()];
    let with_average = [g3_first.as_str(), g3_second.as_str(), "avg_grade"];

    let mut grade_bands = BTreeMap::new();
    for (name, second) in [(&g3_first, false), (&g3_second, true)] {
        let counts = band_counts(merged.records.iter().map(|r| r.scores(second).g3));
        grade_bands.insert(name.clone(), to_owned_counts(counts));
    }
    grade_bands.insert(
        "avg_grade".to_string(),
        to_owned_counts(band_counts(merged.records.iter().map(|r| r.avg_grade))),
    );

    let mut by_school = BTreeMap::new();
    for school in schools(merged) {
        let scope = Scope {
            column: "school",
            value: &school,
        };
        by_school.insert(school.clone(), correlation_matrix(merged, Some(scope), &[])?);
    }

    let subject_columns = subject_grade_columns(merged);
    let subject_refs: Vec<&str> = subject_columns.iter().map(String::as_str).collect();
    let correlations = Correlations {
        all: correlation_matrix(merged, None, &[])?,
        by_school,
        subjects: complete_case_matrix(merged, &subject_refs)?,
        grades_attendance: correlation_matrix(
            merged,
            None,
            &[
                g3_first.as_str(),
                g3_second.as_str(),
                "avg_grade",
                "attendance_rate",
                "total_absences",
            ],
        )?,
    };

    let report = DashboardReport {
        schema_version: 1,
        generated_at: Utc::now(),
        subjects: [merged.first_subject.clone(), merged.second_subject.clone()],
        thresholds: *thresholds,
        counts,
        grade_summary: grade_summary(merged),
        grade_bands,
        attendance_summary: data.group_attendance.clone(),
        school_comparison: group_means(merged, "school", &final_grades)?,
        gender_comparison: group_means(merged, "sex", &with_average)?,
        grade_by_age: group_means(merged, "age", &["avg_grade"])?,
        semester_trends: semester_trends(merged),
        distributions: Distributions {
            by_subject: grade_distribution(merged, DistributionBy::Subject),
            by_semester: grade_distribution(merged, DistributionBy::Semester),
        },
        correlations,
        attendance_calendar: data.attendance.as_ref().and_then(attendance_calendar),
    };

    info!(
        at_risk = report.counts.at_risk,
        schools = report.school_comparison.len(),
        "Dashboard report built"
    );
    Ok(report)
}

fn to_owned_counts(counts: Vec<(&'static str, usize)>) -> Vec<(String, usize)> {
    counts
        .into_iter()
        .map(|(band, n)| (band.to_string(), n))
        .collect()
}

fn schools(merged: &MergedTable) -> Vec<String> {
    let mut schools: Vec<String> = merged
        .records
        .iter()
        .map(|r| r.key.school.clone())
        .collect();
    schools.sort();
    schools.dedup();
    schools
}

/// Uploads the report JSON to S3 under `<prefix>/dashboard.json` and a dated
/// copy under `<prefix>/history/<date>.json`.
pub async fn publish_report(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    prefix: &str,
    report: &DashboardReport,
    gzip: bool,
) -> Result<Vec<String>> {
    let prefix = prefix.trim_end_matches('/');
    let date = report.generated_at.format("%Y-%m-%d");
    let ext = if gzip { "json.gz" } else { "json" };
    let keys = vec![
        format!("{prefix}/dashboard.{ext}"),
        format!("{prefix}/history/{date}.{ext}"),
    ];

    for key in &keys {
        write_json_to_s3(s3, bucket, key, report, gzip).await?;
        info!(bucket, key = %key, "Uploaded dashboard report");
    }

    Ok(keys)
}
