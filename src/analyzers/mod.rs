//! Chart-data aggregation over the merged student table.
//!
//! This module reduces the merged table into group means, semester trends,
//! correlation matrices, grade distributions and summaries, bundles them into
//! a dashboard report, and uploads the report as JSON to S3.

pub mod aggregate;
pub mod analyzer;
pub mod correlation;
pub mod grade;
pub mod summary;
pub mod types;
pub mod utility;
pub mod writetos3;
