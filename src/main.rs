//! CLI entry point for the student rater.
//!
//! Provides subcommands for merging the grade datasets, exporting at-risk
//! students, building the dashboard report, and publishing it to S3.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use student_rater::analyzers::analyzer::publish_report;
use student_rater::config::DashboardConfig;
use student_rater::fetch::auth::ApiKey;
use student_rater::fetch::{BasicClient, HttpClient};
use student_rater::output::{print_json, write_at_risk, write_json, write_table};
use student_rater::pipeline::{Dashboard, Sources, load_tables};
use student_rater::risk::RiskThresholds;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "student_rater")]
#[command(about = "Merge student grade and attendance data and flag at-risk students", long_about = None)]
struct Cli {
    /// JSON config file (subjects, delimiters, school map, thresholds)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Path or URL of the first subject's grade table
    #[arg(long, default_value = "student-mat.csv")]
    first: String,

    /// Path or URL of the second subject's grade table
    #[arg(long, default_value = "student-por.csv")]
    second: String,

    /// Path or URL of the attendance table
    #[arg(long)]
    attendance: Option<String>,
}

#[derive(Args)]
struct ThresholdArgs {
    /// Average grade below which a student is at risk
    #[arg(short, long)]
    grade_threshold: Option<f64>,

    /// Attendance rate below which a student is at risk
    #[arg(short, long)]
    attendance_threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join both grade tables with attendance and write the merged table
    Merge {
        #[command(flatten)]
        sources: SourceArgs,

        /// CSV file to write the merged table to
        #[arg(short, long, default_value = "merged.csv")]
        output: String,
    },
    /// List at-risk students, optionally exporting them as CSV
    AtRisk {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// CSV file to write at-risk students to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Build the dashboard report (chart tables) as JSON
    Report {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// JSON file to write the report to
        #[arg(short, long, default_value = "dashboard.json")]
        output: String,
    },
    /// Build the dashboard report and upload it to S3
    Publish {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// S3 bucket name to upload the report to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: String,

        /// Key prefix inside the bucket
        #[arg(long, default_value = "dashboards")]
        key: String,

        /// Gzip compress the JSON before uploading
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

impl From<SourceArgs> for Sources {
    fn from(args: SourceArgs) -> Self {
        Sources {
            first: args.first,
            second: args.second,
            attendance: args.attendance,
        }
    }
}

impl ThresholdArgs {
    fn resolve(&self, config: &DashboardConfig) -> RiskThresholds {
        let defaults = config.thresholds();
        RiskThresholds {
            grade: self.grade_threshold.unwrap_or(defaults.grade),
            attendance: self.attendance_threshold.unwrap_or(defaults.attendance),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/student_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("student_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };

    match cli.command {
        Commands::Merge { sources, output } => {
            let dashboard = build_dashboard(sources.into(), &config).await?;
            write_table(&output, &dashboard.merged)?;
        }
        Commands::AtRisk {
            sources,
            thresholds,
            output,
        } => {
            let thresholds = thresholds.resolve(&config);
            let dashboard = build_dashboard(sources.into(), &config).await?;
            let at_risk = dashboard.at_risk(&thresholds);

            info!(
                at_risk = at_risk.len(),
                merged = dashboard.merged.len(),
                "Total at-risk students"
            );
            for record in &at_risk.records {
                info!(
                    school = %record.key.school,
                    sex = %record.key.sex,
                    age = %record.key.age,
                    g3_first = ?record.first.g3,
                    g3_second = ?record.second.g3,
                    attendance_rate = ?record.attendance_rate,
                    avg_grade = ?record.avg_grade,
                    "At-risk student"
                );
            }

            if let Some(path) = output {
                write_at_risk(&path, &at_risk, &thresholds)?;
            }
        }
        Commands::Report {
            sources,
            thresholds,
            output,
        } => {
            let thresholds = thresholds.resolve(&config);
            let dashboard = build_dashboard(sources.into(), &config).await?;
            let report = dashboard.report(&thresholds)?;

            print_json(&report.counts)?;
            write_json(&output, &report)?;
        }
        Commands::Publish {
            sources,
            thresholds,
            s3_bucket,
            key,
            gzip,
        } => {
            let thresholds = thresholds.resolve(&config);
            let dashboard = build_dashboard(sources.into(), &config).await?;
            let report = dashboard.report(&thresholds)?;

            let aws = aws_config::load_from_env().await;
            let s3 = aws_sdk_s3::Client::new(&aws);
            let keys = publish_report(&s3, &s3_bucket, &key, &report, gzip).await?;
            info!(bucket = %s3_bucket, uploaded = keys.len(), gzip, "S3 upload complete");
        }
    }

    Ok(())
}

/// Loads every source and runs clean + merge, sending `DATASET_APP_TOKEN`
/// with HTTP requests when it is set.
async fn build_dashboard(sources: Sources, config: &DashboardConfig) -> Result<Dashboard> {
    let client = BasicClient::new()?;
    match std::env::var("DATASET_APP_TOKEN") {
        Ok(token) if !token.is_empty() => {
            let client = ApiKey::app_token(client, &token).context("invalid DATASET_APP_TOKEN")?;
            run(&client, &sources, config).await
        }
        _ => run(&client, &sources, config).await,
    }
}

#[tracing::instrument(skip(client, config))]
async fn run<C: HttpClient>(
    client: &C,
    sources: &Sources,
    config: &DashboardConfig,
) -> Result<Dashboard> {
    let tables = load_tables(client, sources, config).await?;
    if tables.attendance.is_none() {
        warn!("No attendance table given");
    }
    Dashboard::from_tables(&tables, config)
}
