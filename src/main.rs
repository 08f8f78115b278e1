use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

mod aggregate;
mod config;
mod db;
mod grading;
mod models;
mod period;
mod report;
mod summary;
mod trend;

use crate::config::{Config, LogFormat};
use crate::period::{DateWindow, Term};
use crate::report::{RankPolicy, ReportFilter};

#[derive(Parser)]
#[command(name = "school-reports")]
#[command(about = "Grade, attendance and term report engine for school records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Csv,
    Json,
}

impl ReportFormat {
    fn default_path(self) -> PathBuf {
        PathBuf::from(match self {
            ReportFormat::Markdown => "report.md",
            ReportFormat::Csv => "report.csv",
            ReportFormat::Json => "report.json",
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo class with students, courses, scores and attendance
    Seed,
    /// Import score records from a CSV file
    ImportScores {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import attendance marks from a CSV file
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Classify a single score
    Classify {
        score: f64,
        #[arg(long, default_value_t = 100.0)]
        max_score: f64,
    },
    /// Summarize attendance for a class or one student
    Attendance {
        #[arg(long)]
        class_id: Uuid,
        #[arg(long)]
        student_id: Option<Uuid>,
        /// Defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value_t = 120)]
        since_days: i64,
        #[arg(long)]
        json: bool,
    },
    /// Summarize term grades for a class or one student
    Grades {
        #[arg(long)]
        class_id: Uuid,
        #[arg(long)]
        student_id: Option<Uuid>,
        #[arg(long)]
        academic_year: String,
        #[arg(long)]
        term: Term,
        #[arg(long)]
        json: bool,
    },
    /// Build the ranked final-exam report for a class and term
    Report {
        #[arg(long)]
        class_id: Uuid,
        #[arg(long)]
        academic_year: String,
        #[arg(long)]
        term: Term,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        /// Tied averages share a rank instead of taking consecutive ones
        #[arg(long)]
        shared_ranks: bool,
        /// Defaults to report.md, report.csv or report.json to match the format
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = match format {
        LogFormat::Text => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .init();
}

/// Reaches back at least `since_days` and always covers the whole previous
/// month; never past `today`.
fn attendance_window(today: NaiveDate, since_days: i64) -> DateWindow {
    DateWindow {
        start: period::previous_month(today)
            .start
            .min(today - Duration::days(since_days.max(1))),
        end: today,
    }
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    debug!(max_connections = config.max_connections, "connected to Postgres");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted for class {}.", db::SEED_CLASS_ID);
        }
        Commands::ImportScores { csv } => {
            let pool = connect(&config).await?;
            let upserted = db::import_scores_csv(&pool, &csv).await?;
            println!("Upserted {upserted} score records from {}.", csv.display());
        }
        Commands::ImportAttendance { csv } => {
            let pool = connect(&config).await?;
            let upserted = db::import_attendance_csv(&pool, &csv).await?;
            println!("Upserted {upserted} attendance marks from {}.", csv.display());
        }
        Commands::Classify { score, max_score } => {
            let result = grading::classify(score, max_score)?;
            println!(
                "{score}/{max_score}: {:.1}% ({})",
                aggregate::round_one_decimal(result.percentage),
                result.grade
            );
        }
        Commands::Attendance {
            class_id,
            student_id,
            as_of,
            since_days,
            json,
        } => {
            let pool = connect(&config).await?;
            let today = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let window = attendance_window(today, since_days);
            let records = db::fetch_attendance(&pool, class_id, student_id, window).await?;
            info!(
                %class_id,
                records = records.len(),
                start = %window.start,
                end = %window.end,
                "summarizing attendance"
            );

            let summary = summary::attendance_summary(&records, today);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary::render_attendance(&summary));
            }
        }
        Commands::Grades {
            class_id,
            student_id,
            academic_year,
            term,
            json,
        } => {
            let pool = connect(&config).await?;
            let records = db::fetch_scores(&pool, class_id, student_id).await?;
            let courses = db::fetch_courses(&pool).await?;
            info!(%class_id, records = records.len(), %term, %academic_year, "summarizing grades");

            let summary = summary::academic_summary(&records, &courses, &academic_year, term);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary::render_academic(&summary));
            }
        }
        Commands::Report {
            class_id,
            academic_year,
            term,
            format,
            shared_ranks,
            out,
        } => {
            let out = out.unwrap_or_else(|| format.default_path());
            let pool = connect(&config).await?;
            let students = db::fetch_class_roster(&pool, class_id).await?;
            let courses = db::fetch_courses(&pool).await?;
            let scores = db::fetch_scores(&pool, class_id, None).await?;

            let filter = ReportFilter {
                class_id,
                term,
                academic_year,
            };
            let report = if shared_ranks {
                report::build_report_with(
                    &students,
                    &courses,
                    &scores,
                    filter,
                    RankPolicy::Shared,
                    Utc::now(),
                )
            } else {
                report::build_report(&students, &courses, &scores, filter)
            };
            info!(
                %class_id,
                students = report.rows.len(),
                courses = report.courses.len(),
                "built term report"
            );

            match format {
                ReportFormat::Markdown => std::fs::write(&out, report::render_markdown(&report))?,
                ReportFormat::Csv => {
                    let file = std::fs::File::create(&out)
                        .with_context(|| format!("failed to create {}", out.display()))?;
                    report::write_csv(&report, file)?;
                }
                ReportFormat::Json => {
                    std::fs::write(&out, serde_json::to_string_pretty(&report)?)?
                }
            }
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
