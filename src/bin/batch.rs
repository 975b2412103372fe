//! Scheduled entry point for boagri
//!
//! Runs one synchronization with JSON logs on stderr and prints the report
//! as JSON on stdout. Exits non-zero only when the run could not complete.

use std::path::PathBuf;
use std::process::ExitCode;

use boagri::{App, models::Config};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One-shot bulletin synchronization
#[derive(Parser, Debug)]
#[command(name = "boagri-batch", version)]
struct Args {
    /// Path to storage directory containing config.toml
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    info!(storage_dir = %args.storage_dir.display(), "boagri batch sync starting");

    let config = Config::load_or_default(args.storage_dir.join("config.toml"))
        .rooted_at(&args.storage_dir);

    let app = match App::open(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "failed to open store");
            return ExitCode::FAILURE;
        }
    };

    let report = match app.sync().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "sync aborted");
            return ExitCode::FAILURE;
        }
    };

    if report.failures > 0 {
        warn!(
            failures = report.failures,
            failed_periods = report.failed_periods.len(),
            record_failures = report.record_failures,
            "sync finished with scoped failures"
        );
    }
    info!(
        periods = report.periods_checked,
        added = report.records_added,
        updated = report.records_updated,
        "sync finished"
    );

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to serialize report");
            ExitCode::FAILURE
        }
    }
}
