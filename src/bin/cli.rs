//! boagri CLI
//!
//! Interactive entry point. For scheduled one-shot runs, use `boagri-batch`.

use std::path::PathBuf;

use boagri::{
    App,
    error::Result,
    models::{Config, IndexMode, Period},
    search::IndexState,
    utils::log as console,
};
use clap::{Parser, Subcommand};

/// boagri - SDSSA bulletin synchronizer
#[derive(Parser, Debug)]
#[command(
    name = "boagri",
    version,
    about = "Incremental sync and search of SDSSA bulletins"
)]
struct Cli {
    /// Path to storage directory containing config.toml, the database and the index
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch missing weeks and refresh the index
    Sync {
        /// Check at most this many (most recent) weeks
        #[arg(long)]
        max_periods: Option<usize>,

        /// Rebuild the whole index instead of updating it
        #[arg(long)]
        full: bool,

        /// Re-check these weeks (e.g. 2021-W10) instead of the missing ones
        #[arg(long = "period", value_name = "YEAR-WWEEK")]
        periods: Vec<Period>,
    },

    /// Search bulletins, expanding the query with synonyms
    Search {
        query: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// List stored bulletins
    List {
        /// Only this year
        #[arg(long)]
        year: Option<i32>,
    },

    /// Rebuild the search index from the store
    RebuildIndex,

    /// Fix links stored with a doubled host prefix
    RepairLinks,

    /// Validate configuration
    Validate,

    /// Show store and index state
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = Config::load_or_default(&config_path).rooted_at(&cli.storage_dir);

    if let Command::Validate = cli.command {
        log::info!("Validating {}...", config_path.display());
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("✓ Config OK");
        return Ok(());
    }

    if let Command::Sync {
        max_periods, full, ..
    } = &cli.command
    {
        if max_periods.is_some() {
            config.sync.max_periods = *max_periods;
        }
        if *full {
            config.sync.index_mode = IndexMode::Rebuild;
        }
    }

    let app = App::open(config).await?;

    match cli.command {
        Command::Sync { periods, .. } => {
            console::header("boagri sync");
            let report = if periods.is_empty() {
                app.sync().await?
            } else {
                app.sync_periods(&periods).await?
            };

            let range = match (report.first_period, report.last_period) {
                (Some(first), Some(last)) => format!("{first} .. {last}"),
                _ => "up to date".to_string(),
            };
            console::summary(
                "Sync complete",
                &[
                    ("periods", format!("{} ({})", report.periods_checked, range)),
                    ("added", report.records_added.to_string()),
                    ("updated", report.records_updated.to_string()),
                    ("unchanged", report.records_unchanged.to_string()),
                    ("degraded", report.degraded_entries.to_string()),
                    ("failures", report.failures.to_string()),
                    ("index", format!("{:?}", report.index).to_lowercase()),
                ],
            );
            for period in &report.failed_periods {
                console::sub_item(&format!("failed: {period} (retry with --period {period})"));
            }
        }

        Command::Search { query, limit } => {
            let expanded = app.expand(&query);
            log::info!("Query: {}", expanded);

            let hits = app.search(&query, limit).await?;
            if hits.is_empty() {
                log::info!("No results.");
            }
            for hit in hits {
                println!("[{}] {}", hit.score, hit.title);
                println!("      Objet  : {}", hit.subject);
                println!("      Résumé : {}", hit.summary);
            }
        }

        Command::List { year } => {
            let records = app.all_records().await?;
            let mut shown = 0;
            for record in records.iter().filter(|r| year.is_none_or(|y| r.year == y)) {
                println!("{}", record.format("{period}  {title}\n          {subject}\n          {document}"));
                shown += 1;
            }
            log::info!("{} of {} record(s)", shown, records.len());
        }

        Command::RebuildIndex => {
            let count = app.rebuild_index().await?;
            log::info!("Index rebuilt with {} documents", count);
        }

        Command::RepairLinks => {
            app.repair_links().await?;
        }

        Command::Info => {
            let status = app.status().await?;
            let paths = &app.config().paths;
            log::info!("Storage directory: {}", cli.storage_dir.display());
            log::info!("Database: {}", paths.database.display());
            log::info!("Records: {}", status.records);
            log::info!(
                "Watermark: {}",
                status
                    .watermark
                    .map_or_else(|| "none (empty store)".to_string(), |p| p.to_string())
            );
            match status.index {
                IndexState::Absent => log::info!("Index: not built yet"),
                IndexState::Open { documents } => {
                    log::info!("Index: {} documents in {}", documents, paths.index_dir.display())
                }
                IndexState::Corrupt(reason) => log::warn!("Index: unusable ({})", reason),
            }
            log::info!(
                "Lexicon: {}",
                if status.lexicon_loaded {
                    "loaded"
                } else {
                    "unavailable (literal search only)"
                }
            );
        }

        Command::Validate => {}
    }

    Ok(())
}
