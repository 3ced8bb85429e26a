//! OMIE CLI: fetch, append, rebuild and status commands.
//!
//! Commands:
//! - `fetch`: download tomorrow's (or `--date`) marginal price file into the data dir
//! - `append`: merge the latest raw file (or `--all`) into the Parquet stores
//! - `rebuild`: regenerate store rows from `--since` onward out of the raw files
//! - `status`: report rows, time range and content hash of each store
//! - `update`: `fetch` followed by `append`, the scheduled job

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use omie_core::config::OmieConfig;
use omie_core::data::{
    fetch_day, tomorrow, AppendSummary, Appender, FetchOutcome, MergeStats, OmieProvider,
    PriceStore, RawArchive, StoreStatus,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "omie", about = "OMIE day-ahead price collector")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raw file directory (overrides the config).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Store directory (overrides the config).
    #[arg(long, global = true)]
    processed_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the marginal price file for tomorrow.
    Fetch {
        /// Delivery date (YYYY-MM-DD). Defaults to tomorrow.
        #[arg(long)]
        date: Option<String>,

        /// Download again even if a file for the date exists.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Append the most recent raw file to the price stores.
    Append {
        /// Append every raw file in the data directory.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Regenerate store rows delivered on or after a date from the raw files.
    Rebuild {
        /// First delivery date to regenerate (YYYY-MM-DD).
        #[arg(long)]
        since: String,
    },
    /// Report the state of the price stores.
    Status {
        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Fetch tomorrow's file, then append it.
    Update,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Fetch { date, force } => run_fetch(&config, date.as_deref(), force).map(|_| ()),
        Commands::Append { all } => run_append(&config, all),
        Commands::Rebuild { since } => run_rebuild(&config, &since),
        Commands::Status { json } => run_status(&config, json),
        Commands::Update => {
            run_fetch(&config, None, false)?;
            run_append(&config, false)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<OmieConfig> {
    let mut config = match &cli.config {
        Some(path) => OmieConfig::from_file(path)?,
        None => OmieConfig::default(),
    };

    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.processed_dir {
        config.paths.processed_dir = dir.clone();
    }

    tracing::debug!(
        data_dir = %config.paths.data_dir.display(),
        processed_dir = %config.paths.processed_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn run_fetch(config: &OmieConfig, date: Option<&str>, force: bool) -> Result<FetchOutcome> {
    let date = match date {
        Some(s) => parse_date(s)?,
        None => tomorrow(chrono::Local::now().date_naive())?,
    };

    let provider = OmieProvider::new(&config.source)?;
    let archive = RawArchive::new(&config.paths.data_dir);

    let outcome = fetch_day(&provider, &archive, date, &config.source.variants, force)
        .with_context(|| format!("fetch failed for {date}"))?;

    match &outcome {
        FetchOutcome::Downloaded { path, url } => {
            println!("Downloaded {url}");
            println!("Saved to:  {}", path.display());
        }
        FetchOutcome::AlreadyPresent { path } => {
            println!("File for {date} already present: {}", path.display());
        }
    }

    Ok(outcome)
}

fn run_append(config: &OmieConfig, all: bool) -> Result<()> {
    let archive = RawArchive::new(&config.paths.data_dir);
    let appender = Appender::from_config(config);

    let summary = if all {
        appender.append_all(&archive)
    } else {
        appender.append_latest(&archive)
    }
    .context("append failed, stores left unchanged")?;

    print_append_summary(&appender, &summary);
    Ok(())
}

fn run_rebuild(config: &OmieConfig, since: &str) -> Result<()> {
    let since = parse_date(since)?;
    let archive = RawArchive::new(&config.paths.data_dir);
    let appender = Appender::from_config(config);

    let summary = appender
        .rebuild_since(&archive, since)
        .with_context(|| format!("rebuild since {since} failed"))?;

    print_append_summary(&appender, &summary);
    Ok(())
}

fn run_status(config: &OmieConfig, json: bool) -> Result<()> {
    let stores = [
        PriceStore::new(config.paths.hourly_store_path()),
        PriceStore::new(config.paths.quarter_hour_store_path()),
    ];
    let statuses = stores
        .iter()
        .map(|s| s.status())
        .collect::<Result<Vec<StoreStatus>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    for status in &statuses {
        println!("Store: {}", status.path.display());
        match &status.meta {
            None => println!("  (not created yet)"),
            Some(meta) => {
                let range = match (meta.first_timestamp, meta.last_timestamp) {
                    (Some(first), Some(last)) => format!("{first} to {last}"),
                    _ => "(empty)".into(),
                };
                let zones: Vec<String> = meta.zones.iter().map(|z| z.to_string()).collect();
                println!("  Rows:    {}", meta.rows);
                println!("  Range:   {range}");
                println!("  Zones:   {}", zones.join(", "));
                println!("  Hash:    {}", meta.data_hash);
                println!("  Updated: {}", meta.updated_at.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }

    Ok(())
}

fn print_append_summary(appender: &Appender, summary: &AppendSummary) {
    println!("Files:     {}", summary.files.join(", "));
    for (file, reason) in &summary.skipped {
        println!("Skipped:   {file} ({reason})");
    }

    print_merge_line("Hourly", appender.hourly_store().path().display(), &summary.hourly);
    if let (Some(store), Some(stats)) = (appender.quarter_hour_store(), &summary.quarter_hour) {
        print_merge_line("15-minute", store.path().display(), stats);
    }

    if !summary.changed() {
        println!("No new rows; stores unchanged.");
    }
}

fn print_merge_line(label: &str, path: impl std::fmt::Display, stats: &MergeStats) {
    println!(
        "{label:<10} +{} rows ({} -> {}){} {path}",
        stats.added,
        stats.before,
        stats.after,
        if stats.written { ", written to" } else { ", unchanged:" },
    );
}
