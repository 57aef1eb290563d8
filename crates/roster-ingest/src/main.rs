//! Roster Ingest - student directory harvester

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use roster_common::logging::{init_logging, LogConfig, LogLevel};
use roster_ingest::config::{Config, HarvestOverrides};
use roster_ingest::error::HarvestError;
use roster_ingest::export;
use roster_ingest::pipeline::HarvestPipeline;
use roster_ingest::source::HttpSource;
use roster_ingest::storage::{PgStudentStore, RecordStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "roster-ingest")]
#[command(author, version, about = "Student directory harvester")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Harvest the directory into the database
    Harvest {
        /// Number of index positions to walk
        #[arg(long, env = "ROSTER_TOTAL_COUNT")]
        total: Option<usize>,

        /// Index positions per batch
        #[arg(long, env = "ROSTER_BATCH_SIZE")]
        batch_size: Option<usize>,

        /// Entries per listing page
        #[arg(long, env = "ROSTER_PAGE_STRIDE")]
        page_stride: Option<usize>,

        /// Maximum concurrent detail fetches
        #[arg(long, env = "ROSTER_MAX_IN_FLIGHT")]
        max_in_flight: Option<usize>,
    },

    /// Create the students table
    Schema,

    /// Export stored students as compact JSON
    Export {
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("roster-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = Config::from_env().context("Failed to load configuration")?;

    if let Command::Harvest {
        total,
        batch_size,
        page_stride,
        max_in_flight,
    } = &cli.command
    {
        HarvestOverrides {
            total_count: *total,
            batch_size: *batch_size,
            page_stride: *page_stride,
            max_in_flight: *max_in_flight,
        }
        .apply(&mut config.harvest);
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Harvest { .. } => harvest(config).await?,
        Command::Schema => {
            let store = PgStudentStore::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            create_schema(&store).await?;
            store.close().await;
        },
        Command::Export { output } => {
            let store = PgStudentStore::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            let students = store.fetch_all().await.context("Failed to read students")?;
            store.close().await;

            let count = export::export(students, output.as_deref())?;
            info!(count, "Export complete");
        },
    }

    Ok(())
}

async fn create_schema(store: &PgStudentStore) -> Result<(), HarvestError> {
    store.create_schema().await.map_err(HarvestError::Schema)
}

async fn harvest(config: Config) -> Result<()> {
    let store = PgStudentStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    create_schema(&store).await?;

    let source = HttpSource::new(&config.source)?;

    let progress = ProgressBar::new(config.harvest.batch_count() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} batches ({eta})")?
            .progress_chars("#>-"),
    );
    progress.set_message("Harvesting directory");

    let pipeline = HarvestPipeline::new(
        Arc::new(source),
        Arc::new(store.clone()),
        config.harvest.clone(),
    )
    .with_progress(progress.clone());

    let outcome = pipeline.run().await;
    store.close().await;

    match outcome {
        Ok(stats) => {
            info!(
                batches = stats.batches,
                discovered = stats.discovered,
                inserted = stats.inserted,
                duplicates = stats.duplicates_skipped,
                already_present = stats.already_present,
                fetch_failures = stats.fetch_failures(),
                "Ingestion complete"
            );
            Ok(())
        },
        Err(e) => {
            progress.abandon_with_message("harvest failed");
            error!(error = %e, fatal = e.is_fatal(), "Harvest stopped");
            Err(e.into())
        },
    }
}
