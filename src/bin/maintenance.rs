//! Maintenance Binary - Idempotent repairs over stored scan reports
//!
//! Each subcommand prints one line per report and a summary. Running the same
//! subcommand twice in a row leaves every report unchanged the second time.

use clap::{Parser, Subcommand};
use moderator::adapters::local::FsReportStore;
use moderator::application::maintenance::{BatchReport, MaintenanceOps, RegenerateMode};
use moderator::config::LocalConfig;
use moderator::domain::layout::MediaLayout;
use moderator::domain::segments::SegmentAggregator;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "maintenance", version, about = "Repair stored scan reports")]
struct Cli {
    /// Upload directory holding the reports (defaults to UPLOAD_DIR)
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive segments for reports that have detections but no segments
    RegenerateSegments {
        /// Also replace segments that no longer match their detections
        #[arg(long)]
        force: bool,
    },
    /// Forward-slash thumbnail paths and drop stray segment fields
    NormalizePaths,
    /// Move segment starts to their representative detection
    RealignStarts,
    /// Give fully safe reports a first-frame thumbnail
    BackfillSfw,
    /// List reports whose segments diverge from their detections
    Audit,
    /// Run every repair in order
    All {
        #[arg(long)]
        force: bool,
    },
}

fn mode(force: bool) -> RegenerateMode {
    if force {
        RegenerateMode::ReplaceStale
    } else {
        RegenerateMode::MissingOnly
    }
}

fn print_batch(batch: &BatchReport) -> bool {
    for record in &batch.records {
        println!("{} {}: {}", batch.operation, record.video_id, record.outcome);
    }
    let summary = batch.summary();
    println!("{}: {}", batch.operation, summary);
    summary.failed == 0
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = LocalConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let layout = MediaLayout::new(cli.upload_dir.unwrap_or(config.upload_dir));
    let store = Arc::new(FsReportStore::new(layout.clone()));
    let ops = MaintenanceOps::new(store, layout, SegmentAggregator::new(config.scan.merge_gap));

    let batches = match cli.command {
        Command::RegenerateSegments { force } => vec![ops.regenerate_segments(mode(force)).await],
        Command::NormalizePaths => vec![ops.normalize_paths().await],
        Command::RealignStarts => vec![ops.realign_segment_starts().await],
        Command::BackfillSfw => vec![ops.backfill_sfw_thumbnails().await],
        Command::Audit => {
            let stale = ops.audit().await;
            for id in &stale {
                println!("stale {}", id);
            }
            println!("audit: {} report(s) with stale segments", stale.len());
            return ExitCode::SUCCESS;
        }
        Command::All { force } => ops.run_all(mode(force)).await,
    };

    let mut clean = true;
    for batch in &batches {
        clean &= print_batch(batch);
    }
    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
