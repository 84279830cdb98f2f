use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use podhaul::naming::normalize_extension;
use podhaul::{PipelineOptions, ReqwestClient, run_pipeline};

/// Fetch podcast feeds and download their audio episodes
#[derive(Parser, Debug)]
#[command(name = "podhaul")]
#[command(about = "Fetch podcast feeds and download their audio episodes")]
#[command(version)]
struct Args {
    /// RSS feed URLs to process
    feeds: Vec<String>,

    /// File with one feed URL per line ('#' starts a comment)
    #[arg(short, long)]
    feeds_file: Option<PathBuf>,

    /// Destination root for downloaded episodes
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Number of concurrent download workers
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Audio extension to download
    #[arg(short, long, default_value = "mp3")]
    extension: String,

    /// Append-only log file
    #[arg(long, default_value = "download.log")]
    log_file: PathBuf,

    /// Start all feed fetches immediately instead of staggering them
    #[arg(long)]
    no_stagger: bool,

    /// Keep a snapshot of each fetched feed document
    #[arg(long)]
    keep_feeds: bool,
}

fn read_feeds_file(path: &PathBuf) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feeds file {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut feeds = args.feeds.clone();
    if let Some(path) = &args.feeds_file {
        feeds.extend(read_feeds_file(path)?);
    }
    if feeds.is_empty() {
        bail!("no feed URLs given (pass them as arguments or via --feeds-file)");
    }
    if args.workers == 0 {
        bail!("worker count must be at least 1");
    }

    // The log file is the only thing allowed to kill the process at startup
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .with_context(|| format!("Failed to open log file {}", args.log_file.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();

    let options = PipelineOptions {
        workers: args.workers,
        target_extension: normalize_extension(&args.extension),
        stagger: !args.no_stagger,
        keep_feeds: args.keep_feeds,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let client = ReqwestClient::new();
    let report = run_pipeline(&client, &feeds, &args.output_dir, &options, cancel).await;

    println!(
        "{} {} downloaded, {} skipped, {} failed{}",
        "Done:".bold().green(),
        report.downloaded.to_string().green().bold(),
        report.skipped.to_string().yellow(),
        if report.failed > 0 {
            report.failed.to_string().red().bold()
        } else {
            report.failed.to_string().green()
        },
        if report.feeds_failed > 0 {
            format!(
                " ({} feed{} unusable)",
                report.feeds_failed.to_string().red(),
                if report.feeds_failed == 1 { "" } else { "s" }
            )
        } else {
            String::new()
        }
    );

    if report.downloaded == 0 && (report.failed > 0 || report.feeds_failed > 0) {
        std::process::exit(1);
    }

    Ok(())
}
