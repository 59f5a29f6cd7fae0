use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use codeindex::config::Config;
use codeindex::db::Db;
use codeindex::embedder::Embedder;
use codeindex::embedder::mock::MockEmbedder;
use codeindex::indexer::{ProgressEvent, ScanMode, ScanReport};
use codeindex::registry::ProjectRegistry;
use codeindex::watcher::{FileWatcher, watch_project};

#[derive(Parser)]
#[command(name = "codeindex")]
#[command(about = "Incremental structural code indexer")]
#[command(version)]
struct Cli {
    /// JSON config file (default: ./codeindex.json)
    #[arg(short, long, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a tree once
    Scan {
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Re-analyze every file, ignoring mtime and hash
        #[arg(long)]
        force: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Index a tree, then keep it current until Ctrl+C
    Watch {
        #[arg(default_value = ".")]
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    let db = Db::open(&config.db_path).context("Failed to open database")?;
    let store = Arc::new(TokioMutex::new(db));
    let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(config.embedding.dimensions));
    let mut registry = ProjectRegistry::new(store, embedder, config.clone());

    match cli.command {
        Commands::Scan { root, force, json } => {
            let indexer = registry.get_or_create(&root)?;
            let mode = if force { ScanMode::Force } else { ScanMode::Incremental };
            let report = {
                let mut indexer = indexer.lock().await;
                let bar = spawn_progress_bar(indexer.subscribe());
                let report = indexer.scan(mode).await;
                if let Err(e) = bar.await {
                    warn!("Progress bar task failed: {e}");
                }
                report
            };
            print_report(&report, json)?;
            if !report.success {
                anyhow::bail!("scan failed: {}", report.error.unwrap_or_default());
            }
        }
        Commands::Watch { root } => {
            let indexer = registry.get_or_create(&root)?;
            let watch_root = {
                let mut indexer = indexer.lock().await;
                let report = indexer.scan(ScanMode::Incremental).await;
                print_report(&report, false)?;
                if !report.success {
                    anyhow::bail!("initial scan failed: {}", report.error.unwrap_or_default());
                }
                indexer.root().to_path_buf()
            };

            let watcher = FileWatcher::new(&watch_root, config.watch.queue_capacity)?;
            let cancel = CancellationToken::new();
            let stop = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.cancel();
                }
            });
            println!("Watching {} (Ctrl+C to stop)", watch_root.display());
            watch_project(indexer, watcher, &config.watch, cancel).await;
        }
    }

    registry.teardown_all();
    Ok(())
}

fn spawn_progress_bar(mut rx: broadcast::Receiver<ProgressEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        loop {
            match rx.recv().await {
                Ok(ProgressEvent::ScanStarted { total_files, .. }) => pb.set_length(total_files as u64),
                Ok(ProgressEvent::ScanProgress {
                    phase,
                    processed,
                    batch,
                    batches,
                    ..
                }) => {
                    pb.set_position(processed as u64);
                    pb.set_message(format!("{} {batch}/{batches}", phase.as_str()));
                }
                Ok(ProgressEvent::FileIndexed { .. }) => {}
                Ok(ProgressEvent::ScanCompleted { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            }
        }
        pb.finish_and_clear();
    })
}

fn print_report(report: &ScanReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let s = &report.stats;
    println!("project      {}", report.project);
    println!("files        {}", s.total_files);
    println!("indexed      {} ({} lines)", s.indexed, s.total_lines);
    println!("unchanged    {} (mtime) / {} (hash)", s.skipped_mtime, s.skipped_hash);
    println!("embedded     {} ({} batch failures)", s.embedded, s.embedding_failures);
    println!("acks         {} ok / {} failed", s.ack_success, s.ack_failed);
    println!("failed       {}", s.failed);
    println!("pruned       {}", s.pruned);
    println!("duration     {}ms", report.duration_ms);
    Ok(())
}
