use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use photo_cleaner_core::config::LogLevel;
use photo_cleaner_core::discovery::{discover_inputs, load_inputs};
use photo_cleaner_core::logging::{init_logger, LOG_ENV_VAR};
use photo_cleaner_core::{
    ClusterKind, Config, HashAlgorithm, IndexKind, ScanResults, ScanService, SessionStatus,
};

#[derive(Parser)]
#[command(name = "photo-cleaner")]
#[command(about = "Find duplicate and near-duplicate photos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan files, directories and zip archives for duplicate photos
    Scan {
        /// Files or directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Maximum Hamming distance for two photos to count as duplicates
        #[arg(long)]
        threshold: Option<u32>,

        /// Perceptual hash: phash, dhash or ahash
        #[arg(long)]
        algorithm: Option<HashAlgorithm>,

        /// Similarity index: linear or bucketed
        #[arg(long)]
        index: Option<IndexKind>,

        /// Number of decode workers (0 = one per CPU)
        #[arg(long)]
        workers: Option<usize>,

        /// How deep to descend into directories
        #[arg(long)]
        max_depth: Option<usize>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Write logs to rotating files in this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Verbosity level
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "photo-cleaner.json")]
        path: PathBuf,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            paths,
            threshold,
            algorithm,
            index,
            workers,
            max_depth,
            config,
            json,
            log_dir,
            verbose,
        } => {
            let mut config = match config {
                Some(path) => Config::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Config::default(),
            };

            // Command line overrides the file
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            if let Some(algorithm) = algorithm {
                config.hash_algorithm = algorithm;
            }
            if let Some(index) = index {
                config.index_kind = index;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if verbose > 0 {
                config.log_level = match verbose {
                    1 => LogLevel::Debug,
                    _ => LogLevel::Trace,
                };
            }
            config.validate()?;

            setup_logging(&config, log_dir.as_ref())?;
            run_scan(config, &paths, max_depth, json)
        }

        Commands::GenerateConfig { path } => {
            let config = Config::default();
            config.save_to_file(&path)?;
            println!("Configuration file generated at: {}", path.display());
            Ok(())
        }
    }
}

fn setup_logging(config: &Config, log_dir: Option<&PathBuf>) -> anyhow::Result<()> {
    let level = config.log_level.to_level_filter();
    match log_dir {
        Some(dir) => init_logger(&dir.to_string_lossy(), level)
            .map_err(|e| anyhow!("failed to initialize logging: {}", e)),
        None => {
            // Keep the terminal quiet below warnings unless asked
            let default = if config.log_level == LogLevel::Info {
                log::LevelFilter::Warn
            } else {
                level
            };
            env_logger::Builder::new()
                .filter_level(default)
                .parse_env(LOG_ENV_VAR)
                .init();
            Ok(())
        }
    }
}

fn run_scan(
    config: Config,
    paths: &[PathBuf],
    max_depth: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let files = discover_inputs(paths, max_depth)?;
    info!("Found {} candidate file(s)", files.len());
    let blobs = load_inputs(&files)?;

    let service = Arc::new(ScanService::new(config)?);
    let id = service.submit_files(blobs)?;

    let handler_service = Arc::clone(&service);
    ctrlc::set_handler(move || {
        if let Err(e) = handler_service.cancel(id) {
            warn!("Could not cancel scan: {}", e);
        }
    })
    .context("installing Ctrl-C handler")?;

    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{eta}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")?
            .progress_chars("##-"),
    );
    progress_bar.set_message("Fingerprinting photos...");

    for event in service.subscribe_progress(id)? {
        progress_bar.set_length(event.total_count as u64);
        progress_bar.set_position(event.processed_count as u64);
        if let Some(name) = event.current_file {
            progress_bar.set_message(name);
        }
    }

    let status = service.wait(id)?;
    progress_bar.finish_with_message(format!("Scan {}", status));

    let results = service.get_results(id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_report(&results);
    }

    if status == SessionStatus::Cancelled {
        warn!("Scan was cancelled; results are partial");
    }
    Ok(())
}

fn print_report(results: &ScanResults) {
    let name = |id| {
        results
            .record(id)
            .map(|r| r.source_name.as_str())
            .unwrap_or("?")
    };

    println!(
        "Scanned {}/{} file(s): {} duplicate group(s), {} failure(s)",
        results.processed_count,
        results.total_count,
        results.clusters.len(),
        results.failed_files.len()
    );

    for (n, cluster) in results.clusters.iter().enumerate() {
        let kind = match cluster.kind {
            ClusterKind::Exact => "identical",
            ClusterKind::Similar => "similar",
        };
        println!(
            "\nGroup {} ({}, confidence {:.0}%)",
            n + 1,
            kind,
            cluster.confidence() * 100.0
        );
        for &member in &cluster.members {
            let marker = if member == cluster.representative {
                "keep"
            } else {
                "    "
            };
            println!("  [{}] {}", marker, name(member));
        }
    }

    if !results.failed_files.is_empty() {
        println!("\nFailed files:");
        for failed in &results.failed_files {
            println!("  {} ({:?}): {}", failed.source_name, failed.kind, failed.message);
        }
    }
}
