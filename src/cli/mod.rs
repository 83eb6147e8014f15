//! Command-line interface for the driving style pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::Session;
use crate::core::loaders::describe_data_dir;
use crate::processors::analysis::{
    analyze_tracks_with, RunOptions, TrackEvent, TrackOutcome, TrackReport,
};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "driving-style")]
#[command(about = "Per-track driving style clustering and comparison charts from F1 telemetry", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse every configured track
    Run {
        /// Session to analyse (defaults to the configured session)
        #[arg(long, value_enum)]
        session: Option<Session>,
        /// Output directory for charts and CSV exports
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Open each chart once it is written
        #[arg(long)]
        show: bool,
        /// Tracks to analyse instead of the configured list
        #[arg(long, num_args = 1..)]
        tracks: Vec<String>,
    },

    /// Analyse a single track
    Track {
        /// Track name as used in the file names, e.g. Japan
        name: String,
        #[arg(long, value_enum)]
        session: Option<Session>,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        show: bool,
    },

    /// List the tracks and driver files found in the data directory
    Inspect {
        #[arg(long, value_enum)]
        session: Option<Session>,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination of the YAML file
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                error!("Failed to load config from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    let result = match cli.command {
        Commands::Run { session, output_dir, show, tracks } => {
            let tracks = if tracks.is_empty() {
                config.analysis.tracks.clone()
            } else {
                tracks
            };
            cmd_run(&config, &tracks, session, output_dir, show)
        }
        Commands::Track { name, session, output_dir, show } => {
            cmd_run(&config, &[name], session, output_dir, show)
        }
        Commands::Inspect { session } => cmd_inspect(&config, session),
        Commands::InitConfig { path } => cmd_init_config(&path),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_run(
    config: &PipelineConfig,
    tracks: &[String],
    session: Option<Session>,
    output_dir: Option<PathBuf>,
    show: bool,
) -> Result<()> {
    let start = Instant::now();

    let options = RunOptions {
        output_dir,
        session: session.unwrap_or(config.analysis.session),
        show,
    };
    let output_path = options
        .output_dir
        .clone()
        .unwrap_or_else(|| config.paths.results.clone());

    println!("Analysing {} track(s), {} session", tracks.len(), options.session);
    println!("Data directory: {}", config.paths.telemetry.display());
    println!("Output directory: {}", output_path.display());

    let mut spinner: Option<ProgressBar> = None;
    let summary = analyze_tracks_with(config, tracks, &options, |event| match event {
        TrackEvent::Started { track } => {
            spinner = Some(create_spinner(&format!("Analysing {}...", track)));
        }
        TrackEvent::Finished { result, .. } => {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
            if let Ok(report) = result {
                print_track_report(report);
            }
        }
    })?;

    let failed: Vec<String> = summary
        .failed
        .iter()
        .map(|(track, reason)| format!("{} ({})", track, reason))
        .collect();

    print_summary(
        "Analysis Complete",
        &[
            ("Completed", list_or_none(&summary.completed)),
            ("Insufficient data", list_or_none(&summary.insufficient)),
            ("Failed", list_or_none(&failed)),
            ("Output directory", output_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn print_track_report(report: &TrackReport) {
    let skipped: Vec<String> = report.skipped.iter().map(|(d, _)| d.clone()).collect();
    let outcome = match report.outcome {
        TrackOutcome::Completed { clusters, noise } => {
            format!("{} clusters, {} noise drivers", clusters, noise)
        }
        TrackOutcome::InsufficientData { usable } => {
            format!("insufficient data ({} usable drivers)", usable)
        }
    };

    let mut items = vec![
        ("Session", report.session.to_string()),
        ("Drivers analysed", list_or_none(&report.drivers)),
        ("Skipped drivers", list_or_none(&skipped)),
        ("Low confidence", list_or_none(&report.low_confidence)),
        ("Clustering", outcome),
    ];

    if let Some(patterns) = &report.patterns {
        items.push((
            "Patterns",
            format!(
                "{} patterns, {} noise ({:.1}%)",
                patterns.n_patterns,
                patterns.n_noise,
                patterns.noise_percent()
            ),
        ));
    }

    let insights = &report.insights;
    if let Some((a, b, score)) = &insights.most_similar {
        items.push(("Most similar", format!("{} & {} ({:.3})", a, b, score)));
    }
    if let Some(driver) = &insights.most_aggressive {
        items.push(("Most aggressive", driver.clone()));
    }
    if let Some(driver) = &insights.least_aggressive {
        items.push(("Least aggressive", driver.clone()));
    }
    if let Some(driver) = &insights.smoothest {
        items.push(("Smoothest", driver.clone()));
    }
    items.push(("Charts written", report.charts.len().to_string()));
    items.push(("CSV exports", report.exports.len().to_string()));

    print_summary(&format!("Track: {}", report.track), &items);

    for (driver, reason) in &report.skipped {
        println!("  skipped {}: {}", driver, reason);
    }
    if !insights.aggressiveness.is_empty() {
        println!("  Aggressiveness ranking:");
        for (rank, (driver, score)) in insights.aggressiveness.iter().enumerate() {
            println!("    {:>2}. {:<4} {:.3}", rank + 1, driver, score);
        }
    }
}

fn cmd_inspect(config: &PipelineConfig, session: Option<Session>) -> Result<()> {
    let session = session.unwrap_or(config.analysis.session);
    let listings = describe_data_dir(&config.paths, session).with_context(|| {
        format!(
            "cannot inspect {}",
            config.paths.session_dir(session).display()
        )
    })?;

    let items: Vec<(&str, String)> = listings
        .iter()
        .map(|l| (l.track.as_str(), format!("{} drivers: {}", l.drivers.len(), list_or_none(&l.drivers))))
        .collect();

    print_summary(&format!("Telemetry files ({} session)", session), &items);

    for listing in &listings {
        println!("{}: {}", listing.track, list_or_none(&listing.drivers));
    }

    Ok(())
}

fn cmd_init_config(path: &Path) -> Result<()> {
    PipelineConfig::default()
        .to_yaml(path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    print_summary(
        "Configuration Written",
        &[("Path", path.display().to_string())],
    );

    Ok(())
}
