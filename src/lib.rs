//! Driving style analysis pipeline for F1 lap telemetry.
//!
//! This crate provides tools for:
//! - Loading per-driver lap telemetry CSVs for a track and session
//! - Building per-driver driving style profiles from configurable metrics
//! - DBSCAN clustering of drivers and telemetry samples (parallelized)
//! - Pairwise driver similarity, PCA projection, heatmap and radar charts
//!
//! # Example
//!
//! ```no_run
//! use driving_style::{analyze_tracks, PipelineConfig, RunOptions};
//!
//! let config = PipelineConfig::default();
//! let summary = analyze_tracks(&config, &config.analysis.tracks, &RunOptions::default()).unwrap();
//! println!("{} tracks completed", summary.completed.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{ClusteringConfig, PipelineConfig, ProfileConfig, Session, TeamConfig};
pub use core::loaders::{LapRecord, LapTable};
pub use processors::{
    analyze_track, analyze_tracks, analyze_tracks_with, RunOptions, RunSummary, TrackEvent,
    TrackReport,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
