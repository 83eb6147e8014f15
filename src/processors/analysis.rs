//! Per-track analysis orchestration.
//!
//! [`analyze_track`] runs load → profile → cluster → score → chart → export
//! for one track. [`analyze_tracks`] validates the configuration once and
//! loops over tracks; a failing track is logged and recorded without
//! stopping the others.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use crate::config::{PipelineConfig, Session};
use crate::core::loaders::{discover_drivers, load_track_data};
use crate::core::transforms::min_max_normalize;
use crate::core::writers::{
    write_assignments_csv, write_profiles_csv, write_similarity_csv, WriteError,
};
use crate::visualization::{
    self, plot_projection, plot_radar, plot_similarity_heatmap, radar_entries,
};
use super::clustering::{cluster_drivers, cluster_patterns, ClusterAssignment, DriverClustering, PatternSummary};
use super::features::{build_profiles, DriverProfile, FeatureError, FeatureMatrix};
use super::projection::project_2d;
use super::similarity::SimilarityMatrix;

/// Errors that fail a whole track.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("export error: {0}")]
    Write(#[from] WriteError),

    #[error("failed to create output directory '{path}': {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Options of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides `paths.results`
    pub output_dir: Option<PathBuf>,
    pub session: Session,
    /// Open every chart in the image viewer once written
    pub show: bool,
}

/// How far the analysis of a track got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Completed { clusters: usize, noise: usize },
    /// Fewer than two usable drivers or too few samples
    InsufficientData { usable: usize },
}

/// Console insights of a track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insights {
    pub most_similar: Option<(String, String, f64)>,
    /// Driver and aggressiveness score, highest first
    pub aggressiveness: Vec<(String, f64)>,
    pub most_aggressive: Option<String>,
    pub least_aggressive: Option<String>,
    /// Driver with the lowest mean throttle rate
    pub smoothest: Option<String>,
}

/// Everything produced for one track.
#[derive(Debug, Clone)]
pub struct TrackReport {
    pub track: String,
    pub session: Session,
    /// Drivers with a profile
    pub drivers: Vec<String>,
    /// Driver and reason it was not loaded
    pub skipped: Vec<(String, String)>,
    pub low_confidence: Vec<String>,
    pub profiles: Vec<DriverProfile>,
    pub assignment: Option<ClusterAssignment>,
    pub similarity: Option<SimilarityMatrix>,
    pub patterns: Option<PatternSummary>,
    pub outcome: TrackOutcome,
    pub charts: Vec<PathBuf>,
    pub exports: Vec<PathBuf>,
    pub insights: Insights,
}

impl TrackReport {
    fn empty(track: &str, session: Session) -> Self {
        Self {
            track: track.to_string(),
            session,
            drivers: Vec::new(),
            skipped: Vec::new(),
            low_confidence: Vec::new(),
            profiles: Vec::new(),
            assignment: None,
            similarity: None,
            patterns: None,
            outcome: TrackOutcome::InsufficientData { usable: 0 },
            charts: Vec::new(),
            exports: Vec::new(),
            insights: Insights::default(),
        }
    }
}

/// Aggressiveness per driver: mean of the min-max normalised mean throttle,
/// mean throttle rate and mean brake intensity. Keeps profile order.
pub fn aggressiveness_scores(profiles: &[DriverProfile]) -> Vec<(String, f64)> {
    let throttle: Vec<f64> = profiles.iter().map(|p| p.style.throttle_mean).collect();
    let rate: Vec<f64> = profiles.iter().map(|p| p.style.throttle_rate_mean).collect();
    let brake: Vec<f64> = profiles.iter().map(|p| p.style.brake_intensity_mean).collect();

    let (throttle, rate, brake) = (
        min_max_normalize(&throttle),
        min_max_normalize(&rate),
        min_max_normalize(&brake),
    );

    profiles
        .iter()
        .enumerate()
        .map(|(i, p)| (p.driver.clone(), (throttle[i] + rate[i] + brake[i]) / 3.0))
        .collect()
}

/// Derive the console insights of a track.
pub fn derive_insights(profiles: &[DriverProfile], similarity: Option<&SimilarityMatrix>) -> Insights {
    let most_similar = similarity
        .and_then(|s| s.most_similar_pair())
        .map(|(a, b, score)| (a.to_string(), b.to_string(), score));

    let mut aggressiveness = aggressiveness_scores(profiles);
    // stable sort keeps profile order among equal scores
    aggressiveness.sort_by(|a, b| b.1.total_cmp(&a.1));

    let smoothest = profiles
        .iter()
        .min_by(|a, b| a.style.throttle_rate_mean.total_cmp(&b.style.throttle_rate_mean))
        .map(|p| p.driver.clone());

    Insights {
        most_similar,
        most_aggressive: aggressiveness.first().map(|(d, _)| d.clone()),
        least_aggressive: aggressiveness.last().map(|(d, _)| d.clone()),
        aggressiveness,
        smoothest,
    }
}

/// Render one chart, logging instead of failing the track.
fn render_chart<F>(path: PathBuf, show: bool, charts: &mut Vec<PathBuf>, draw: F)
where
    F: FnOnce(&Path) -> visualization::Result<()>,
{
    match draw(&path) {
        Ok(()) => {
            log::info!("Saved chart {}", path.display());
            if show {
                if let Err(e) = visualization::open_in_viewer(&path) {
                    log::warn!("Could not open {}: {}", path.display(), e);
                }
            }
            charts.push(path);
        }
        Err(e) => log::warn!("Skipping chart {}: {}", path.display(), e),
    }
}

/// Analyse one track end to end.
///
/// Missing or malformed driver files are skipped with a warning. Charts
/// that fail to render are skipped with a warning; a failing CSV export
/// fails the track.
pub fn analyze_track(
    config: &PipelineConfig,
    track: &str,
    options: &RunOptions,
) -> Result<TrackReport, AnalysisError> {
    let session = options.session;
    let drivers = if config.analysis.drivers.is_empty() {
        discover_drivers(&config.paths, track, session)
    } else {
        config.analysis.drivers.clone()
    };

    let data = load_track_data(track, session, &drivers, &config.paths, &config.columns);

    let mut report = TrackReport::empty(track, session);
    report.skipped = data
        .skipped
        .iter()
        .map(|s| (s.driver.clone(), s.reason.to_string()))
        .collect();

    // a track needs strictly more than `min_samples` samples
    if data.tables.is_empty() || data.total_samples() <= config.profile.min_samples {
        log::warn!(
            "{}: insufficient data ({} driver files, {} samples), nothing to analyse",
            track,
            data.tables.len(),
            data.total_samples()
        );
        report.outcome = TrackOutcome::InsufficientData {
            usable: data.tables.len(),
        };
        return Ok(report);
    }

    let profiles = build_profiles(&data.tables, &config.profile);
    let matrix = FeatureMatrix::new(&profiles)?;
    report.drivers = matrix.drivers.clone();
    report.low_confidence = profiles
        .iter()
        .filter(|p| p.low_confidence)
        .map(|p| p.driver.clone())
        .collect();

    let params = config.clustering.params_for(track);
    report.patterns = Some(cluster_patterns(
        &data.tables,
        params,
        config.clustering.samples_per_driver,
        config.clustering.sample_seed,
    ));

    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| config.paths.results.clone());
    fs::create_dir_all(&output_dir).map_err(|e| AnalysisError::OutputDir {
        path: output_dir.display().to_string(),
        source: e,
    })?;
    let viz = &config.visualization;
    let radar_metrics = &config.profile.radar_metrics;
    let entries = radar_entries(&profiles, radar_metrics, &config.teams);

    match cluster_drivers(&matrix, &params.drivers) {
        DriverClustering::InsufficientData { usable } => {
            log::warn!(
                "{}: only {} usable driver, skipping clustering and similarity",
                track,
                usable
            );
            report.outcome = TrackOutcome::InsufficientData { usable };
        }
        DriverClustering::Complete {
            assignment,
            similarity,
            standardized,
        } => {
            report.outcome = TrackOutcome::Completed {
                clusters: assignment.n_clusters(),
                noise: assignment.n_noise(),
            };
            log::info!(
                "{}: {} driver clusters, {} noise drivers",
                track,
                assignment.n_clusters(),
                assignment.n_noise()
            );

            render_chart(
                output_dir.join(format!("{}_heatmap.png", track)),
                options.show,
                &mut report.charts,
                |path| plot_similarity_heatmap(path, &similarity, track, viz),
            );

            match project_2d(&standardized) {
                Some(projection) => render_chart(
                    output_dir.join(format!("{}_projection.png", track)),
                    options.show,
                    &mut report.charts,
                    |path| plot_projection(path, &projection, &assignment, &config.teams, track, viz),
                ),
                None => println!("{}: projection plot skipped, fewer than two drivers", track),
            }

            for entry in &entries {
                let title = format!("{} style profile: {}", entry.driver, track);
                render_chart(
                    output_dir.join(format!("{}_radar_{}.png", track, entry.driver)),
                    options.show,
                    &mut report.charts,
                    |path| plot_radar(path, std::slice::from_ref(entry), radar_metrics, &title, viz),
                );
            }

            let path = output_dir.join(format!("{}_similarity.csv", track));
            write_similarity_csv(&path, &similarity)?;
            report.exports.push(path);

            let path = output_dir.join(format!("{}_clusters.csv", track));
            write_assignments_csv(&path, &assignment, report.patterns.as_ref())?;
            report.exports.push(path);

            report.assignment = Some(assignment);
            report.similarity = Some(similarity);
        }
    }

    let title = format!("Driving style comparison: {}", track);
    render_chart(
        output_dir.join(format!("{}_radar.png", track)),
        options.show,
        &mut report.charts,
        |path| plot_radar(path, &entries, radar_metrics, &title, viz),
    );

    let path = output_dir.join(format!("{}_profiles.csv", track));
    write_profiles_csv(&path, &profiles)?;
    report.exports.push(path);

    report.insights = derive_insights(&profiles, report.similarity.as_ref());
    report.profiles = profiles;

    Ok(report)
}

/// Tracks of a run grouped by how they ended.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<String>,
    pub insufficient: Vec<String>,
    /// Track and error message
    pub failed: Vec<(String, String)>,
    pub reports: Vec<TrackReport>,
}

impl RunSummary {
    /// Record the result of one track.
    pub fn record(&mut self, track: &str, result: Result<TrackReport, AnalysisError>) {
        match result {
            Ok(report) => {
                match report.outcome {
                    TrackOutcome::Completed { .. } => self.completed.push(track.to_string()),
                    TrackOutcome::InsufficientData { .. } => {
                        self.insufficient.push(track.to_string())
                    }
                }
                self.reports.push(report);
            }
            Err(e) => {
                log::error!("{}: track failed: {}", track, e);
                self.failed.push((track.to_string(), e.to_string()));
            }
        }
    }
}

/// Progress of a run, reported to the observer of [`analyze_tracks_with`].
pub enum TrackEvent<'a> {
    Started {
        track: &'a str,
    },
    Finished {
        track: &'a str,
        result: &'a Result<TrackReport, AnalysisError>,
    },
}

/// Validate the configuration, then analyse every track in order.
///
/// # Errors
///
/// Only an invalid configuration is fatal; per-track failures are
/// collected in [`RunSummary::failed`].
pub fn analyze_tracks(
    config: &PipelineConfig,
    tracks: &[String],
    options: &RunOptions,
) -> anyhow::Result<RunSummary> {
    analyze_tracks_with(config, tracks, options, |_| {})
}

/// [`analyze_tracks`], calling `observe` before and after every track.
pub fn analyze_tracks_with<F>(
    config: &PipelineConfig,
    tracks: &[String],
    options: &RunOptions,
    mut observe: F,
) -> anyhow::Result<RunSummary>
where
    F: FnMut(TrackEvent<'_>),
{
    config.validate().context("invalid configuration")?;

    let mut summary = RunSummary::default();
    for track in tracks {
        log::info!("Analysing {} ({})", track, options.session);
        observe(TrackEvent::Started { track });
        let result = analyze_track(config, track, options);
        observe(TrackEvent::Finished {
            track,
            result: &result,
        });
        summary.record(track, result);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisualizationConfig;
    use crate::processors::features::StyleIndicators;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn profile(driver: &str, throttle: f64, rate: f64, brake: f64) -> DriverProfile {
        DriverProfile {
            track: "Japan".to_string(),
            driver: driver.to_string(),
            samples: 200,
            low_confidence: false,
            feature_names: vec!["avg_speed".to_string()],
            values: vec![200.0],
            style: StyleIndicators {
                throttle_mean: throttle,
                throttle_rate_mean: rate,
                brake_intensity_mean: brake,
            },
        }
    }

    /// Write a quali CSV for a driver: alternating corner and straight samples.
    fn write_driver(dir: &Path, track: &str, driver: &str, rows: usize, pace: f64) {
        let session_dir = dir.join("Qualifying");
        fs::create_dir_all(&session_dir).unwrap();
        let mut csv = String::from("Distance,Speed,Throttle,nGear,RPM,Brake\n");
        for i in 0..rows {
            let corner = i % 5 == 0;
            let speed = if corner { 110.0 * pace } else { 250.0 * pace + (i % 7) as f64 };
            let throttle = if corner { 20.0 } else { 95.0 * pace.min(1.0) };
            let gear = if corner { 3 } else { 7 };
            let brake = if corner { "True" } else { "False" };
            csv.push_str(&format!(
                "{},{:.1},{:.1},{},{},{}\n",
                i * 10,
                speed,
                throttle,
                gear,
                10000 + (i % 9) * 100,
                brake
            ));
        }
        fs::write(session_dir.join(format!("{}-quali-{}.csv", track, driver)), csv).unwrap();
    }

    fn test_config(data: &TempDir, drivers: &[&str]) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths.telemetry = data.path().to_path_buf();
        config.analysis.drivers = drivers.iter().map(|s| s.to_string()).collect();
        config.visualization = VisualizationConfig {
            width: 400,
            height: 400,
            labels: false,
            annotate: false,
        };
        config
    }

    fn options(out: &TempDir) -> RunOptions {
        RunOptions {
            output_dir: Some(out.path().to_path_buf()),
            session: Session::Qualifying,
            show: false,
        }
    }

    #[test]
    fn test_aggressiveness_scores() {
        let profiles = vec![
            profile("VER", 80.0, 6.0, 0.4),
            profile("TSU", 60.0, 2.0, 0.1),
            profile("NOR", 70.0, 4.0, 0.25),
        ];
        let scores = aggressiveness_scores(&profiles);

        assert_eq!(scores[0], ("VER".to_string(), 1.0));
        assert_eq!(scores[1], ("TSU".to_string(), 0.0));
        assert!((scores[2].1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_derive_insights() {
        let profiles = vec![
            profile("VER", 80.0, 6.0, 0.4),
            profile("TSU", 60.0, 2.0, 0.1),
            profile("NOR", 70.0, 4.0, 0.25),
        ];
        let insights = derive_insights(&profiles, None);

        assert_eq!(insights.most_aggressive.as_deref(), Some("VER"));
        assert_eq!(insights.least_aggressive.as_deref(), Some("TSU"));
        assert_eq!(insights.smoothest.as_deref(), Some("TSU"));
        assert_eq!(insights.aggressiveness[1].0, "NOR");
        assert!(insights.most_similar.is_none());
    }

    #[test]
    fn test_track_without_driver_files_is_insufficient() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        fs::create_dir_all(data.path().join("Qualifying")).unwrap();
        let config = test_config(&data, &["VER", "NOR"]);

        let report = analyze_track(&config, "Japan", &options(&out)).unwrap();

        assert_eq!(report.outcome, TrackOutcome::InsufficientData { usable: 0 });
        assert_eq!(report.skipped.len(), 2);
        assert!(report.charts.is_empty());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_single_driver_gets_only_combined_radar() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_driver(data.path(), "Japan", "VER", 150, 1.0);
        let config = test_config(&data, &["VER", "NOR"]);

        let report = analyze_track(&config, "Japan", &options(&out)).unwrap();

        assert_eq!(report.outcome, TrackOutcome::InsufficientData { usable: 1 });
        assert!(report.similarity.is_none());
        assert_eq!(report.charts, vec![out.path().join("Japan_radar.png")]);
        assert!(!out.path().join("Japan_heatmap.png").exists());
        assert!(out.path().join("Japan_profiles.csv").exists());
        assert_eq!(report.skipped[0].0, "NOR");
    }

    #[test]
    fn test_two_drivers_end_to_end() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_driver(data.path(), "Japan", "VER", 300, 1.0);
        write_driver(data.path(), "Japan", "NOR", 300, 0.8);
        let config = test_config(&data, &["VER", "NOR"]);

        let report = analyze_track(&config, "Japan", &options(&out)).unwrap();

        assert!(matches!(report.outcome, TrackOutcome::Completed { .. }));
        assert_eq!(report.drivers, vec!["VER".to_string(), "NOR".to_string()]);

        let sim = report.similarity.as_ref().unwrap();
        assert_eq!(sim.score(0, 0), 1.0);
        assert_eq!(sim.score(0, 1), sim.score(1, 0));

        for name in [
            "Japan_heatmap.png",
            "Japan_projection.png",
            "Japan_radar.png",
            "Japan_radar_VER.png",
            "Japan_radar_NOR.png",
            "Japan_profiles.csv",
            "Japan_clusters.csv",
            "Japan_similarity.csv",
        ] {
            assert!(out.path().join(name).exists(), "missing {}", name);
        }
        assert_eq!(report.charts.len(), 5);
        assert_eq!(report.exports.len(), 3);

        let (a, b, _) = report.insights.most_similar.clone().unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("VER", "NOR"));
        assert!(report.patterns.as_ref().unwrap().n_samples > 0);
    }

    #[test]
    fn test_track_needs_more_than_min_samples() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_driver(data.path(), "Japan", "VER", 100, 1.0);
        let config = test_config(&data, &["VER"]);

        let report = analyze_track(&config, "Japan", &options(&out)).unwrap();
        assert_eq!(report.outcome, TrackOutcome::InsufficientData { usable: 1 });
        assert!(report.profiles.is_empty());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);

        write_driver(data.path(), "Japan", "VER", 101, 1.0);
        let report = analyze_track(&config, "Japan", &options(&out)).unwrap();
        assert_eq!(report.outcome, TrackOutcome::InsufficientData { usable: 1 });
        assert_eq!(report.profiles.len(), 1);
        assert!(out.path().join("Japan_profiles.csv").exists());
    }

    #[test]
    fn test_analyze_tracks_with_reports_each_track() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_driver(data.path(), "Japan", "VER", 200, 1.0);
        write_driver(data.path(), "Japan", "NOR", 200, 0.9);
        let config = test_config(&data, &["VER", "NOR"]);

        let tracks = vec!["Japan".to_string(), "Bahrain".to_string()];
        let mut events = Vec::new();
        let summary = analyze_tracks_with(&config, &tracks, &options(&out), |event| match event {
            TrackEvent::Started { track } => events.push(format!("start {}", track)),
            TrackEvent::Finished { track, result } => {
                events.push(format!("done {} {}", track, result.is_ok()))
            }
        })
        .unwrap();

        assert_eq!(
            events,
            vec!["start Japan", "done Japan true", "start Bahrain", "done Bahrain true"]
        );
        assert_eq!(summary.reports.len(), 2);
    }

    #[test]
    fn test_analyze_tracks_with_skips_observer_on_invalid_config() {
        let out = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.paths.telemetry = out.path().join("does-not-exist");

        let mut calls = 0;
        let tracks = vec!["Japan".to_string()];
        let result = analyze_tracks_with(&config, &tracks, &options(&out), |_| calls += 1);
        assert!(result.is_err());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_analyze_tracks_rejects_missing_data_dir() {
        let out = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.paths.telemetry = out.path().join("does-not-exist");

        let result = analyze_tracks(&config, &["Japan".to_string()], &options(&out));
        assert!(result.is_err());
    }

    #[test]
    fn test_analyze_tracks_groups_outcomes() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_driver(data.path(), "Japan", "VER", 200, 1.0);
        write_driver(data.path(), "Japan", "NOR", 200, 0.9);
        let config = test_config(&data, &["VER", "NOR"]);

        let tracks = vec!["Japan".to_string(), "Bahrain".to_string()];
        let summary = analyze_tracks(&config, &tracks, &options(&out)).unwrap();

        assert_eq!(summary.completed, vec!["Japan".to_string()]);
        assert_eq!(summary.insufficient, vec!["Bahrain".to_string()]);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.reports.len(), 2);
    }
}
