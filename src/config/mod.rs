//! Configuration types for the driving style pipeline.
//!
//! Every table has a compiled-in default matching the 2025 grid and the
//! four analysed circuits; any part can be overridden from a YAML file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::loaders::Channel;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Telemetry session a CSV was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Qualifying,
    Race,
}

impl Default for Session {
    fn default() -> Self {
        Session::Qualifying
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Session::Qualifying => write!(f, "qualifying"),
            Session::Race => write!(f, "race"),
        }
    }
}

/// Directory layout of the telemetry store and the results folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory holding one sub-directory per session
    #[serde(default = "default_telemetry_dir")]
    pub telemetry: PathBuf,

    #[serde(default = "default_qualifying_dir")]
    pub qualifying: String,

    #[serde(default = "default_race_dir")]
    pub race: String,

    /// File name slug for qualifying files (`<track>-quali-<driver>.csv`)
    #[serde(default = "default_qualifying_slug")]
    pub qualifying_slug: String,

    /// File name slug for race files (`<track>-race-<driver>.csv`)
    #[serde(default = "default_race_slug")]
    pub race_slug: String,

    /// Where charts and CSV exports are written
    #[serde(default = "default_results_dir")]
    pub results: PathBuf,
}

fn default_telemetry_dir() -> PathBuf {
    PathBuf::from("telemetry-data")
}

fn default_qualifying_dir() -> String {
    "Qualifying".to_string()
}

fn default_race_dir() -> String {
    "Race".to_string()
}

fn default_qualifying_slug() -> String {
    "quali".to_string()
}

fn default_race_slug() -> String {
    "race".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("analysis_results")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            telemetry: default_telemetry_dir(),
            qualifying: default_qualifying_dir(),
            race: default_race_dir(),
            qualifying_slug: default_qualifying_slug(),
            race_slug: default_race_slug(),
            results: default_results_dir(),
        }
    }
}

impl PathsConfig {
    /// Directory holding the CSVs of one session.
    pub fn session_dir(&self, session: Session) -> PathBuf {
        match session {
            Session::Qualifying => self.telemetry.join(&self.qualifying),
            Session::Race => self.telemetry.join(&self.race),
        }
    }

    /// File name slug used for a session.
    pub fn session_slug(&self, session: Session) -> &str {
        match session {
            Session::Qualifying => &self.qualifying_slug,
            Session::Race => &self.race_slug,
        }
    }
}

/// Team membership and display colours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Team name -> driver codes, first entry is the lead driver
    #[serde(default = "default_teams")]
    pub members: HashMap<String, Vec<String>>,

    /// Team name -> RGB colour
    #[serde(default = "default_team_colors")]
    pub colors: HashMap<String, [u8; 3]>,

    /// Colour for drivers without a team entry
    #[serde(default = "default_unknown_color")]
    pub unknown_color: [u8; 3],
}

fn default_teams() -> HashMap<String, Vec<String>> {
    let mut teams = HashMap::new();
    teams.insert("Williams".to_string(), vec!["ALB".to_string(), "SAI".to_string()]);
    teams.insert("Mercedes".to_string(), vec!["ANT".to_string(), "RUS".to_string()]);
    teams.insert("Ferrari".to_string(), vec!["HAM".to_string(), "LEC".to_string()]);
    teams.insert("RedBull".to_string(), vec!["VER".to_string(), "TSU".to_string()]);
    teams.insert("McLaren".to_string(), vec!["PIA".to_string(), "NOR".to_string()]);
    teams
}

fn default_team_colors() -> HashMap<String, [u8; 3]> {
    let mut colors = HashMap::new();
    colors.insert("Williams".to_string(), [0x37, 0xBE, 0xDD]); // cyan blue
    colors.insert("Mercedes".to_string(), [0x00, 0xD2, 0xBE]); // teal
    colors.insert("Ferrari".to_string(), [0xDC, 0x14, 0x3C]); // red
    colors.insert("RedBull".to_string(), [0x1E, 0x41, 0xFF]); // blue
    colors.insert("McLaren".to_string(), [0xFF, 0x80, 0x00]); // orange
    colors
}

fn default_unknown_color() -> [u8; 3] {
    [0x66, 0x66, 0x66]
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            members: default_teams(),
            colors: default_team_colors(),
            unknown_color: default_unknown_color(),
        }
    }
}

impl TeamConfig {
    /// Team of a driver, if the driver is listed.
    pub fn team_of(&self, driver: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, drivers)| drivers.iter().any(|d| d == driver))
            .map(|(team, _)| team.as_str())
    }

    /// Display colour for a driver, falling back to `unknown_color`.
    pub fn color_for(&self, driver: &str) -> [u8; 3] {
        self.team_of(driver)
            .and_then(|team| self.colors.get(team))
            .copied()
            .unwrap_or(self.unknown_color)
    }

    /// True if the driver is listed second for their team.
    pub fn is_second_driver(&self, driver: &str) -> bool {
        self.team_of(driver)
            .and_then(|team| self.members.get(team))
            .map(|drivers| drivers.len() > 1 && drivers[1] == driver)
            .unwrap_or(false)
    }
}

/// CSV column names, matched case-sensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default = "default_distance_column")]
    pub distance: String,

    #[serde(default = "default_speed_column")]
    pub speed: String,

    #[serde(default = "default_throttle_column")]
    pub throttle: String,

    #[serde(default = "default_gear_column")]
    pub gear: String,

    #[serde(default = "default_rpm_column")]
    pub rpm: String,

    /// Optional; a file without it is treated as never braking
    #[serde(default = "default_brake_column")]
    pub brake: String,
}

fn default_distance_column() -> String {
    "Distance".to_string()
}

fn default_speed_column() -> String {
    "Speed".to_string()
}

fn default_throttle_column() -> String {
    "Throttle".to_string()
}

fn default_gear_column() -> String {
    "nGear".to_string()
}

fn default_rpm_column() -> String {
    "RPM".to_string()
}

fn default_brake_column() -> String {
    "Brake".to_string()
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            distance: default_distance_column(),
            speed: default_speed_column(),
            throttle: default_throttle_column(),
            gear: default_gear_column(),
            rpm: default_rpm_column(),
            brake: default_brake_column(),
        }
    }
}

/// DBSCAN hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Neighbourhood radius in standardised feature space
    pub eps: f64,

    /// Minimum neighbourhood size (including the point itself)
    pub min_samples: usize,
}

/// Hyperparameters for one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackClustering {
    /// Sample-level pattern clustering
    pub patterns: ClusterParams,

    /// Driver-level profile clustering
    pub drivers: ClusterParams,
}

/// Configuration for density-based clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Used for any track without an explicit entry
    #[serde(default = "default_track_clustering")]
    pub default: TrackClustering,

    #[serde(default = "default_track_params")]
    pub tracks: HashMap<String, TrackClustering>,

    /// Upper bound of telemetry samples per driver for pattern clustering
    #[serde(default = "default_samples_per_driver")]
    pub samples_per_driver: usize,

    /// Seed of the per-driver sample selection
    #[serde(default = "default_sample_seed")]
    pub sample_seed: u64,
}

const DEFAULT_DRIVER_PARAMS: ClusterParams = ClusterParams {
    eps: 3.5,
    min_samples: 2,
};

fn track_clustering(eps: f64, min_samples: usize) -> TrackClustering {
    TrackClustering {
        patterns: ClusterParams { eps, min_samples },
        drivers: DEFAULT_DRIVER_PARAMS,
    }
}

fn default_track_clustering() -> TrackClustering {
    track_clustering(0.4, 45)
}

fn default_track_params() -> HashMap<String, TrackClustering> {
    let mut tracks = HashMap::new();
    tracks.insert("Australia".to_string(), track_clustering(0.4, 40));
    tracks.insert("Bahrain".to_string(), track_clustering(0.35, 50));
    tracks.insert("China".to_string(), track_clustering(0.45, 45));
    tracks.insert("Japan".to_string(), track_clustering(0.4, 35));
    tracks
}

fn default_samples_per_driver() -> usize {
    800
}

fn default_sample_seed() -> u64 {
    42
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            default: default_track_clustering(),
            tracks: default_track_params(),
            samples_per_driver: default_samples_per_driver(),
            sample_seed: default_sample_seed(),
        }
    }
}

impl ClusteringConfig {
    /// Hyperparameters for a track, falling back to the default pair.
    pub fn params_for(&self, track: &str) -> &TrackClustering {
        self.tracks.get(track).unwrap_or(&self.default)
    }
}

/// Summary statistic of a profile metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Statistic {
    Mean,
    Std,
    Min,
    Max,
    /// `1 / (mean + 0.001)`
    InverseMean,
}

/// Subset of samples a metric is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeedBand {
    #[default]
    All,
    /// Samples below the 30th speed percentile
    LowSpeed,
    /// Samples above the 70th speed percentile
    HighSpeed,
}

/// One named entry of a driver profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    pub channel: Channel,
    pub statistic: Statistic,
    #[serde(default)]
    pub band: SpeedBand,
}

impl MetricSpec {
    fn new(name: &str, channel: Channel, statistic: Statistic, band: SpeedBand) -> Self {
        Self {
            name: name.to_string(),
            channel,
            statistic,
            band,
        }
    }
}

/// Configuration for driver profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Below this sample count a profile is flagged low-confidence
    #[serde(default = "default_min_profile_samples")]
    pub min_samples: usize,

    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricSpec>,

    /// Metrics drawn on radar charts, must name entries of `metrics`
    #[serde(default = "default_radar_metrics")]
    pub radar_metrics: Vec<String>,
}

fn default_min_profile_samples() -> usize {
    100
}

fn default_metrics() -> Vec<MetricSpec> {
    use Channel::*;
    use SpeedBand::*;
    use Statistic::*;

    vec![
        MetricSpec::new("avg_speed", Speed, Mean, All),
        MetricSpec::new("speed_variability", Speed, Std, All),
        MetricSpec::new("max_speed", Speed, Max, All),
        MetricSpec::new("throttle_aggression", Throttle, Mean, All),
        MetricSpec::new("throttle_smoothness", ThrottleRate, InverseMean, All),
        MetricSpec::new("brake_frequency", Brake, Mean, All),
        MetricSpec::new("brake_intensity", BrakeIntensity, Mean, All),
        MetricSpec::new("gear_efficiency", GearEfficiency, Mean, All),
        MetricSpec::new("acceleration_pattern", Acceleration, Mean, All),
        MetricSpec::new("acceleration_variability", Acceleration, Std, All),
        MetricSpec::new("cornering_style", Throttle, Mean, LowSpeed),
        MetricSpec::new("straight_line_style", Throttle, Mean, HighSpeed),
    ]
}

fn default_radar_metrics() -> Vec<String> {
    [
        "throttle_aggression",
        "throttle_smoothness",
        "brake_intensity",
        "speed_variability",
        "acceleration_pattern",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_profile_samples(),
            metrics: default_metrics(),
            radar_metrics: default_radar_metrics(),
        }
    }
}

impl ProfileConfig {
    /// Names of the configured metrics, in profile order.
    pub fn feature_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }
}

/// Which tracks and drivers a run covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_tracks")]
    pub tracks: Vec<String>,

    /// Expected drivers; empty means every driver with a file
    #[serde(default = "default_drivers")]
    pub drivers: Vec<String>,

    #[serde(default)]
    pub session: Session,
}

fn default_tracks() -> Vec<String> {
    ["Australia", "Bahrain", "China", "Japan"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_drivers() -> Vec<String> {
    ["VER", "TSU", "NOR", "PIA", "RUS", "ANT", "HAM", "LEC", "SAI", "ALB"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tracks: default_tracks(),
            drivers: default_drivers(),
            session: Session::default(),
        }
    }
}

/// Chart rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationConfig {
    #[serde(default = "default_chart_width")]
    pub width: u32,

    #[serde(default = "default_chart_height")]
    pub height: u32,

    /// Draw titles, axis labels and legends (needs system fonts)
    #[serde(default = "default_labels")]
    pub labels: bool,

    /// Write the score into each heatmap cell
    #[serde(default = "default_labels")]
    pub annotate: bool,
}

fn default_chart_width() -> u32 {
    1200
}

fn default_chart_height() -> u32 {
    1000
}

fn default_labels() -> bool {
    true
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            width: default_chart_width(),
            height: default_chart_height(),
            labels: default_labels(),
            annotate: default_labels(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub teams: TeamConfig,

    #[serde(default)]
    pub columns: ColumnConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub visualization: VisualizationConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the configuration before any track is processed.
    ///
    /// A missing telemetry directory is fatal for the whole run.
    pub fn validate(&self) -> Result<()> {
        if !self.paths.telemetry.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "telemetry directory '{}' does not exist",
                self.paths.telemetry.display()
            )));
        }

        let mut all_params = vec![("default", &self.clustering.default)];
        all_params.extend(
            self.clustering
                .tracks
                .iter()
                .map(|(track, params)| (track.as_str(), params)),
        );
        for (track, params) in all_params {
            for p in [params.patterns, params.drivers] {
                if !(p.eps > 0.0) || p.min_samples == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "clustering parameters for '{}' need eps > 0 and min_samples >= 1 (got eps={}, min_samples={})",
                        track, p.eps, p.min_samples
                    )));
                }
            }
        }

        if self.profile.metrics.is_empty() {
            return Err(ConfigError::Invalid("profile metric list is empty".to_string()));
        }

        let names = self.profile.feature_names();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(ConfigError::Invalid(format!(
                    "profile metric '{}' is listed twice",
                    name
                )));
            }
        }
        for radar in &self.profile.radar_metrics {
            if !names.contains(radar) {
                return Err(ConfigError::Invalid(format!(
                    "radar metric '{}' is not a profile metric",
                    radar
                )));
            }
        }

        Ok(())
    }
}
