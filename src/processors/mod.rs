//! Data processing modules.

pub mod analysis;
pub mod clustering;
pub mod features;
pub mod projection;
pub mod similarity;

// Re-export key types for convenience
pub use analysis::{
    analyze_track, analyze_tracks, analyze_tracks_with, AnalysisError, Insights, RunOptions,
    RunSummary, TrackEvent, TrackOutcome, TrackReport,
};
pub use clustering::{
    cluster_drivers, cluster_patterns, dbscan, dbscan_patterns, ClusterAssignment,
    DriverClustering, PatternSummary, NOISE, PATTERN_DIMS,
};
pub use features::{build_profiles, DriverProfile, FeatureError, FeatureMatrix};
pub use projection::{project_2d, Projection};
pub use similarity::{compute_similarity, SimilarityMatrix};
