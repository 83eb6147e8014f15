//! Chart rendering for per-track driving style analysis.
//!
//! This module renders PNG charts with the plotters library:
//! - [`heatmap`]: driver x driver similarity grid
//! - [`projection`]: drivers on the first two principal components
//! - [`radar`]: normalised style metrics per driver
//!
//! Text (titles, axis labels, legends, annotations) is only drawn when
//! `VisualizationConfig::labels` is set, so charts can be rendered on hosts
//! without system fonts.

pub mod heatmap;
pub mod projection;
pub mod radar;

use std::path::Path;
use std::process::Command;

use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use thiserror::Error;

use crate::processors::clustering::NOISE;

pub use heatmap::plot_similarity_heatmap;
pub use projection::plot_projection;
pub use radar::{plot_radar, radar_entries, RadarEntry};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Nothing to plot: {0}")]
    EmptyInput(String),
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Color palette for cluster visualization.
const CLUSTER_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (255, 255, 51),  // Yellow
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (0, 206, 209),   // Turquoise
    (138, 43, 226),  // Blue Violet
];

/// Noise color (gray) for unclustered drivers (label = -1).
const NOISE_COLOR: (u8, u8, u8) = (128, 128, 128);

/// Sans-serif font of the given pixel size.
pub(crate) fn font(size: f64) -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, size, FontStyle::Normal)
}

pub(crate) fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

pub(crate) fn rgb(color: [u8; 3]) -> RGBColor {
    RGBColor(color[0], color[1], color[2])
}

/// Fill color of a cluster label.
pub(crate) fn cluster_color(label: i32) -> RGBColor {
    let (r, g, b) = if label == NOISE {
        NOISE_COLOR
    } else {
        CLUSTER_COLORS[label.unsigned_abs() as usize % CLUSTER_COLORS.len()]
    };
    RGBColor(r, g, b)
}

/// Split a polyline into dash segments of `dash` pixels separated by `gap`.
pub(crate) fn dash_segments(points: &[(i32, i32)], dash: f64, gap: f64) -> Vec<Vec<(i32, i32)>> {
    let mut segments = Vec::new();
    let mut current: Vec<(i32, i32)> = Vec::new();
    // distance left in the current dash (drawing) or gap (skipping)
    let mut remaining = dash;
    let mut drawing = true;

    for pair in points.windows(2) {
        let (x0, y0) = (pair[0].0 as f64, pair[0].1 as f64);
        let (x1, y1) = (pair[1].0 as f64, pair[1].1 as f64);
        let length = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        if length == 0.0 {
            continue;
        }

        let at = |t: f64| ((x0 + (x1 - x0) * t).round() as i32, (y0 + (y1 - y0) * t).round() as i32);
        let mut travelled = 0.0;
        if drawing && current.is_empty() {
            current.push(at(0.0));
        }

        while length - travelled > remaining {
            travelled += remaining;
            let point = at(travelled / length);
            if drawing {
                current.push(point);
                segments.push(std::mem::take(&mut current));
                remaining = gap;
            } else {
                current.push(point);
                remaining = dash;
            }
            drawing = !drawing;
        }

        remaining -= length - travelled;
        if drawing {
            current.push(at(1.0));
        }
    }

    if current.len() > 1 {
        segments.push(current);
    }
    segments
}

/// Open an image in the platform's default viewer without waiting for it.
pub fn open_in_viewer(path: &Path) -> Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        Command::new("xdg-open")
    };
    command.arg(path).spawn()?;
    Ok(())
}
