//! Radar charts of normalised style metrics.

use std::f64::consts::PI;
use std::path::Path;

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters_bitmap::BitMapBackend;

use super::{dash_segments, font, plot_err, rgb, Result, VisualizationError};
use crate::config::{TeamConfig, VisualizationConfig};
use crate::core::transforms::min_max_normalize;
use crate::processors::features::DriverProfile;

/// Grid rings drawn at these fractions of the radius.
const RINGS: [f64; 5] = [0.2, 0.4, 0.6, 0.8, 1.0];

const GRID_COLOR: RGBColor = RGBColor(200, 200, 200);

/// One driver's polygon on a radar chart.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarEntry {
    pub driver: String,
    /// One value in [0, 1] per radar metric
    pub values: Vec<f64>,
    pub color: [u8; 3],
    /// Drawn with a dashed outline (second driver of a team)
    pub dashed: bool,
}

/// Build radar entries, min-max normalising each metric across drivers.
///
/// A metric missing from a profile counts as 0 before normalisation. With
/// a single driver or a constant metric every value is 0.5.
pub fn radar_entries(
    profiles: &[DriverProfile],
    radar_metrics: &[String],
    teams: &TeamConfig,
) -> Vec<RadarEntry> {
    let columns: Vec<Vec<f64>> = radar_metrics
        .iter()
        .map(|metric| {
            let raw: Vec<f64> = profiles
                .iter()
                .map(|p| p.get(metric).unwrap_or(0.0))
                .collect();
            min_max_normalize(&raw)
        })
        .collect();

    profiles
        .iter()
        .enumerate()
        .map(|(i, profile)| RadarEntry {
            driver: profile.driver.clone(),
            values: columns.iter().map(|column| column[i]).collect(),
            color: teams.color_for(&profile.driver),
            dashed: teams.is_second_driver(&profile.driver),
        })
        .collect()
}

/// Pixel position of `value` on axis `k` of `n`, the first axis pointing up.
fn polar(center: (i32, i32), radius: f64, k: usize, n: usize, value: f64) -> (i32, i32) {
    let angle = -PI / 2.0 + 2.0 * PI * k as f64 / n as f64;
    (
        center.0 + (radius * value * angle.cos()).round() as i32,
        center.1 + (radius * value * angle.sin()).round() as i32,
    )
}

fn closed_ring(center: (i32, i32), radius: f64, values: &[f64]) -> Vec<(i32, i32)> {
    let n = values.len();
    let mut points: Vec<(i32, i32)> = values
        .iter()
        .enumerate()
        .map(|(k, v)| polar(center, radius, k, n, v.clamp(0.0, 1.0)))
        .collect();
    if let Some(&first) = points.first() {
        points.push(first);
    }
    points
}

/// Render a radar chart overlaying every entry.
///
/// Values are expected in [0, 1] and are clamped. The title, metric names
/// and legend are only drawn with labels enabled.
pub fn plot_radar(
    output_path: &Path,
    entries: &[RadarEntry],
    metric_names: &[String],
    title: &str,
    viz: &VisualizationConfig,
) -> Result<()> {
    if entries.is_empty() || metric_names.is_empty() {
        return Err(VisualizationError::EmptyInput(format!(
            "{}: radar chart needs drivers and metrics",
            title
        )));
    }
    if let Some(entry) = entries.iter().find(|e| e.values.len() != metric_names.len()) {
        return Err(VisualizationError::PlottingError(format!(
            "{} has {} radar values for {} metrics",
            entry.driver,
            entry.values.len(),
            metric_names.len()
        )));
    }

    let (width, height) = (viz.width as i32, viz.height as i32);
    let top = if viz.labels { 60 } else { 0 };
    let legend_width = if viz.labels { 160 } else { 0 };
    let center = ((width - legend_width) / 2, top + (height - top) / 2);
    let radius = ((width - legend_width).min(height - top) as f64) * 0.36;

    let root = BitMapBackend::new(output_path, (viz.width, viz.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let n = metric_names.len();
    for ring in RINGS {
        root.draw(&PathElement::new(
            closed_ring(center, radius * ring, &vec![1.0; n]),
            GRID_COLOR.stroke_width(1),
        ))
        .map_err(plot_err)?;
    }
    for k in 0..n {
        root.draw(&PathElement::new(
            vec![center, polar(center, radius, k, n, 1.0)],
            GRID_COLOR.stroke_width(1),
        ))
        .map_err(plot_err)?;
    }

    for entry in entries {
        let color = rgb(entry.color);
        let outline = closed_ring(center, radius, &entry.values);

        root.draw(&Polygon::new(outline.clone(), color.mix(0.15).filled()))
            .map_err(plot_err)?;

        if entry.dashed {
            for segment in dash_segments(&outline, 10.0, 6.0) {
                root.draw(&PathElement::new(segment, color.stroke_width(2)))
                    .map_err(plot_err)?;
            }
        } else {
            root.draw(&PathElement::new(outline, color.stroke_width(2)))
                .map_err(plot_err)?;
        }
    }

    if viz.labels {
        let title_style = font(24.0)
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center));
        root.draw(&Text::new(title.to_string(), (width / 2, top / 2), title_style))
            .map_err(plot_err)?;

        for (k, name) in metric_names.iter().enumerate() {
            let (x, y) = polar(center, radius * 1.12, k, n, 1.0);
            let h = if x < center.0 - 5 {
                HPos::Right
            } else if x > center.0 + 5 {
                HPos::Left
            } else {
                HPos::Center
            };
            let style = font(14.0).color(&BLACK).pos(Pos::new(h, VPos::Center));
            root.draw(&Text::new(name.clone(), (x, y), style))
                .map_err(plot_err)?;
        }

        let legend_x = width - legend_width + 10;
        for (i, entry) in entries.iter().enumerate() {
            let y = top + 20 + i as i32 * 24;
            let color = rgb(entry.color);
            root.draw(&Rectangle::new([(legend_x, y - 6), (legend_x + 24, y + 6)], color.filled()))
                .map_err(plot_err)?;
            let label = if entry.dashed {
                format!("{} (dashed)", entry.driver)
            } else {
                entry.driver.clone()
            };
            let style = font(14.0).color(&BLACK).pos(Pos::new(HPos::Left, VPos::Center));
            root.draw(&Text::new(label, (legend_x + 32, y), style))
                .map_err(plot_err)?;
        }
    }

    root.present().map_err(plot_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::features::StyleIndicators;
    use tempfile::tempdir;

    fn profile(driver: &str, aggression: f64, smoothness: f64) -> DriverProfile {
        DriverProfile {
            track: "Japan".to_string(),
            driver: driver.to_string(),
            samples: 200,
            low_confidence: false,
            feature_names: vec![
                "throttle_aggression".to_string(),
                "throttle_smoothness".to_string(),
            ],
            values: vec![aggression, smoothness],
            style: StyleIndicators {
                throttle_mean: aggression,
                throttle_rate_mean: 1.0 / smoothness,
                brake_intensity_mean: 0.1,
            },
        }
    }

    fn metrics() -> Vec<String> {
        vec![
            "throttle_aggression".to_string(),
            "throttle_smoothness".to_string(),
            "brake_intensity".to_string(),
        ]
    }

    #[test]
    fn test_radar_entries_normalised() {
        let profiles = vec![profile("VER", 80.0, 0.2), profile("TSU", 60.0, 0.2), profile("NOR", 70.0, 0.1)];
        let entries = radar_entries(&profiles, &metrics(), &TeamConfig::default());

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].values[0], 1.0);
        assert_eq!(entries[1].values[0], 0.0);
        assert_eq!(entries[2].values[0], 0.5);
        assert_eq!(entries[2].values[1], 0.0);
        // metric absent from every profile is constant
        assert!(entries.iter().all(|e| e.values[2] == 0.5));

        assert!(!entries[0].dashed);
        assert!(entries[1].dashed);
        assert_eq!(entries[0].color, TeamConfig::default().color_for("VER"));
    }

    #[test]
    fn test_radar_entries_single_driver() {
        let entries = radar_entries(&[profile("VER", 80.0, 0.2)], &metrics(), &TeamConfig::default());
        assert_eq!(entries[0].values, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_polar_first_axis_points_up() {
        assert_eq!(polar((100, 100), 50.0, 0, 4, 1.0), (100, 50));
        assert_eq!(polar((100, 100), 50.0, 1, 4, 1.0), (150, 100));
        assert_eq!(polar((100, 100), 50.0, 2, 4, 0.5), (100, 125));
    }

    #[test]
    fn test_plot_radar_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Japan_radar.png");
        let profiles = vec![profile("VER", 80.0, 0.2), profile("TSU", 60.0, 0.3)];
        let entries = radar_entries(&profiles, &metrics(), &TeamConfig::default());
        let viz = VisualizationConfig {
            width: 400,
            height: 400,
            labels: false,
            annotate: false,
        };

        plot_radar(&path, &entries, &metrics(), "Japan", &viz).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_plot_radar_rejects_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.png");
        let result = plot_radar(&path, &[], &metrics(), "Japan", &VisualizationConfig::default());
        assert!(matches!(result, Err(VisualizationError::EmptyInput(_))));
    }
}
