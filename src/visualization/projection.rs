//! Driver profiles on the first two principal components.

use std::collections::BTreeMap;
use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;

use super::{cluster_color, font, plot_err, rgb, Result, VisualizationError};
use crate::config::{TeamConfig, VisualizationConfig};
use crate::processors::clustering::{ClusterAssignment, NOISE};
use crate::processors::projection::Projection;

/// Marker radius in pixels.
const MARKER_SIZE: i32 = 10;

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds(points: &[[f64; 2]]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for [x, y] in points {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}

/// Plot drivers in PCA space, filled by cluster and outlined in team colour.
///
/// `projection.points` must follow `assignment.drivers`.
pub fn plot_projection(
    output_path: &Path,
    projection: &Projection,
    assignment: &ClusterAssignment,
    teams: &TeamConfig,
    track: &str,
    viz: &VisualizationConfig,
) -> Result<()> {
    if projection.points.len() < 2 {
        return Err(VisualizationError::EmptyInput(format!(
            "{}: projection needs at least two drivers",
            track
        )));
    }
    if projection.points.len() != assignment.drivers.len() {
        return Err(VisualizationError::PlottingError(format!(
            "{}: {} projected points for {} drivers",
            track,
            projection.points.len(),
            assignment.drivers.len()
        )));
    }

    let (x_min, x_max, y_min, y_max) = compute_bounds(&projection.points);
    let x_padding = (x_max - x_min) * 0.1;
    let y_padding = (y_max - y_min) * 0.1;

    let root = BitMapBackend::new(output_path, (viz.width, viz.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(20);
    if viz.labels {
        builder
            .caption(format!("Driving style projection: {}", track), font(24.0))
            .x_label_area_size(50)
            .y_label_area_size(60);
    }
    let mut chart = builder
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(plot_err)?;

    if viz.labels {
        let [pc1, pc2] = projection.explained_variance_ratio;
        chart
            .configure_mesh()
            .x_desc(format!("PC1 ({:.1}% variance)", pc1 * 100.0))
            .y_desc(format!("PC2 ({:.1}% variance)", pc2 * 100.0))
            .draw()
            .map_err(plot_err)?;
    }

    let mut by_cluster: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, &label) in assignment.labels.iter().enumerate() {
        by_cluster.entry(label).or_default().push(i);
    }

    for (label, members) in &by_cluster {
        let fill = cluster_color(*label);
        let series = chart
            .draw_series(members.iter().map(|&i| {
                let [x, y] = projection.points[i];
                Circle::new((x, y), MARKER_SIZE, fill.filled())
            }))
            .map_err(plot_err)?;
        if viz.labels {
            let name = if *label == NOISE {
                "Noise".to_string()
            } else {
                format!("Cluster {}", label)
            };
            series
                .label(name)
                .legend(move |(x, y)| Circle::new((x, y), 5, fill.filled()));
        }
    }

    chart
        .draw_series(assignment.drivers.iter().enumerate().map(|(i, driver)| {
            let [x, y] = projection.points[i];
            Circle::new((x, y), MARKER_SIZE, rgb(teams.color_for(driver)).stroke_width(3))
        }))
        .map_err(plot_err)?;

    if viz.labels {
        chart
            .draw_series(assignment.drivers.iter().enumerate().map(|(i, driver)| {
                let [x, y] = projection.points[i];
                EmptyElement::at((x, y))
                    + Text::new(driver.clone(), (MARKER_SIZE + 4, -MARKER_SIZE - 4), font(14.0))
            }))
            .map_err(plot_err)?;

        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.8))
            .draw()
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::projection::project_2d;
    use tempfile::tempdir;

    fn headless() -> VisualizationConfig {
        VisualizationConfig {
            width: 400,
            height: 300,
            labels: false,
            annotate: false,
        }
    }

    fn assignment(labels: Vec<i32>) -> ClusterAssignment {
        ClusterAssignment {
            drivers: ["VER", "TSU", "NOR"].iter().take(labels.len()).map(|s| s.to_string()).collect(),
            labels,
        }
    }

    #[test]
    fn test_compute_bounds_pads_degenerate_axis() {
        let (x_min, x_max, y_min, y_max) = compute_bounds(&[[1.0, 2.0], [3.0, 2.0]]);
        assert_eq!((x_min, x_max), (1.0, 3.0));
        assert_eq!((y_min, y_max), (1.0, 3.0));
    }

    #[test]
    fn test_plot_projection_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Japan_projection.png");
        let rows = vec![vec![0.0, 1.0, 2.0], vec![0.1, 1.1, 2.0], vec![3.0, -1.0, 0.5]];
        let projection = project_2d(&rows).unwrap();

        plot_projection(
            &path,
            &projection,
            &assignment(vec![0, 0, NOISE]),
            &TeamConfig::default(),
            "Japan",
            &headless(),
        )
        .unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_plot_projection_rejects_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.png");
        let projection = project_2d(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();

        let result = plot_projection(
            &path,
            &projection,
            &assignment(vec![0, 0, 1]),
            &TeamConfig::default(),
            "Japan",
            &headless(),
        );
        assert!(matches!(result, Err(VisualizationError::PlottingError(_))));
    }
}
