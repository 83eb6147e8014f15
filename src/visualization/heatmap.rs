//! Similarity heatmap.

use std::path::Path;

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters_bitmap::BitMapBackend;

use super::{font, plot_err, Result, VisualizationError};
use crate::config::VisualizationConfig;
use crate::processors::similarity::SimilarityMatrix;

const COOL: (f64, f64, f64) = (59.0, 76.0, 192.0);
const NEUTRAL: (f64, f64, f64) = (221.0, 221.0, 221.0);
const WARM: (f64, f64, f64) = (180.0, 4.0, 38.0);

/// Number of steps of the colour bar.
const COLORBAR_STEPS: i32 = 100;

/// Diverging blue-white-red colour of a score in [0, 1].
pub fn diverging_color(value: f64) -> RGBColor {
    let v = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.5 };
    let (from, to, t) = if v < 0.5 {
        (COOL, NEUTRAL, v * 2.0)
    } else {
        (NEUTRAL, WARM, (v - 0.5) * 2.0)
    };
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    RGBColor(lerp(from.0, to.0), lerp(from.1, to.1), lerp(from.2, to.2))
}

/// Render the driver x driver similarity grid as a PNG.
///
/// Rows and columns follow `similarity.drivers`. With labels enabled the
/// chart carries a title, driver names and, if `annotate` is set, the
/// score inside each cell.
pub fn plot_similarity_heatmap(
    output_path: &Path,
    similarity: &SimilarityMatrix,
    track: &str,
    viz: &VisualizationConfig,
) -> Result<()> {
    if similarity.is_empty() {
        return Err(VisualizationError::EmptyInput(format!(
            "{}: similarity matrix has no drivers",
            track
        )));
    }

    let n = similarity.len() as i32;
    let (width, height) = (viz.width as i32, viz.height as i32);
    let (left, top, right, bottom) = if viz.labels { (90, 80, 130, 40) } else { (20, 20, 90, 20) };

    let cell = ((width - left - right) / n).min((height - top - bottom) / n).max(1);
    let grid = cell * n;

    let root = BitMapBackend::new(output_path, (viz.width, viz.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    for i in 0..n {
        for j in 0..n {
            let score = similarity.score(i as usize, j as usize);
            let (x0, y0) = (left + j * cell, top + i * cell);
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + cell, y0 + cell)],
                diverging_color(score).filled(),
            ))
            .map_err(plot_err)?;
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + cell, y0 + cell)],
                WHITE.stroke_width(1),
            ))
            .map_err(plot_err)?;

            if viz.labels && viz.annotate {
                let ink = if (score - 0.5).abs() > 0.3 { WHITE } else { BLACK };
                let style = font((cell / 4).clamp(8, 18) as f64)
                    .color(&ink)
                    .pos(Pos::new(HPos::Center, VPos::Center));
                root.draw(&Text::new(
                    format!("{:.2}", score),
                    (x0 + cell / 2, y0 + cell / 2),
                    style,
                ))
                .map_err(plot_err)?;
            }
        }
    }

    // colour bar, 1.0 at the top
    let bar_x = left + grid + 30;
    for step in 0..COLORBAR_STEPS {
        let y0 = top + grid * step / COLORBAR_STEPS;
        let y1 = top + grid * (step + 1) / COLORBAR_STEPS;
        let value = 1.0 - (step as f64 + 0.5) / COLORBAR_STEPS as f64;
        root.draw(&Rectangle::new(
            [(bar_x, y0), (bar_x + 25, y1.max(y0 + 1))],
            diverging_color(value).filled(),
        ))
        .map_err(plot_err)?;
    }
    root.draw(&Rectangle::new(
        [(bar_x, top), (bar_x + 25, top + grid)],
        BLACK.stroke_width(1),
    ))
    .map_err(plot_err)?;

    if viz.labels {
        let title_style = font(24.0)
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center));
        root.draw(&Text::new(
            format!("Driver similarity: {}", track),
            (left + grid / 2, top / 2),
            title_style,
        ))
        .map_err(plot_err)?;

        let row_style = font(14.0)
            .color(&BLACK)
            .pos(Pos::new(HPos::Right, VPos::Center));
        let col_style = font(14.0)
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        for (k, driver) in similarity.drivers.iter().enumerate() {
            let offset = k as i32 * cell + cell / 2;
            root.draw(&Text::new(driver.clone(), (left - 8, top + offset), row_style.clone()))
                .map_err(plot_err)?;
            root.draw(&Text::new(driver.clone(), (left + offset, top - 6), col_style.clone()))
                .map_err(plot_err)?;
        }

        let tick_style = font(12.0)
            .color(&BLACK)
            .pos(Pos::new(HPos::Left, VPos::Center));
        for (label, y) in [("1.0", top), ("0.5", top + grid / 2), ("0.0", top + grid)] {
            root.draw(&Text::new(label, (bar_x + 32, y), tick_style.clone()))
                .map_err(plot_err)?;
        }
    }

    root.present().map_err(plot_err)?;

    Ok(())
}
