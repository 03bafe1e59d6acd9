//! SVG charts rendered with plotters
//!
//! Every chart renders into an in-memory SVG string so the web pages can
//! inline it; [`write_svg`] persists one for the pipeline artifacts.

use crate::error::{AppError, Result};
use crate::ml::dataset_io::ensure_parent_dir;
use crate::ml::models::Dataset;
use crate::models::{Severity, FEATURE_NAMES, N_FEATURES, N_STAGES};
use ndarray::Array2;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::iter::once;
use std::ops::Range;
use std::path::Path;

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

const DARK_BLUE: RGBColor = RGBColor(0, 0, 139);
const HISTOGRAM_BINS: usize = 15;

fn render_svg<F>(size: (u32, u32), draw: F) -> Result<String>
where
    F: FnOnce(&DrawingArea<SVGBackend<'_>, Shift>) -> DrawResult,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        draw(&root).map_err(|e| AppError::Rendering(e.to_string()))?;
        root.present()
            .map_err(|e| AppError::Rendering(e.to_string()))?;
    }
    Ok(svg)
}

/// Write a rendered chart, creating parent directories
pub fn write_svg(path: impl AsRef<Path>, svg: &str) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    std::fs::write(path, svg)?;
    Ok(())
}

/// Parse `#rrggbb`; malformed channels read as zero
pub fn hex_color(hex: &str) -> RGBColor {
    let hex = hex.trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    RGBColor(channel(0), channel(2), channel(4))
}

fn stage_color(stage: Severity) -> RGBColor {
    hex_color(stage.info().color)
}

fn centered(size: u32) -> TextStyle<'static> {
    TextStyle::from(("sans-serif", size).into_font()).pos(Pos::new(HPos::Center, VPos::Center))
}

fn padded(min: f64, max: f64) -> Range<f64> {
    let pad = ((max - min) * 0.05).max(1e-6);
    (min - pad)..(max + pad)
}

/// Pair plot of the three features, coloured by stage
///
/// Diagonal cells are per-stage histograms, off-diagonal cells scatter one
/// feature against another.
pub fn feature_pairplot_svg(dataset: &Dataset) -> Result<String> {
    if dataset.is_empty() {
        return Err(AppError::Rendering(
            "cannot plot an empty dataset".to_string(),
        ));
    }
    let ranges: Vec<Range<f64>> = dataset
        .feature_ranges()
        .iter()
        .map(|(_, r)| padded(r.min, r.max))
        .collect();

    render_svg((960, 960), |root| {
        root.fill(&WHITE)?;
        let root = root.titled("Feature pair plot by severity stage", ("sans-serif", 22))?;
        let (legend, grid) = root.split_vertically(32);
        draw_stage_legend(&legend)?;

        for (k, cell) in grid.split_evenly((N_FEATURES, N_FEATURES)).iter().enumerate() {
            let (row, col) = (k / N_FEATURES, k % N_FEATURES);
            if row == col {
                draw_histogram(cell, dataset, col, ranges[col].clone())?;
            } else {
                draw_scatter(cell, dataset, (col, row), (ranges[col].clone(), ranges[row].clone()))?;
            }
        }
        Ok(())
    })
}

fn draw_stage_legend(area: &DrawingArea<SVGBackend<'_>, Shift>) -> DrawResult {
    let (width, _) = area.dim_in_pixel();
    let slot = width as i32 / N_STAGES as i32;

    for stage in Severity::all() {
        let x = stage.index() as i32 * slot + 16;
        area.draw(&Rectangle::new([(x, 9), (x + 14, 23)], stage_color(stage).filled()))?;
        area.draw(&Text::new(stage.info().name, (x + 20, 10), ("sans-serif", 13)))?;
    }
    Ok(())
}

fn draw_histogram(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    dataset: &Dataset,
    feature: usize,
    range: Range<f64>,
) -> DrawResult {
    let start = range.start;
    let bin_width = (range.end - range.start) / HISTOGRAM_BINS as f64;

    let mut counts = vec![[0usize; N_STAGES]; HISTOGRAM_BINS];
    for (&value, label) in dataset.features.column(feature).iter().zip(&dataset.labels) {
        let bin = (((value - start) / bin_width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin][label.index()] += 1;
    }
    let y_max = counts
        .iter()
        .flat_map(|c| c.iter())
        .copied()
        .max()
        .unwrap_or(0)
        .max(1) as f64;

    let mut chart = ChartBuilder::on(area)
        .margin(6)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(range, 0f64..y_max * 1.05)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(4)
        .y_labels(4)
        .x_desc(FEATURE_NAMES[feature])
        .label_style(("sans-serif", 11))
        .draw()?;

    for stage in Severity::all() {
        let style = stage_color(stage).mix(0.35).filled();
        chart.draw_series(counts.iter().enumerate().map(|(b, c)| {
            let x0 = start + b as f64 * bin_width;
            Rectangle::new([(x0, 0.0), (x0 + bin_width, c[stage.index()] as f64)], style)
        }))?;
    }
    Ok(())
}

fn draw_scatter(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    dataset: &Dataset,
    (x, y): (usize, usize),
    (x_range, y_range): (Range<f64>, Range<f64>),
) -> DrawResult {
    let mut chart = ChartBuilder::on(area)
        .margin(6)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(4)
        .y_labels(4)
        .x_desc(FEATURE_NAMES[x])
        .y_desc(FEATURE_NAMES[y])
        .label_style(("sans-serif", 11))
        .draw()?;

    for stage in Severity::all() {
        let style = stage_color(stage).mix(0.6).filled();
        chart.draw_series(
            dataset
                .features
                .rows()
                .into_iter()
                .zip(&dataset.labels)
                .filter(|(_, &label)| label == stage)
                .map(|(row, _)| Circle::new((row[x], row[y]), 2, style)),
        )?;
    }
    Ok(())
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t).round() as u8
}

/// Heat-map of a confusion matrix, rows true stage and columns predicted
pub fn confusion_matrix_svg(matrix: &Array2<usize>) -> Result<String> {
    let n = matrix.nrows();
    if n == 0 || matrix.ncols() != n {
        return Err(AppError::Rendering(format!(
            "confusion matrix must be square, got {:?}",
            matrix.shape()
        )));
    }
    let max = matrix.iter().copied().max().unwrap_or(0).max(1) as f64;

    render_svg((720, 640), |root| {
        root.fill(&WHITE)?;
        let root = root.titled("Confusion Matrix - Random Forest", ("sans-serif", 22))?;
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(-1.2f64..n as f64, -0.9f64..n as f64)?;

        for ((i, j), &count) in matrix.indexed_iter() {
            let y = (n - 1 - i) as f64;
            let t = count as f64 / max;
            let fill = RGBColor(lerp(247, 8, t), lerp(251, 48, t), lerp(255, 107, t));
            let text_color: &'static RGBColor = if t > 0.5 { &WHITE } else { &BLACK };

            chart.draw_series(once(Rectangle::new(
                [(j as f64, y), (j as f64 + 1.0, y + 1.0)],
                fill.filled(),
            )))?;
            chart.draw_series(once(Text::new(
                count.to_string(),
                (j as f64 + 0.5, y + 0.5),
                centered(16).color(text_color),
            )))?;
        }

        for k in 0..n {
            let label = format!("Stage {}", k);
            chart.draw_series(once(Text::new(
                label.clone(),
                (k as f64 + 0.5, -0.3),
                centered(13),
            )))?;
            chart.draw_series(once(Text::new(
                label,
                (-0.6, (n - 1 - k) as f64 + 0.5),
                centered(13),
            )))?;
        }
        chart.draw_series(once(Text::new(
            "Predicted Stage (rows: True Stage)",
            (n as f64 / 2.0, -0.7),
            centered(14),
        )))?;
        Ok(())
    })
}

/// Bar chart of per-stage probabilities with percentage labels
pub fn probability_bars_svg(probabilities: &[f64; N_STAGES]) -> Result<String> {
    render_svg((560, 320), |root| {
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(root)
            .caption("Prediction Confidence by Stage", ("sans-serif", 18))
            .margin(12)
            .y_label_area_size(48)
            .build_cartesian_2d(0f64..N_STAGES as f64, -12f64..112f64)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_x_axis()
            .y_desc("Probability (%)")
            .y_label_formatter(&|v| {
                if *v < 0.0 {
                    String::new()
                } else {
                    format!("{:.0}", v)
                }
            })
            .label_style(("sans-serif", 11))
            .draw()?;

        for (stage, &p) in Severity::all().into_iter().zip(probabilities) {
            let k = stage.index() as f64;
            let pct = p * 100.0;
            chart.draw_series(once(Rectangle::new(
                [(k + 0.15, 0.0), (k + 0.85, pct)],
                stage_color(stage).filled(),
            )))?;
            chart.draw_series(once(Text::new(
                format!("{:.1}%", pct),
                (k + 0.5, pct + 5.0),
                centered(12),
            )))?;
            chart.draw_series(once(Text::new(
                stage.to_string(),
                (k + 0.5, -6.0),
                centered(12),
            )))?;
        }
        Ok(())
    })
}

/// Horizontal 0-4 gauge with coloured bands and a marker at the stage
pub fn severity_gauge_svg(stage: Severity) -> Result<String> {
    let value = stage.index() as f64;
    let bands: Vec<RGBColor> = Severity::all()
        .into_iter()
        .take(N_STAGES - 1)
        .map(|s| hex_color(s.info().background))
        .collect();

    render_svg((560, 190), |root| {
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(root)
            .caption(format!("Severity Stage: {}", stage.index()), ("sans-serif", 20))
            .margin(14)
            .x_label_area_size(28)
            .build_cartesian_2d(0f64..(N_STAGES - 1) as f64, 0f64..1f64)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .disable_y_axis()
            .x_labels(N_STAGES)
            .x_label_formatter(&|v| format!("{:.0}", v))
            .draw()?;

        chart.draw_series(bands.iter().enumerate().map(|(k, color)| {
            Rectangle::new([(k as f64, 0.0), (k as f64 + 1.0, 1.0)], color.filled())
        }))?;
        chart.draw_series(once(Rectangle::new(
            [(0.0, 0.38), (value, 0.62)],
            DARK_BLUE.filled(),
        )))?;
        chart.draw_series(once(PathElement::new(
            vec![(value, 0.05), (value, 0.95)],
            RED.stroke_width(4),
        )))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::generator::SyntheticDataGenerator;

    /// Trimmed contents of every `<text>` element
    fn text_labels(svg: &str) -> Vec<String> {
        svg.split("<text")
            .skip(1)
            .filter_map(|chunk| {
                let body = &chunk[chunk.find('>')? + 1..];
                Some(body[..body.find("</text>")?].trim().to_string())
            })
            .collect()
    }

    #[test]
    fn test_hex_color() {
        assert_eq!(hex_color("#28a745"), RGBColor(0x28, 0xa7, 0x45));
        assert_eq!(hex_color("zz"), RGBColor(0, 0, 0));
    }

    #[test]
    fn test_pairplot_renders() {
        let dataset = SyntheticDataGenerator::new(10, 42).generate().unwrap();
        let svg = feature_pairplot_svg(&dataset).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Pachy_Min"));
        assert!(svg.contains("Stage 4 - Severe KC"));
    }

    #[test]
    fn test_pairplot_empty_dataset_rejected() {
        let empty = Dataset::from_samples(&[]);
        assert!(feature_pairplot_svg(&empty).is_err());
    }

    #[test]
    fn test_confusion_matrix_renders_counts() {
        let mut matrix = Array2::zeros((N_STAGES, N_STAGES));
        matrix[[2, 2]] = 117;
        matrix[[2, 3]] = 13;
        let svg = confusion_matrix_svg(&matrix).unwrap();
        let labels = text_labels(&svg);
        assert!(labels.iter().any(|l| l == "117"));
        assert!(labels.iter().any(|l| l == "13"));
        assert!(confusion_matrix_svg(&Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn test_probability_bars_labels() {
        let svg = probability_bars_svg(&[0.62, 0.3, 0.08, 0.0, 0.0]).unwrap();
        assert!(svg.contains("62.0%"));
        assert!(svg.contains("0.0%"));
    }

    #[test]
    fn test_gauge_renders() {
        let svg = severity_gauge_svg(Severity::Advanced).unwrap();
        assert!(svg.contains("Severity Stage: 3"));
    }

    #[test]
    fn test_write_svg_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models/plot.svg");
        write_svg(&path, "<svg></svg>").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<svg></svg>");
    }
}
