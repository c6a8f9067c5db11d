//! Particle size distribution plots.
//!
//! One scatter plot per experiment directory, with a series for each
//! `*full_sort*.csv` (diameter against cumulative percentage).

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::PlotConfig;
use crate::core::loaders::{load_distribution_csv, DistributionPoint, LoaderError};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    #[error("Plotting error: {0}")]
    PlottingError(String),
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Series palette, cycled when an experiment has more conditions.
const SERIES_COLORS: &[(u8, u8, u8)] = &[
    (55, 126, 184),  // Blue
    (255, 127, 0),   // Orange
    (77, 175, 74),   // Green
    (228, 26, 28),   // Red
    (152, 78, 163),  // Purple
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (153, 153, 153), // Gray
];

/// One labelled scatter series.
#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub points: Vec<DistributionPoint>,
}

/// Legend label for a full-sort CSV: the second `_` token of the stem.
///
/// `experiment1_before_full_sort.csv` gives `before`. Stems without an
/// underscore are used whole.
pub fn series_label(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match stem.split('_').nth(1) {
        Some(token) => token.to_string(),
        None => stem,
    }
}

/// Full-sort CSVs directly inside `experiment_dir`, sorted by path.
pub fn find_full_sort_csvs(experiment_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut csvs: Vec<PathBuf> = fs::read_dir(experiment_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().map(|ext| ext == "csv").unwrap_or(false)
                && path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().contains("full_sort"))
                    .unwrap_or(false)
        })
        .collect();

    csvs.sort();
    Ok(csvs)
}

/// Output path of the plot for an experiment directory.
pub fn plot_path(experiment_dir: &Path) -> PathBuf {
    let name = experiment_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    experiment_dir.join(format!("{name}_distribution.png"))
}

/// Plot every full-sort CSV of one experiment.
///
/// Returns the PNG path, or `None` when the experiment has no full-sort
/// CSVs yet.
pub fn plot_experiment(experiment_dir: &Path, config: &PlotConfig) -> Result<Option<PathBuf>> {
    let csvs = find_full_sort_csvs(experiment_dir)?;
    if csvs.is_empty() {
        info!(
            "No distribution CSVs in {}, nothing to plot",
            experiment_dir.display()
        );
        return Ok(None);
    }

    let mut series = Vec::with_capacity(csvs.len());
    for csv in &csvs {
        let points = load_distribution_csv(csv).map_err(|e| VisualizationError::Load {
            path: csv.clone(),
            source: e,
        })?;
        debug!("Loaded {} points from {}", points.len(), csv.display());
        series.push(Series {
            label: series_label(csv),
            points,
        });
    }

    let name = experiment_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let output = plot_path(experiment_dir);
    plot_series(&output, &format!("Graph for {name}"), &series, config)?;
    info!("Saved plot {}", output.display());

    Ok(Some(output))
}

/// Plot every experiment directory under `base_dir`.
///
/// Returns the PNG paths written, in directory order.
pub fn plot_distributions(base_dir: &Path, config: &PlotConfig) -> Result<Vec<PathBuf>> {
    let mut experiments: Vec<PathBuf> = fs::read_dir(base_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    experiments.sort();

    let mut written = Vec::new();
    for experiment in &experiments {
        if let Some(path) = plot_experiment(experiment, config)? {
            written.push(path);
        }
    }
    Ok(written)
}

/// Draw series as a scatter plot and save it as PNG.
///
/// Text (caption, axis descriptions, tick labels, legend) is only drawn
/// when `config.draw_text` is set, since it needs a system font.
pub fn plot_series(
    output_path: &Path,
    title: &str,
    series: &[Series],
    config: &PlotConfig,
) -> Result<()> {
    let (x_min, x_max, y_min, y_max) = compute_bounds(series);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let plot_err = |e: &dyn std::fmt::Display| VisualizationError::PlottingError(e.to_string());

    let root =
        BitMapBackend::new(output_path, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_err(&e))?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(20);
    if config.draw_text {
        builder
            .caption(title, ("sans-serif", 28))
            .x_label_area_size(50)
            .y_label_area_size(60);
    }

    let mut chart = builder
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| plot_err(&e))?;

    let mut mesh = chart.configure_mesh();
    if config.draw_text {
        mesh.x_desc("Diameter (microns)")
            .y_desc("Percentage of Particle (%)");
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw().map_err(|e| plot_err(&e))?;

    for (idx, s) in series.iter().enumerate() {
        let (r, g, b) = SERIES_COLORS[idx % SERIES_COLORS.len()];
        let color = RGBColor(r, g, b);
        let radius = config.point_radius;

        let drawn = chart
            .draw_series(s.points.iter().map(|p| {
                Circle::new((p.diameter, p.percentage), radius, color.filled())
            }))
            .map_err(|e| plot_err(&e))?;

        if config.draw_text {
            drawn
                .label(s.label.as_str())
                .legend(move |(x, y)| Circle::new((x + 10, y), radius, color.filled()));
        }
    }

    if config.draw_text {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| plot_err(&e))?;
    }

    root.present().map_err(|e| plot_err(&e))?;

    Ok(())
}

/// Compute the bounds (min/max) over every point of every series.
fn compute_bounds(series: &[Series]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for p in series.iter().flat_map(|s| s.points.iter()) {
        x_min = x_min.min(p.diameter);
        x_max = x_max.max(p.diameter);
        y_min = y_min.min(p.percentage);
        y_max = y_max.max(p.percentage);
    }

    if x_min > x_max {
        return (0.0, 1.0, 0.0, 100.0);
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
