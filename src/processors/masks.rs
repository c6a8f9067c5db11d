//! Particle mask measurement and distribution CSV generation.
//!
//! Expected layout (any directory names work, image names carry data):
//!
//! ```text
//! base/
//!   Experiment 1/
//!     Before/
//!       a1_mask2.jpg        <- {grid}_mask{index}.jpg
//!       b2_mask3.jpg
//!     After/
//!     experiment1_before.csv            <- sorted by Grid, Area
//!     experiment1_before_full_sort.csv  <- sorted by Area, with percentile
//!   Experiment 2/
//! ```
//!
//! Mask indices 0 and 1 are background/full-frame references and are not
//! measured. Existing CSVs are left alone unless `force_update` is set.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use regex::Regex;
use thiserror::Error;

use crate::config::MaskConfig;
use crate::core::transforms::{build_distribution, Calibration, MeasurementRecord, SortPolicy};
use crate::core::writers::write_distribution_csv;

use super::batch::{BatchReport, SkipLog, UnitOutcome};

/// Errors that can occur while measuring masks.
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("File name does not match '<grid>_mask<index>': {0}")]
    MalformedFilename(String),

    #[error("Failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to list directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Grid label and mask index parsed from an image file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskName {
    pub grid: String,
    pub mask: u64,
}

/// Options for a CSV generation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Regenerate CSVs that already exist.
    pub force_update: bool,
    /// Draw progress bars on stderr.
    pub show_progress: bool,
}

/// Output CSV paths for one condition directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvPair {
    pub grid_sorted: PathBuf,
    pub full_sort: PathBuf,
}

impl CsvPair {
    /// Paths inside `experiment_dir` for the given experiment/condition names.
    pub fn new(experiment_dir: &Path, experiment: &str, condition: &str) -> Self {
        let basename = csv_basename(experiment, condition);
        Self {
            grid_sorted: experiment_dir.join(format!("{basename}.csv")),
            full_sort: experiment_dir.join(format!("{basename}_full_sort.csv")),
        }
    }
}

const MASK_PATTERN: &str = r"(.+)_mask([0-9]+)";

/// Parse `<grid>_mask<index>` out of an image file name.
///
/// The match is unanchored and the grid part is greedy, so
/// `x_mask1_mask2.jpg` yields grid `x_mask1` and index 2.
///
/// # Errors
///
/// [`MaskError::MalformedFilename`] if the pattern does not match or the
/// index does not fit in a `u64`.
pub fn parse_mask_filename(file_name: &str) -> std::result::Result<MaskName, MaskError> {
    let malformed = || MaskError::MalformedFilename(file_name.to_string());

    let pattern = Regex::new(MASK_PATTERN).map_err(|_| malformed())?;
    let captures = pattern.captures(file_name).ok_or_else(malformed)?;
    let grid = captures.get(1).ok_or_else(malformed)?.as_str().to_string();
    let mask = captures
        .get(2)
        .ok_or_else(malformed)?
        .as_str()
        .parse::<u64>()
        .map_err(|_| malformed())?;

    Ok(MaskName { grid, mask })
}

/// Lowercased `"{experiment}_{condition}"` with spaces removed.
pub fn csv_basename(experiment: &str, condition: &str) -> String {
    format!("{experiment}_{condition}")
        .to_lowercase()
        .replace(' ', "")
}

/// Count non-zero pixels of an image decoded to 8-bit grayscale.
pub fn count_foreground_pixels(path: &Path) -> std::result::Result<u64, MaskError> {
    let image = image::open(path).map_err(|e| MaskError::Image {
        path: path.to_path_buf(),
        source: e,
    })?;
    let gray = image.to_luma8();
    Ok(gray.pixels().filter(|p| p.0[0] != 0).count() as u64)
}

/// Calibrated area of the white region of a mask image.
pub fn measure_mask(path: &Path, calibration: &Calibration) -> std::result::Result<f64, MaskError> {
    Ok(calibration.area_from_pixels(count_foreground_pixels(path)?))
}

/// Immediate subdirectories of `dir`, sorted by path.
pub fn list_subdirectories(dir: &Path) -> std::result::Result<Vec<PathBuf>, MaskError> {
    let entries = fs::read_dir(dir).map_err(|e| MaskError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();

    dirs.sort();
    Ok(dirs)
}

/// All files under `dir` (recursively) with the given extension, sorted.
pub fn find_images(dir: &Path, extension: &str) -> std::result::Result<Vec<PathBuf>, MaskError> {
    let mut images = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|e| MaskError::ReadDir {
            path: current.clone(),
            source: e,
        })?;

        for path in entries.filter_map(|entry| entry.ok()).map(|entry| entry.path()) {
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
            {
                images.push(path);
            }
        }
    }

    images.sort();
    Ok(images)
}

/// Measure every particle mask under a condition directory.
///
/// File names are parsed before any image is read; reserved mask indices
/// are skipped without decoding.
///
/// # Errors
///
/// Fails on the first malformed file name or unreadable image.
pub fn measure_directory(
    dir: &Path,
    config: &MaskConfig,
    progress: &ProgressBar,
) -> std::result::Result<Vec<MeasurementRecord>, MaskError> {
    let calibration = config.calibration();
    let images = find_images(dir, &config.image_extension)?;

    progress.set_length(images.len() as u64);
    progress.set_position(0);

    let mut records = Vec::with_capacity(images.len());
    for path in images {
        let name = parse_mask_filename(&file_name(&path))?;

        if config.reserved_masks.contains(&name.mask) {
            debug!("Ignoring reserved mask {}", path.display());
        } else {
            let area = measure_mask(&path, &calibration)?;
            records.push(MeasurementRecord {
                grid: name.grid,
                mask: name.mask,
                area,
            });
        }
        progress.inc(1);
    }

    Ok(records)
}

/// Generate the CSV pair for one condition directory.
///
/// # Returns
///
/// - [`UnitOutcome::SkippedExisting`] when both CSVs exist and `force_update` is off
/// - [`UnitOutcome::SkippedInvalid`] when there is nothing to measure
/// - [`UnitOutcome::Processed`] when at least one CSV was written
pub fn process_condition(
    experiment_dir: &Path,
    condition_dir: &Path,
    options: ScanOptions,
    config: &MaskConfig,
    skip_log: &mut SkipLog,
    progress: &ProgressBar,
) -> Result<UnitOutcome> {
    let experiment = file_name(experiment_dir);
    let condition = file_name(condition_dir);
    let outputs = CsvPair::new(experiment_dir, &experiment, &condition);

    let grid_exists = outputs.grid_sorted.is_file() && !options.force_update;
    let full_exists = outputs.full_sort.is_file() && !options.force_update;

    if grid_exists && full_exists {
        skip_log.note(&format!(
            "Skipping '{}' because the CSVs already exist",
            condition_dir.display()
        ))?;
        return Ok(UnitOutcome::SkippedExisting);
    } else if grid_exists {
        skip_log.note(&format!(
            "Skipping '{}' because it already exists",
            file_name(&outputs.grid_sorted)
        ))?;
    } else if full_exists {
        skip_log.note(&format!(
            "Skipping '{}' because it already exists",
            file_name(&outputs.full_sort)
        ))?;
    }

    let records = measure_directory(condition_dir, config, progress)
        .with_context(|| format!("Failed to measure masks in {}", condition_dir.display()))?;

    if records.is_empty() {
        let reason = "no particle masks found".to_string();
        skip_log.note(&format!("Skipping '{}': {}", condition_dir.display(), reason))?;
        return Ok(UnitOutcome::SkippedInvalid { reason });
    }

    let pending = [
        (grid_exists, &outputs.grid_sorted, SortPolicy::GridThenArea, false),
        (full_exists, &outputs.full_sort, SortPolicy::AreaOnly, true),
    ];
    for (exists, path, policy, with_percentile) in pending {
        if exists {
            continue;
        }
        debug!(
            "Sorting {} rows by {} for {}",
            records.len(),
            policy.sort_keys().join(", "),
            path.display()
        );
        let rows = build_distribution(&records, policy, with_percentile);
        write_distribution_csv(path, &rows, with_percentile)?;
        info!("Wrote {}", path.display());
    }

    Ok(UnitOutcome::Processed)
}

/// Generate distribution CSVs for every experiment/condition under `base_dir`.
///
/// The skip log at `config.skip_log` is recreated for each run. The run
/// stops at the first structural failure (malformed file name, unreadable
/// image, write error): that condition is recorded as
/// [`UnitOutcome::Failed`] as the last entry of the report, and CSVs
/// written for earlier conditions are kept.
///
/// # Errors
///
/// Returns an error if the base directory, an experiment directory or the
/// skip log cannot be opened.
pub fn create_csvs(base_dir: &Path, options: ScanOptions, config: &MaskConfig) -> Result<BatchReport> {
    let experiments = list_subdirectories(base_dir)
        .with_context(|| format!("Failed to scan base directory {}", base_dir.display()))?;

    let mut skip_log = SkipLog::create(&config.skip_log)
        .with_context(|| format!("Failed to create skip log {}", config.skip_log.display()))?;

    let experiment_bar = progress_bar(options.show_progress, experiments.len() as u64, "Experiments");
    let condition_bar = progress_bar(options.show_progress, 0, "Subdirectories");
    let image_bar = progress_bar(options.show_progress, 0, "Images");

    let mut report = BatchReport::new();

    'experiments: for experiment_dir in &experiments {
        let conditions = list_subdirectories(experiment_dir)?;
        condition_bar.set_length(conditions.len() as u64);
        condition_bar.set_position(0);

        for condition_dir in &conditions {
            let unit = condition_dir.display().to_string();

            match process_condition(
                experiment_dir,
                condition_dir,
                options,
                config,
                &mut skip_log,
                &image_bar,
            ) {
                Ok(outcome) => {
                    if outcome.is_skipped() {
                        warn!("{}: {}", unit, outcome);
                    }
                    report.record(unit, outcome);
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    error!("{}: {}", unit, reason);
                    if let Err(log_err) = skip_log.error(&format!("'{}': {}", unit, reason)) {
                        warn!("Failed to write skip log: {}", log_err);
                    }
                    report.record(unit, UnitOutcome::Failed { reason });
                    break 'experiments;
                }
            }
            condition_bar.inc(1);
        }
        experiment_bar.inc(1);
    }

    image_bar.finish_and_clear();
    condition_bar.finish_and_clear();
    experiment_bar.finish_and_clear();

    Ok(report)
}

fn progress_bar(visible: bool, len: u64, label: &'static str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:>14} [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_prefix(label);
    pb
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Mask with `white` foreground pixels in a 100px-wide image.
    fn create_mask(path: &Path, white: u32) {
        let height = white / 100 + 1;
        let image = GrayImage::from_fn(100, height, |x, y| {
            if y * 100 + x < white {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        image.save(path).unwrap();
    }

    fn test_config(dir: &Path) -> MaskConfig {
        MaskConfig {
            image_extension: "png".to_string(),
            skip_log: dir.join("skipped_folders.log"),
            ..MaskConfig::default()
        }
    }

    #[test]
    fn test_parse_mask_filename() {
        assert_eq!(
            parse_mask_filename("a1_mask2.jpg").unwrap(),
            MaskName {
                grid: "a1".to_string(),
                mask: 2
            }
        );
        assert_eq!(
            parse_mask_filename("x_mask1_mask12.jpg").unwrap(),
            MaskName {
                grid: "x_mask1".to_string(),
                mask: 12
            }
        );
    }

    #[test]
    fn test_parse_mask_filename_malformed() {
        assert!(matches!(
            parse_mask_filename("a1-mask2.jpg"),
            Err(MaskError::MalformedFilename(_))
        ));
        assert!(matches!(
            parse_mask_filename("_mask2.jpg"),
            Err(MaskError::MalformedFilename(_))
        ));
    }

    #[test]
    fn test_csv_basename() {
        assert_eq!(csv_basename("Experiment 1", "Before"), "experiment1_before");
        let pair = CsvPair::new(Path::new("/data/Exp A"), "Exp A", "After Wash");
        assert_eq!(pair.grid_sorted, Path::new("/data/Exp A/expa_afterwash.csv"));
        assert_eq!(
            pair.full_sort,
            Path::new("/data/Exp A/expa_afterwash_full_sort.csv")
        );
    }

    #[test]
    fn test_measure_mask_area() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a1_mask2.png");
        create_mask(&path, 2000);

        assert_eq!(count_foreground_pixels(&path).unwrap(), 2000);
        let area = measure_mask(&path, &Calibration::default()).unwrap();
        assert!((area - 98.5686).abs() < 1e-9);
    }

    #[test]
    fn test_find_images_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        create_mask(&temp_dir.path().join("a1_mask2.png"), 10);
        create_mask(&nested.join("b1_mask3.PNG"), 10);
        File::create(temp_dir.path().join("notes.txt")).unwrap();

        let images = find_images(temp_dir.path(), "png").unwrap();
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn test_measure_directory_skips_reserved() {
        let temp_dir = TempDir::new().unwrap();
        create_mask(&temp_dir.path().join("a1_mask0.png"), 500);
        create_mask(&temp_dir.path().join("a1_mask1.png"), 500);
        create_mask(&temp_dir.path().join("a1_mask2.png"), 100);
        let config = test_config(temp_dir.path());

        let records =
            measure_directory(temp_dir.path(), &config, &ProgressBar::hidden()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mask, 2);
        assert_eq!(records[0].grid, "a1");
    }

    #[test]
    fn test_measure_directory_malformed_name() {
        let temp_dir = TempDir::new().unwrap();
        create_mask(&temp_dir.path().join("background.png"), 10);
        let config = test_config(temp_dir.path());

        let result = measure_directory(temp_dir.path(), &config, &ProgressBar::hidden());
        assert!(matches!(result, Err(MaskError::MalformedFilename(_))));
    }

    fn setup_experiment(base: &Path) -> PathBuf {
        let experiment = base.join("Experiment 1");
        let before = experiment.join("Before");
        let after = experiment.join("After");
        fs::create_dir_all(&before).unwrap();
        fs::create_dir_all(&after).unwrap();

        create_mask(&before.join("b2_mask2.png"), 300);
        create_mask(&before.join("a1_mask3.png"), 300);
        create_mask(&before.join("a1_mask4.png"), 100);
        create_mask(&before.join("a1_mask1.png"), 5000);
        create_mask(&after.join("a1_mask1.png"), 5000);

        experiment
    }

    #[test]
    fn test_create_csvs() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("Data");
        let experiment = setup_experiment(&base);
        let config = test_config(temp_dir.path());

        let report = create_csvs(&base, ScanOptions::default(), &config).unwrap();

        assert_eq!(report.processed(), 1);
        assert_eq!(report.skipped(), 1);

        let grid = fs::read_to_string(experiment.join("experiment1_before.csv")).unwrap();
        let grid_lines: Vec<&str> = grid.lines().collect();
        assert_eq!(grid_lines[0], "Grid,Mask,Area,Diameter,Freq,Cumulative Freq");
        assert!(grid_lines[1].starts_with("a1,4,"));
        assert!(grid_lines[2].starts_with("a1,3,"));
        assert!(grid_lines[3].starts_with("b2,2,"));

        let full = fs::read_to_string(experiment.join("experiment1_before_full_sort.csv")).unwrap();
        let full_lines: Vec<&str> = full.lines().collect();
        assert_eq!(full_lines.len(), 4);
        assert!(full_lines[1].starts_with("a1,4,"));
        // equal areas share a frequency of 2: cumulative 1, 3, 5
        assert!(full_lines[2].contains(",2,3,"));
        assert!(full_lines[3].ends_with(",2,5,100.0"));

        assert!(!experiment.join("experiment1_after.csv").exists());

        let log = fs::read_to_string(&config.skip_log).unwrap();
        assert!(log.starts_with("Timestamp: "));
        assert!(log.contains("no particle masks found"));
    }

    #[test]
    fn test_create_csvs_skips_existing() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("Data");
        let experiment = setup_experiment(&base);
        let config = test_config(temp_dir.path());

        create_csvs(&base, ScanOptions::default(), &config).unwrap();

        // remove only the grid CSV: the full sort must be left untouched
        let full_path = experiment.join("experiment1_before_full_sort.csv");
        let mut file = File::create(&full_path).unwrap();
        writeln!(file, "sentinel").unwrap();
        drop(file);
        fs::remove_file(experiment.join("experiment1_before.csv")).unwrap();

        let report = create_csvs(&base, ScanOptions::default(), &config).unwrap();
        assert_eq!(report.processed(), 1);
        assert_eq!(fs::read_to_string(&full_path).unwrap().trim(), "sentinel");
        assert!(experiment.join("experiment1_before.csv").exists());

        let report = create_csvs(&base, ScanOptions::default(), &config).unwrap();
        let before = experiment.join("Before").display().to_string();
        assert_eq!(report.outcome(&before), Some(&UnitOutcome::SkippedExisting));

        let forced = ScanOptions {
            force_update: true,
            show_progress: false,
        };
        let report = create_csvs(&base, forced, &config).unwrap();
        assert_eq!(report.outcome(&before), Some(&UnitOutcome::Processed));
        assert_ne!(fs::read_to_string(&full_path).unwrap().trim(), "sentinel");
    }

    #[test]
    fn test_create_csvs_stops_on_malformed_name() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("Data");
        let experiment = setup_experiment(&base);
        let later = experiment.join("Zeta");
        fs::create_dir_all(&later).unwrap();
        create_mask(&later.join("stray.png"), 10);
        let second = base.join("Experiment 2").join("Before");
        fs::create_dir_all(&second).unwrap();
        create_mask(&second.join("a1_mask2.png"), 10);
        let config = test_config(temp_dir.path());

        let report = create_csvs(&base, ScanOptions::default(), &config).unwrap();

        // conditions before the failure keep their CSVs
        assert!(experiment.join("experiment1_before.csv").exists());
        assert!(experiment.join("experiment1_before_full_sort.csv").exists());
        assert_eq!(report.processed(), 1);
        assert_eq!(report.failed(), 1);

        let (unit, outcome) = report.outcomes.last().unwrap();
        assert_eq!(unit, &later.display().to_string());
        match outcome {
            UnitOutcome::Failed { reason } => assert!(reason.contains("stray.png")),
            other => panic!("unexpected outcome {other:?}"),
        }

        // nothing after the failing condition runs
        assert!(!base.join("Experiment 2").join("experiment2_before.csv").exists());

        let log = fs::read_to_string(&config.skip_log).unwrap();
        assert!(log.contains("ERROR: "));
        assert!(log.contains("stray.png"));
    }
}
