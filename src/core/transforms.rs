//! Pure column transforms shared by both pipelines.
//!
//! Spreadsheet side:
//! - run detection over a grouping column (a new run starts whenever the
//!   value changes, and at every missing value)
//! - run-relative normalization of a numeric column
//!
//! Mask side:
//! - pixel count to calibrated area, area to equivalent-circle diameter
//! - distribution building (sort, frequency, cumulative frequency, percentile)

use std::cmp::Ordering;
use std::collections::HashMap;
use std::f64::consts::PI;

use thiserror::Error;

use super::table::{Column, Table, TableError, Value};

/// Errors raised by table-level transforms.
#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("column '{0}' is not numeric")]
    NotNumeric(String),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Suffix appended to every normalized column name.
pub const NORMALIZED_SUFFIX: &str = " NEW";

/// Assign a run id to every row of `values`.
///
/// Ids start at 1 and increase by one each time a value differs from the
/// previous row. A missing value never compares equal to anything, so each
/// missing cell opens a new run and so does the row right after it.
///
/// # Example
///
/// ```
/// use labdata_pipeline::core::table::Value;
/// use labdata_pipeline::core::transforms::run_ids;
///
/// let values: Vec<Value> = ["A", "A", "B", "A"]
///     .iter()
///     .map(|s| Value::Text(s.to_string()))
///     .collect();
/// assert_eq!(run_ids(&values), vec![1, 1, 2, 3]);
/// ```
pub fn run_ids(values: &[Value]) -> Vec<u32> {
    let mut ids = Vec::with_capacity(values.len());
    let mut id = 0u32;

    for (i, value) in values.iter().enumerate() {
        let continues = i > 0 && same_run_value(&values[i - 1], value);
        if !continues {
            id += 1;
        }
        ids.push(id);
    }

    ids
}

fn same_run_value(previous: &Value, current: &Value) -> bool {
    match (previous, current) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Text(a), Value::Text(b)) => a == b,
        _ => false,
    }
}

/// Subtract each run's starting value from every value in that run.
///
/// The anchor is the target value at the first row of the run. A missing
/// anchor makes the whole run missing, and a missing row stays missing.
///
/// # Arguments
///
/// * `ids` - Run ids as produced by [`run_ids`]
/// * `target` - Numeric values, same length as `ids`
///
/// # Returns
///
/// Run-relative values; the first row of every run with a present anchor is
/// exactly `0.0`.
pub fn normalize_by_run(ids: &[u32], target: &[Option<f64>]) -> Vec<Option<f64>> {
    debug_assert_eq!(ids.len(), target.len(), "ids and target must have same length");

    let mut normalized = Vec::with_capacity(target.len());
    let mut anchor: Option<f64> = None;

    for (i, (&id, &value)) in ids.iter().zip(target.iter()).enumerate() {
        if i == 0 || ids[i - 1] != id {
            anchor = value;
        }
        normalized.push(match (value, anchor) {
            (Some(v), Some(a)) => Some(v - a),
            _ => None,
        });
    }

    normalized
}

/// Detect runs over `grouping` and append one normalized column per target.
///
/// Each `(target, new_name)` pair appends a numeric column named
/// `"{new_name} NEW"`. Run ids are computed once and never stored in the
/// table.
///
/// # Errors
///
/// Fails when a column is absent, a target is not numeric, or an output
/// column name already exists.
pub fn add_run_normalized_columns(
    table: &mut Table,
    grouping: &str,
    targets: &[(&str, &str)],
) -> Result<()> {
    let ids = run_ids(&table.values(grouping)?);

    for &(target, new_name) in targets {
        let column = table
            .column(target)
            .ok_or_else(|| TableError::ColumnNotFound(target.to_string()))?;
        let values = column
            .numeric_values()
            .ok_or_else(|| TransformError::NotNumeric(target.to_string()))?;

        let normalized = normalize_by_run(&ids, values);
        table.push_column(Column::numeric(
            format!("{new_name}{NORMALIZED_SUFFIX}"),
            normalized,
        ))?;
    }

    Ok(())
}

/// Pixel-to-area calibration for mask images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Area covered by a single pixel, in mm².
    pub mm2_per_pixel: f64,
    /// Multiplier applied to the mm² area to reach output units.
    pub area_scale: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            mm2_per_pixel: 4.92843e-05,
            area_scale: 1000.0,
        }
    }
}

impl Calibration {
    /// Convert a foreground pixel count to a calibrated area.
    #[inline]
    pub fn area_from_pixels(&self, pixel_count: u64) -> f64 {
        pixel_count as f64 * self.mm2_per_pixel * self.area_scale
    }
}

/// Diameter of the circle whose area equals `area`.
#[inline]
pub fn diameter_from_area(area: f64) -> f64 {
    2.0 * (area / PI).sqrt()
}

/// One measured particle mask.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub grid: String,
    pub mask: u64,
    pub area: f64,
}

/// Ordering applied before the distribution columns are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPolicy {
    /// Sort by `Grid`, then `Area`.
    GridThenArea,
    /// Sort by `Area` only.
    AreaOnly,
}

impl SortPolicy {
    /// Column names making up the sort key.
    pub fn sort_keys(&self) -> &'static [&'static str] {
        match self {
            SortPolicy::GridThenArea => &["Grid", "Area"],
            SortPolicy::AreaOnly => &["Area"],
        }
    }

    fn compare(&self, a: &MeasurementRecord, b: &MeasurementRecord) -> Ordering {
        match self {
            SortPolicy::GridThenArea => a
                .grid
                .cmp(&b.grid)
                .then_with(|| a.area.total_cmp(&b.area)),
            SortPolicy::AreaOnly => a.area.total_cmp(&b.area),
        }
    }
}

/// A measurement row with its derived distribution columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionRow {
    pub grid: String,
    pub mask: u64,
    pub area: f64,
    pub diameter: f64,
    pub freq: u64,
    pub cumulative_freq: u64,
    pub percentage: Option<f64>,
}

/// Sort measurements and derive the distribution columns.
///
/// - `diameter`: equivalent-circle diameter of `area`
/// - `freq`: number of rows with the exact same diameter
/// - `cumulative_freq`: running sum of `freq` down the sorted rows
/// - `percentage` (only when `with_percentile`): `(k + 1) * 100 / N` for the
///   row at sorted position `k`
///
/// The sort is stable, so rows with equal keys keep their input order.
///
/// # Arguments
///
/// * `records` - Measurements in scan order
/// * `policy` - Sort key to apply
/// * `with_percentile` - Whether to fill `percentage`
pub fn build_distribution(
    records: &[MeasurementRecord],
    policy: SortPolicy,
    with_percentile: bool,
) -> Vec<DistributionRow> {
    let mut sorted: Vec<&MeasurementRecord> = records.iter().collect();
    sorted.sort_by(|a, b| policy.compare(a, b));

    let diameters: Vec<f64> = sorted.iter().map(|r| diameter_from_area(r.area)).collect();

    let mut counts: HashMap<u64, u64> = HashMap::with_capacity(diameters.len());
    for d in &diameters {
        *counts.entry(d.to_bits()).or_insert(0) += 1;
    }

    let total = sorted.len() as f64;
    let mut running = 0u64;

    sorted
        .into_iter()
        .zip(diameters)
        .enumerate()
        .map(|(k, (record, diameter))| {
            let freq = counts.get(&diameter.to_bits()).copied().unwrap_or(0);
            running += freq;
            DistributionRow {
                grid: record.grid.clone(),
                mask: record.mask,
                area: record.area,
                diameter,
                freq,
                cumulative_freq: running,
                percentage: with_percentile.then(|| (k + 1) as f64 * 100.0 / total),
            }
        })
        .collect()
}
