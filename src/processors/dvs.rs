//! DVS spreadsheet processing.
//!
//! Adds run-relative time and moisture columns to every qualifying sheet
//! of a workbook. Runs are detected twice: once over the target partial
//! pressure column (individual RH steps) and once over the RH direction
//! column (up vs down ramps). A sheet that fails validation is skipped and
//! the rest of the workbook is still processed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use regex::Regex;

use crate::config::DvsConfig;
use crate::core::loaders::{load_workbook, Sheet};
use crate::core::table::Table;
use crate::core::transforms::{self, add_run_normalized_columns, NORMALIZED_SUFFIX};
use crate::core::writers::write_workbook;

use super::batch::{BatchReport, SkipLog, UnitOutcome};
use super::columns::validate_dvs_sheet;

/// Result of a workbook run.
#[derive(Debug)]
pub struct DvsRun {
    /// One outcome per input sheet, in workbook order.
    pub report: BatchReport,
    /// Path of the written workbook, `None` when no sheet qualified.
    pub output: Option<PathBuf>,
}

/// Default output path: `<stem> Updated.xlsx` next to the source.
pub fn default_destination(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "workbook".to_string());
    source.with_file_name(format!("{stem} Updated.xlsx"))
}

/// Append the three normalized columns to a validated sheet.
///
/// # Arguments
///
/// * `table` - Sheet data; time and moisture must be numeric
/// * `pressure_column` - Resolved target partial pressure column
/// * `config` - Column names
pub fn transform_sheet(
    table: &mut Table,
    pressure_column: &str,
    config: &DvsConfig,
) -> transforms::Result<()> {
    for output in [
        &config.step_time_output,
        &config.step_moisture_output,
        &config.ramp_time_output,
    ] {
        let name = format!("{output}{NORMALIZED_SUFFIX}");
        if table.has_column(&name) {
            warn!("Replacing existing column '{}'", name);
            table.remove_column(&name)?;
        }
    }

    add_run_normalized_columns(
        table,
        pressure_column,
        &[
            (config.time_column.as_str(), config.step_time_output.as_str()),
            (
                config.moisture_column.as_str(),
                config.step_moisture_output.as_str(),
            ),
        ],
    )?;

    add_run_normalized_columns(
        table,
        &config.direction_column,
        &[(config.time_column.as_str(), config.ramp_time_output.as_str())],
    )?;

    Ok(())
}

/// Validate and transform one sheet.
///
/// Returns the outcome to record; the sheet is modified in place only when
/// the outcome is [`UnitOutcome::Processed`].
pub fn process_sheet(sheet: &mut Sheet, placeholder: &Regex, config: &DvsConfig) -> UnitOutcome {
    if placeholder.is_match(&sheet.name) {
        info!("Skipping {}", sheet.name);
        return UnitOutcome::SkippedInvalid {
            reason: "placeholder sheet name".to_string(),
        };
    }

    info!("Processing {}", sheet.name);

    let pressure_column = match validate_dvs_sheet(&sheet.table, config) {
        Ok(column) => column,
        Err(e) => {
            error!("ERROR: {}", e);
            info!("Skipping {} because of missing column", sheet.name);
            return UnitOutcome::SkippedInvalid {
                reason: e.to_string(),
            };
        }
    };
    debug!("{}: grouping pressure steps on '{}'", sheet.name, pressure_column);

    let mut table = sheet.table.clone();
    match transform_sheet(&mut table, pressure_column, config) {
        Ok(()) => {
            sheet.table = table;
            UnitOutcome::Processed
        }
        Err(e) => {
            error!("{}: {}", sheet.name, e);
            UnitOutcome::SkippedInvalid {
                reason: e.to_string(),
            }
        }
    }
}

/// Process every sheet of `source` and write the qualifying ones to `destination`.
///
/// Placeholder sheets and sheets failing validation are recorded as
/// skipped, and noted in `config.skip_log` when one is set. The destination
/// workbook is only written when at least one sheet was processed.
///
/// # Errors
///
/// Returns an error if the placeholder pattern is invalid, the source
/// cannot be read, or the skip log or destination cannot be written.
pub fn process_workbook(source: &Path, destination: &Path, config: &DvsConfig) -> Result<DvsRun> {
    let placeholder = Regex::new(&config.placeholder_sheet_pattern).with_context(|| {
        format!(
            "Invalid placeholder sheet pattern: {}",
            config.placeholder_sheet_pattern
        )
    })?;

    let sheets = load_workbook(source)
        .with_context(|| format!("Failed to read workbook: {}", source.display()))?;

    let mut skip_log = SkipLog::open(config.skip_log.as_deref())
        .context("Failed to create skip log")?;

    let mut report = BatchReport::new();
    let mut processed = Vec::with_capacity(sheets.len());

    for mut sheet in sheets {
        let outcome = process_sheet(&mut sheet, &placeholder, config);
        if outcome == UnitOutcome::Processed {
            report.record(sheet.name.clone(), outcome);
            processed.push(sheet);
        } else {
            skip_log.note(&format!("Skipping '{}': {}", sheet.name, outcome))?;
            report.record(sheet.name, outcome);
        }
    }

    if processed.is_empty() {
        warn!("No sheets processed, {} not written", destination.display());
        return Ok(DvsRun {
            report,
            output: None,
        });
    }

    write_workbook(destination, &processed)
        .with_context(|| format!("Failed to write workbook: {}", destination.display()))?;
    info!(
        "Wrote {} sheet(s) to {}",
        processed.len(),
        destination.display()
    );

    Ok(DvsRun {
        report,
        output: Some(destination.to_path_buf()),
    })
}
