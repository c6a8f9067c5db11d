//! Data writers for workbooks and distribution CSVs.
//!
//! This module provides functions for writing pipeline output:
//! - XLSX workbooks with one worksheet per processed sheet
//! - Particle distribution CSVs with the derived measurement columns

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use rust_xlsxwriter::{Workbook, XlsxError};
use thiserror::Error;

use super::loaders::Sheet;
use super::table::{ColumnData, Value};
use super::transforms::DistributionRow;

/// Header of the distribution CSVs, without the optional percentile column.
pub const DISTRIBUTION_HEADERS: [&str; 6] =
    ["Grid", "Mask", "Area", "Diameter", "Freq", "Cumulative Freq"];

/// Header of the optional percentile column.
pub const PERCENTAGE_HEADER: &str = "Percentage of Particle";

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// XLSX writing error.
    #[error("XLSX write error for '{path}': {source}")]
    XlsxError {
        path: String,
        #[source]
        source: XlsxError,
    },

    /// A sheet has more columns than a worksheet can hold.
    #[error("sheet '{sheet}' has {columns} columns, more than a worksheet can hold")]
    TooManyColumns { sheet: String, columns: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Write sheets to an XLSX workbook.
///
/// Each sheet becomes a worksheet with the same name. Row 0 holds the
/// column names; numeric cells are written as numbers, text cells as
/// strings, and missing cells are left blank.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `sheets` - Sheets to write, in worksheet order
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - A sheet name is not a valid worksheet name
/// - The workbook cannot be saved
pub fn write_workbook(path: &Path, sheets: &[Sheet]) -> Result<()> {
    ensure_parent_dirs(path)?;

    let path_str = path.display().to_string();
    let xlsx_err = |e: XlsxError| WriteError::XlsxError {
        path: path_str.clone(),
        source: e,
    };

    let mut workbook = Workbook::new();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name.as_str()).map_err(xlsx_err)?;

        for (idx, column) in sheet.table.columns().iter().enumerate() {
            let col = u16::try_from(idx).map_err(|_| WriteError::TooManyColumns {
                sheet: sheet.name.clone(),
                columns: sheet.table.num_columns(),
            })?;

            worksheet
                .write_string(0, col, column.name.as_str())
                .map_err(xlsx_err)?;

            match &column.data {
                ColumnData::Numeric(values) => {
                    for (row, value) in values.iter().enumerate() {
                        if let Some(v) = value {
                            worksheet
                                .write_number(row as u32 + 1, col, *v)
                                .map_err(xlsx_err)?;
                        }
                    }
                }
                ColumnData::Text(values) => {
                    for (row, value) in values.iter().enumerate() {
                        if let Some(v) = value {
                            worksheet
                                .write_string(row as u32 + 1, col, v.as_str())
                                .map_err(xlsx_err)?;
                        }
                    }
                }
                ColumnData::Mixed(values) => {
                    for (row, value) in values.iter().enumerate() {
                        match value {
                            Value::Number(n) => {
                                worksheet
                                    .write_number(row as u32 + 1, col, *n)
                                    .map_err(xlsx_err)?;
                            }
                            Value::Text(t) => {
                                worksheet
                                    .write_string(row as u32 + 1, col, t.as_str())
                                    .map_err(xlsx_err)?;
                            }
                            Value::Missing => {}
                        }
                    }
                }
            }
        }
    }

    workbook.save(path).map_err(xlsx_err)?;

    Ok(())
}

/// Write distribution rows to CSV.
///
/// Columns are `Grid, Mask, Area, Diameter, Freq, Cumulative Freq`, followed
/// by `Percentage of Particle` when `with_percentile` is set. Floats use
/// their shortest round-trip form.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `rows` - Rows from [`build_distribution`](super::transforms::build_distribution)
/// * `with_percentile` - Whether to emit the percentile column
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_distribution_csv(
    path: &Path,
    rows: &[DistributionRow],
    with_percentile: bool,
) -> Result<()> {
    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let buf_writer = BufWriter::new(file);
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let path_str = path.display().to_string();

    // Write header
    let mut header: Vec<&str> = DISTRIBUTION_HEADERS.to_vec();
    if with_percentile {
        header.push(PERCENTAGE_HEADER);
    }
    csv_writer
        .write_record(&header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    // Write data rows
    for row in rows {
        let mut record = vec![
            row.grid.clone(),
            row.mask.to_string(),
            format!("{:?}", row.area),
            format!("{:?}", row.diameter),
            row.freq.to_string(),
            row.cumulative_freq.to_string(),
        ];
        if with_percentile {
            record.push(row.percentage.map(|p| format!("{:?}", p)).unwrap_or_default());
        }

        csv_writer
            .write_record(&record)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::load_workbook;
    use crate::core::table::{Column, Table};
    use crate::core::transforms::{build_distribution, MeasurementRecord, SortPolicy};
    use std::fs;
    use tempfile::tempdir;

    fn create_test_records() -> Vec<MeasurementRecord> {
        vec![
            MeasurementRecord {
                grid: "b2".to_string(),
                mask: 2,
                area: 2.0,
            },
            MeasurementRecord {
                grid: "a1".to_string(),
                mask: 3,
                area: 1.0,
            },
        ]
    }

    fn create_test_sheet(name: &str) -> Sheet {
        Sheet {
            name: name.to_string(),
            table: Table::from_columns(vec![
                Column::numeric("Time [minutes]", vec![Some(0.0), None, Some(2.5)]),
                Column::text(
                    "RH Direction",
                    vec![Some("Up".to_string()), Some("Up".to_string()), None],
                ),
            ])
            .unwrap(),
        }
    }

    #[test]
    fn test_write_distribution_csv_with_percentile() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exp_before_full_sort.csv");
        let rows = build_distribution(&create_test_records(), SortPolicy::AreaOnly, true);

        write_distribution_csv(&path, &rows, true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(
            lines[0],
            "Grid,Mask,Area,Diameter,Freq,Cumulative Freq,Percentage of Particle"
        );
        assert_eq!(lines.len(), 3); // header + 2 data rows
        assert!(lines[1].starts_with("a1,3,1.0,"));
        assert!(lines[2].ends_with(",1,2,100.0"));
    }

    #[test]
    fn test_write_distribution_csv_without_percentile() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("exp_before.csv");
        let rows = build_distribution(&create_test_records(), SortPolicy::GridThenArea, false);

        write_distribution_csv(&path, &rows, false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "Grid,Mask,Area,Diameter,Freq,Cumulative Freq");
        assert!(lines[1].starts_with("a1,"));
        assert!(lines[2].starts_with("b2,"));
    }

    #[test]
    fn test_write_workbook_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("updated.xlsx");
        let sheets = vec![create_test_sheet("Sample 1"), create_test_sheet("Sample 2")];

        write_workbook(&path, &sheets).unwrap();

        let loaded = load_workbook(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "Sample 1");
        assert_eq!(loaded[1].name, "Sample 2");
        assert_eq!(loaded[0].table.column_names(), vec!["Time [minutes]", "RH Direction"]);
        assert_eq!(
            loaded[0]
                .table
                .column("Time [minutes]")
                .unwrap()
                .numeric_values()
                .unwrap(),
            &[Some(0.0), None, Some(2.5)]
        );
    }

    #[test]
    fn test_write_workbook_invalid_sheet_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.xlsx");
        let sheets = vec![create_test_sheet("bad/name")];

        let result = write_workbook(&path, &sheets);
        assert!(matches!(result, Err(WriteError::XlsxError { .. })));
    }

    #[test]
    fn test_write_workbook_mixed_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.xlsx");
        let step = vec![
            Value::Number(1.0),
            Value::Text("1".to_string()),
            Value::Text("Up".to_string()),
        ];
        let sheets = vec![Sheet {
            name: "Mixed".to_string(),
            table: Table::from_columns(vec![Column::mixed("Step", step.clone())]).unwrap(),
        }];

        write_workbook(&path, &sheets).unwrap();

        let loaded = load_workbook(&path).unwrap();
        assert_eq!(
            loaded[0].table.column("Step").unwrap().data,
            ColumnData::Mixed(step)
        );
    }
}
