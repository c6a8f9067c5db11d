//! Data loaders for DVS workbooks and particle distribution CSVs.
//!
//! This module provides parsers for:
//! - Spreadsheet workbooks (xlsx, xlsm, xls, ods) read sheet by sheet
//! - Single-sheet CSV exports of the same data
//! - Full-sort distribution CSVs written by the mask pipeline

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use serde::Deserialize;
use thiserror::Error;

use super::table::{Column, Table, TableError, Value};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Unsupported workbook format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// One named sheet of a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
}

/// Cell texts read as missing, matched after trimming.
pub const NA_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// A cell before column typing is decided.
#[derive(Debug, Clone, PartialEq)]
enum RawCell {
    Number(f64),
    Text(String),
    Empty,
}

impl RawCell {
    fn from_text(text: &str) -> Self {
        if NA_MARKERS.contains(&text.trim()) {
            RawCell::Empty
        } else {
            RawCell::Text(text.to_string())
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            RawCell::Number(n) if !n.is_nan() => Some(*n),
            RawCell::Number(_) => None,
            RawCell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
            RawCell::Empty => None,
        }
    }
}

impl From<&Data> for RawCell {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => RawCell::Empty,
            Data::Int(i) => RawCell::Number(*i as f64),
            Data::Float(f) if f.is_nan() => RawCell::Empty,
            Data::Float(f) => RawCell::Number(*f),
            Data::String(s) => RawCell::from_text(s),
            Data::Bool(b) => RawCell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
            other => RawCell::Text(other.to_string()),
        }
    }
}

/// Load every sheet of a workbook, in workbook order.
///
/// Spreadsheet formats are read with calamine; a `.csv` file is read as a
/// single sheet named after the file stem. The first row of each sheet is
/// the header. Header names are trimmed, blank headers become
/// `Unnamed: <index>`, and repeated headers get a `.1`, `.2`, ... suffix.
///
/// # Arguments
///
/// * `path` - Path to the workbook
///
/// # Returns
///
/// One [`Sheet`] per worksheet. Sheets without any rows load as empty tables.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed, or its
/// extension is not a known spreadsheet format.
pub fn load_workbook<P: AsRef<Path>>(path: P) -> Result<Vec<Sheet>> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => Ok(vec![load_csv_sheet(path)?]),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_spreadsheet(path),
        _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn load_spreadsheet(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_owned();
    let mut sheets = Vec::with_capacity(names.len());

    for name in names {
        let range = workbook.worksheet_range(&name)?;
        let mut rows = range.rows();

        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row.iter().map(|c| c.to_string()).collect(),
            None => Vec::new(),
        };
        let body: Vec<Vec<RawCell>> = rows
            .map(|row| row.iter().map(RawCell::from).collect())
            .collect();

        let table = build_table(&headers, &body)?;
        sheets.push(Sheet { name, table });
    }

    Ok(sheets)
}

fn load_csv_sheet(path: &Path) -> Result<Sheet> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut body = Vec::new();
    for result in reader.records() {
        let record = result?;
        body.push(
            record
                .iter()
                .map(RawCell::from_text)
                .collect(),
        );
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Sheet".to_string());

    Ok(Sheet {
        name,
        table: build_table(&headers, &body)?,
    })
}

/// Type each column and assemble the table.
fn build_table(headers: &[String], body: &[Vec<RawCell>]) -> Result<Table> {
    let names = clean_headers(headers);
    let mut table = Table::new();

    for (idx, name) in names.into_iter().enumerate() {
        let cells: Vec<RawCell> = body
            .iter()
            .map(|row| row.get(idx).cloned().unwrap_or(RawCell::Empty))
            .collect();
        table.push_column(coerce_column(name, &cells))?;
    }

    Ok(table)
}

/// Trim header names and make them unique.
fn clean_headers(headers: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut names = Vec::with_capacity(headers.len());

    for (idx, raw) in headers.iter().enumerate() {
        let trimmed = raw.trim();
        let base = if trimmed.is_empty() {
            format!("Unnamed: {idx}")
        } else {
            trimmed.to_string()
        };

        let mut name = base.clone();
        let mut dup = 0;
        while seen.contains(&name) {
            dup += 1;
            name = format!("{base}.{dup}");
        }
        seen.insert(name.clone());
        names.push(name);
    }

    names
}

/// Build a numeric column when every present cell reads as a number.
///
/// Otherwise the column is text, or mixed when it holds real number cells
/// next to text, so `1` and `"1"` stay distinct.
fn coerce_column(name: String, cells: &[RawCell]) -> Column {
    let numeric: Option<Vec<Option<f64>>> = cells
        .iter()
        .map(|cell| match cell {
            RawCell::Empty => Some(None),
            other => other.as_number().map(Some),
        })
        .collect();

    if let Some(values) = numeric {
        return Column::numeric(name, values);
    }

    if cells.iter().any(|cell| matches!(cell, RawCell::Number(_))) {
        Column::mixed(
            name,
            cells
                .iter()
                .map(|cell| match cell {
                    RawCell::Number(n) => Value::Number(*n),
                    RawCell::Text(s) => Value::Text(s.clone()),
                    RawCell::Empty => Value::Missing,
                })
                .collect(),
        )
    } else {
        Column::text(
            name,
            cells
                .iter()
                .map(|cell| match cell {
                    RawCell::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        )
    }
}

/// One plotted point of a particle distribution.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DistributionPoint {
    #[serde(rename = "Diameter")]
    pub diameter: f64,
    #[serde(rename = "Percentage of Particle")]
    pub percentage: f64,
}

/// Load the diameter/percentile pairs from a full-sort distribution CSV.
///
/// # Errors
///
/// Returns an error if the file cannot be read, lacks the `Diameter` or
/// `Percentage of Particle` column, or a value does not parse.
pub fn load_distribution_csv<P: AsRef<Path>>(path: P) -> Result<Vec<DistributionPoint>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    for required in ["Diameter", "Percentage of Particle"] {
        if !headers.iter().any(|h| h == required) {
            return Err(LoaderError::MissingColumns(format!(
                "{} in {}",
                required,
                path.display()
            )));
        }
    }

    let mut points = Vec::new();
    for result in reader.deserialize() {
        let point: DistributionPoint = result?;
        points.push(point);
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::ColumnData;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_load_csv_sheet_types_columns() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(
            temp_dir.path(),
            "run 1.csv",
            &[
                " Time [minutes] ,RH Direction,Notes",
                "0,Up,",
                "1.5,Up,ok",
                ",Down,3",
            ],
        );

        let sheets = load_workbook(&path).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].name, "run 1");

        let table = &sheets[0].table;
        assert_eq!(table.column_names(), vec!["Time [minutes]", "RH Direction", "Notes"]);
        assert_eq!(
            table.column("Time [minutes]").unwrap().numeric_values().unwrap(),
            &[Some(0.0), Some(1.5), None]
        );
        assert!(matches!(
            table.column("Notes").unwrap().data,
            ColumnData::Text(_)
        ));
    }

    #[test]
    fn test_clean_headers() {
        let headers = vec![
            "A".to_string(),
            " ".to_string(),
            "A ".to_string(),
            "A".to_string(),
        ];
        assert_eq!(clean_headers(&headers), vec!["A", "Unnamed: 1", "A.1", "A.2"]);
    }

    #[test]
    fn test_coerce_column_mixed_keeps_numbers() {
        let cells = [
            RawCell::Number(1.0),
            RawCell::Text("1".to_string()),
            RawCell::Text("Up".to_string()),
            RawCell::Empty,
        ];
        let column = coerce_column("X".to_string(), &cells);
        assert_eq!(
            column.data,
            ColumnData::Mixed(vec![
                Value::Number(1.0),
                Value::Text("1".to_string()),
                Value::Text("Up".to_string()),
                Value::Missing,
            ])
        );
    }

    #[test]
    fn test_text_only_column_stays_text() {
        let cells = [RawCell::Text("1".to_string()), RawCell::Text("Up".to_string())];
        let column = coerce_column("X".to_string(), &cells);
        assert_eq!(
            column.data,
            ColumnData::Text(vec![Some("1".to_string()), Some("Up".to_string())])
        );
    }

    #[test]
    fn test_na_markers_read_as_missing() {
        for marker in NA_MARKERS {
            let cells = [
                RawCell::Number(1.0),
                RawCell::from_text(marker),
                RawCell::from_text(&format!(" {marker} ")),
            ];
            let column = coerce_column("Moisture".to_string(), &cells);
            assert_eq!(
                column.data,
                ColumnData::Numeric(vec![Some(1.0), None, None]),
                "marker {marker:?}"
            );
        }
    }

    #[test]
    fn test_nan_never_parses_as_number() {
        assert_eq!(RawCell::Text("nan".to_string()).as_number(), None);
        assert_eq!(RawCell::Text("NAN".to_string()).as_number(), None);
        assert_eq!(RawCell::Number(f64::NAN).as_number(), None);
        assert_eq!(RawCell::from(&Data::Float(f64::NAN)), RawCell::Empty);
    }

    #[test]
    fn test_all_na_markers_column_is_all_missing() {
        let cells: Vec<RawCell> = ["n/a", "#N/A", "NaN"]
            .iter()
            .map(|m| RawCell::from_text(m))
            .collect();
        let column = coerce_column("Moisture".to_string(), &cells);
        assert!(column.is_all_missing());
    }

    #[test]
    fn test_load_csv_sheet_na_markers() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(
            temp_dir.path(),
            "run.csv",
            &["Moisture content %,Flag", "1.0,n/a", "NaN,#N/A", "#N/A,null"],
        );

        let sheets = load_workbook(&path).unwrap();
        let table = &sheets[0].table;
        assert_eq!(
            table.column("Moisture content %").unwrap().numeric_values().unwrap(),
            &[Some(1.0), None, None]
        );
        assert!(table.column("Flag").unwrap().is_all_missing());
    }

    #[test]
    fn test_coerce_column_all_empty_is_numeric() {
        let cells = [RawCell::Empty, RawCell::Empty];
        let column = coerce_column("X".to_string(), &cells);
        assert_eq!(column.data, ColumnData::Numeric(vec![None, None]));
        assert!(column.is_all_missing());
    }

    #[test]
    fn test_load_workbook_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "data.txt", &["a"]);
        assert!(matches!(
            load_workbook(&path),
            Err(LoaderError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_distribution_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(
            temp_dir.path(),
            "exp_before_full_sort.csv",
            &[
                "Grid,Mask,Area,Diameter,Freq,Cumulative Freq,Percentage of Particle",
                "a1,2,1.0,1.1283791670955126,1,1,50.0",
                "a1,3,2.0,1.5957691216057308,1,2,100.0",
            ],
        );

        let points = load_distribution_csv(&path).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].percentage, 100.0);
    }

    #[test]
    fn test_load_distribution_csv_missing_column() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(
            temp_dir.path(),
            "exp_before.csv",
            &["Grid,Mask,Area,Diameter,Freq,Cumulative Freq", "a1,2,1.0,1.1,1,1"],
        );

        assert!(matches!(
            load_distribution_csv(&path),
            Err(LoaderError::MissingColumns(_))
        ));
    }
}
