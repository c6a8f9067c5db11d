//! Required-column checks run before a sheet is transformed.

use thiserror::Error;

use crate::config::DvsConfig;
use crate::core::table::Table;

/// Reasons a sheet cannot be transformed.
#[derive(Debug, Error, PartialEq)]
pub enum ColumnCheckError {
    #[error("'{0}' column does not exist")]
    Missing(String),

    #[error("column '{0}' exists but is full of missing values")]
    AllMissing(String),

    #[error("no target partial pressure column, expected one of: {}", .0.join(", "))]
    NoSolventColumn(Vec<String>),

    #[error("column '{0}' does not hold numbers")]
    NotNumeric(String),
}

/// Result type for column checks.
pub type Result<T> = std::result::Result<T, ColumnCheckError>;

/// Pick the first pressure column present in the table.
///
/// # Errors
///
/// [`ColumnCheckError::NoSolventColumn`] naming every candidate when none
/// is present.
pub fn resolve_pressure_column<'a>(table: &Table, candidates: &'a [String]) -> Result<&'a str> {
    candidates
        .iter()
        .find(|name| table.has_column(name))
        .map(String::as_str)
        .ok_or_else(|| ColumnCheckError::NoSolventColumn(candidates.to_vec()))
}

/// Check that each column exists and holds at least one value.
///
/// Columns are checked in order and the first failure is returned.
pub fn check_required_columns(table: &Table, required: &[&str]) -> Result<()> {
    for &name in required {
        match table.column(name) {
            None => return Err(ColumnCheckError::Missing(name.to_string())),
            Some(column) if column.is_all_missing() => {
                return Err(ColumnCheckError::AllMissing(name.to_string()))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Check that each column was typed as numeric when loaded.
pub fn check_numeric_columns(table: &Table, columns: &[&str]) -> Result<()> {
    for &name in columns {
        let column = table
            .column(name)
            .ok_or_else(|| ColumnCheckError::Missing(name.to_string()))?;
        if column.numeric_values().is_none() {
            return Err(ColumnCheckError::NotNumeric(name.to_string()));
        }
    }
    Ok(())
}

/// Validate a DVS sheet and return the pressure column to group on.
///
/// Checks time, moisture and direction columns, then the resolved pressure
/// column, then that time and moisture are numeric.
pub fn validate_dvs_sheet<'a>(table: &Table, config: &'a DvsConfig) -> Result<&'a str> {
    check_required_columns(
        table,
        &[
            config.time_column.as_str(),
            config.moisture_column.as_str(),
            config.direction_column.as_str(),
        ],
    )?;

    let pressure = resolve_pressure_column(table, &config.pressure_columns)?;
    check_required_columns(table, &[pressure])?;

    check_numeric_columns(
        table,
        &[config.time_column.as_str(), config.moisture_column.as_str()],
    )?;

    Ok(pressure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::Column;

    const SOLVENT_A: &str = "Target Partial Pressure (Solvent A) [%]";
    const SOLVENT_B: &str = "Target Partial Pressure (Solvent B) [%]";

    fn dvs_table(pressure_name: &str, moisture: Column) -> Table {
        Table::from_columns(vec![
            Column::numeric("Time [minutes]", vec![Some(0.0), Some(1.0)]),
            moisture,
            Column::text("RH Direction", vec![Some("Up".to_string()), Some("Up".to_string())]),
            Column::numeric(pressure_name, vec![Some(10.0), Some(20.0)]),
        ])
        .unwrap()
    }

    fn moisture() -> Column {
        Column::numeric("Moisture content %", vec![Some(0.1), Some(0.2)])
    }

    #[test]
    fn test_resolve_pressure_column_prefers_a() {
        let mut table = dvs_table(SOLVENT_B, moisture());
        table
            .push_column(Column::numeric(SOLVENT_A, vec![Some(1.0), Some(1.0)]))
            .unwrap();
        let config = DvsConfig::default();

        assert_eq!(
            resolve_pressure_column(&table, &config.pressure_columns),
            Ok(SOLVENT_A)
        );
    }

    #[test]
    fn test_resolve_pressure_column_neither() {
        let table = Table::from_columns(vec![Column::numeric("x", vec![Some(1.0)])]).unwrap();
        let config = DvsConfig::default();

        let err = resolve_pressure_column(&table, &config.pressure_columns).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(SOLVENT_A));
        assert!(message.contains(SOLVENT_B));
    }

    #[test]
    fn test_validate_dvs_sheet_ok() {
        let table = dvs_table(SOLVENT_B, moisture());
        let config = DvsConfig::default();
        assert_eq!(validate_dvs_sheet(&table, &config), Ok(SOLVENT_B));
    }

    #[test]
    fn test_missing_vs_all_missing() {
        let config = DvsConfig::default();

        let all_missing = dvs_table(
            SOLVENT_A,
            Column::numeric("Moisture content %", vec![None, None]),
        );
        assert_eq!(
            validate_dvs_sheet(&all_missing, &config),
            Err(ColumnCheckError::AllMissing("Moisture content %".to_string()))
        );

        let absent = dvs_table(SOLVENT_A, Column::numeric("Other", vec![None, None]));
        assert_eq!(
            validate_dvs_sheet(&absent, &config),
            Err(ColumnCheckError::Missing("Moisture content %".to_string()))
        );
    }

    #[test]
    fn test_non_numeric_moisture() {
        let config = DvsConfig::default();
        let table = dvs_table(
            SOLVENT_A,
            Column::text(
                "Moisture content %",
                vec![Some("n/a".to_string()), Some("0.2".to_string())],
            ),
        );
        assert_eq!(
            validate_dvs_sheet(&table, &config),
            Err(ColumnCheckError::NotNumeric("Moisture content %".to_string()))
        );
    }
}
