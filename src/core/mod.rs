//! Core data types, transforms and I/O operations.

pub mod loaders;
pub mod table;
pub mod transforms;
pub mod writers;

pub use loaders::{load_distribution_csv, load_workbook, DistributionPoint, Sheet};
pub use table::{Column, ColumnData, Table, Value};
pub use transforms::{
    build_distribution, diameter_from_area, normalize_by_run, run_ids, Calibration,
    DistributionRow, MeasurementRecord, SortPolicy,
};
pub use writers::{write_distribution_csv, write_workbook, WriteError};
