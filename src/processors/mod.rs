//! Batch pipelines built on the core table and transform code.

pub mod batch;
pub mod columns;
pub mod dvs;
pub mod masks;

// Re-export key types for convenience
pub use batch::{BatchReport, SkipLog, UnitOutcome};
pub use columns::{validate_dvs_sheet, ColumnCheckError};
pub use dvs::{default_destination, process_workbook, DvsRun};
pub use masks::{create_csvs, parse_mask_filename, MaskError, MaskName, ScanOptions};
