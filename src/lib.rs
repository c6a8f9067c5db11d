//! Batch pipelines for laboratory data.
//!
//! This crate provides tools for:
//! - Adding run-normalised time and moisture columns to DVS (dynamic vapour
//!   sorption) workbooks
//! - Measuring particle areas from binary mask images and writing sorted
//!   size distributions
//! - Plotting diameter against cumulative percentage per experiment
//!
//! # Example
//!
//! ```no_run
//! use labdata_pipeline::{config::DvsConfig, processors::dvs};
//! use std::path::Path;
//!
//! let source = Path::new("isotherm.xlsx");
//! let run = dvs::process_workbook(source, &dvs::default_destination(source), &DvsConfig::default())?;
//! println!("{} sheets processed", run.report.processed());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{DvsConfig, MaskConfig, PipelineConfig, PlotConfig};
pub use core::{Table, Value};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
