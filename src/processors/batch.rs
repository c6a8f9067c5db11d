//! Work-list bookkeeping shared by the batch pipelines.
//!
//! Each pipeline walks a list of units (sheets, condition directories) and
//! records one [`UnitOutcome`] per unit in a [`BatchReport`]. Skips and
//! failures are also written to an optional [`SkipLog`] file.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::Local;

/// What happened to one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Outputs were written.
    Processed,
    /// Every output already existed and nothing was regenerated.
    SkippedExisting,
    /// The unit's input did not qualify for processing.
    SkippedInvalid { reason: String },
    /// Processing hit a fatal error; the batch stopped here.
    Failed { reason: String },
}

impl UnitOutcome {
    /// True for both skip variants.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            UnitOutcome::SkippedExisting | UnitOutcome::SkippedInvalid { .. }
        )
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Processed => write!(f, "processed"),
            UnitOutcome::SkippedExisting => write!(f, "skipped (outputs exist)"),
            UnitOutcome::SkippedInvalid { reason } => write!(f, "skipped ({reason})"),
            UnitOutcome::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

/// Outcomes of a batch run, in processing order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, UnitOutcome)>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for a unit.
    pub fn record(&mut self, unit: impl Into<String>, outcome: UnitOutcome) {
        self.outcomes.push((unit.into(), outcome));
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Processed))
    }

    pub fn skipped(&self) -> usize {
        self.count(UnitOutcome::is_skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Failed { .. }))
    }

    /// Outcome recorded for `unit`, if any.
    pub fn outcome(&self, unit: &str) -> Option<&UnitOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == unit)
            .map(|(_, outcome)| outcome)
    }

    /// Unit and reason of the first failed unit, if any.
    pub fn failure(&self) -> Option<(&str, &str)> {
        self.outcomes.iter().find_map(|(name, outcome)| match outcome {
            UnitOutcome::Failed { reason } => Some((name.as_str(), reason.as_str())),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Plain-text log of skipped and failed units.
///
/// The file is truncated when created and starts with a timestamp line.
/// Every entry is flushed immediately so the log survives an aborted run.
pub struct SkipLog {
    writer: Option<BufWriter<File>>,
}

impl SkipLog {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "Timestamp: {}",
            Local::now().format("%d-%m-%Y %H:%M:%S")
        )?;
        writer.flush()?;
        Ok(Self {
            writer: Some(writer),
        })
    }

    /// A log that discards every entry.
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    /// Create the log at `path`, or a disabled log when there is no path.
    pub fn open(path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(path) => Self::create(path),
            None => Ok(Self::disabled()),
        }
    }

    /// Append a `NOTE:` line.
    pub fn note(&mut self, message: &str) -> io::Result<()> {
        self.write_line("NOTE", message)
    }

    /// Append an `ERROR:` line.
    pub fn error(&mut self, message: &str) -> io::Result<()> {
        self.write_line("ERROR", message)
    }

    fn write_line(&mut self, tag: &str, message: &str) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => {
                writeln!(writer, "{tag}: {message}")?;
                writer.flush()
            }
            None => Ok(()),
        }
    }
}
