//! Command-line interface for the lab data pipelines.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::processors::{dvs, masks, BatchReport, ScanOptions};
use crate::visualization;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "labdata-pipeline")]
#[command(about = "DVS spreadsheet normalization and particle mask measurement", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add normalised time/moisture columns to every sheet of a DVS workbook
    Dvs {
        /// Source workbook (.xlsx, .xls, .ods or .csv)
        source: PathBuf,
        /// Output workbook (defaults to "<source> Updated.xlsx")
        destination: Option<PathBuf>,
    },

    /// Measure particle masks and write distribution CSVs
    MaskArea {
        /// Directory holding experiment subdirectories
        #[arg(default_value = "Data")]
        base_directory: PathBuf,
        /// Regenerate CSVs that already exist
        #[arg(long)]
        force_update: bool,
        /// Skip plotting after the CSVs are written
        #[arg(long)]
        no_plot: bool,
    },

    /// Plot the distribution CSVs of every experiment
    Plot {
        /// Directory holding experiment subdirectories
        #[arg(default_value = "Data")]
        base_directory: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Summary rows shared by the batch commands
fn report_items(report: &BatchReport) -> Vec<(&'static str, String)> {
    vec![
        ("Processed", report.processed().to_string()),
        ("Skipped", report.skipped().to_string()),
        ("Failed", report.failed().to_string()),
    ]
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Dvs {
            source,
            destination,
        } => {
            cmd_dvs(&source, destination, &config);
        }
        Commands::MaskArea {
            base_directory,
            force_update,
            no_plot,
        } => {
            cmd_mask_area(&base_directory, force_update, no_plot, &config);
        }
        Commands::Plot { base_directory } => {
            cmd_plot(&base_directory, &config);
        }
    }
}

fn cmd_dvs(source: &Path, destination: Option<PathBuf>, config: &PipelineConfig) {
    let start = Instant::now();

    let destination = destination.unwrap_or_else(|| dvs::default_destination(source));

    println!("Normalising DVS workbook...");
    println!("Source: {}", source.display());
    println!("Destination: {}", destination.display());

    let spinner = create_spinner("Processing sheets...");

    match dvs::process_workbook(source, &destination, &config.dvs) {
        Ok(run) => {
            spinner.finish_and_clear();

            let mut items = vec![("Source", source.display().to_string())];
            items.extend(report_items(&run.report));
            items.push((
                "Output",
                run.output
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "none (no sheet processed)".to_string()),
            ));
            items.push(("Duration", format!("{:.2?}", start.elapsed())));

            print_summary("DVS Normalisation Complete", &items);
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("DVS processing failed for {}: {:#}", source.display(), e);
            std::process::exit(1);
        }
    }
}

fn cmd_mask_area(base_directory: &Path, force_update: bool, no_plot: bool, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Measuring particle masks...");
    println!("Base directory: {}", base_directory.display());
    println!("Force update: {}", force_update);

    let options = ScanOptions {
        force_update,
        show_progress: true,
    };

    let report = match masks::create_csvs(base_directory, options, &config.mask) {
        Ok(report) => report,
        Err(e) => {
            error!("Mask measurement failed: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Some((unit, reason)) = report.failure() {
        let mut items = vec![("Base directory", base_directory.display().to_string())];
        items.extend(report_items(&report));
        items.push(("Skip log", config.mask.skip_log.display().to_string()));
        print_summary("Mask Area Stopped", &items);

        error!("Processing stopped at {}: {}", unit, reason);
        std::process::exit(1);
    }

    let plots = if no_plot {
        0
    } else {
        match visualization::plot_distributions(base_directory, &config.plot) {
            Ok(written) => written.len(),
            Err(e) => {
                error!("Plotting failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let mut items = vec![("Base directory", base_directory.display().to_string())];
    items.extend(report_items(&report));
    items.push(("Plots written", plots.to_string()));
    items.push(("Skip log", config.mask.skip_log.display().to_string()));
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("Mask Area Complete", &items);
}

fn cmd_plot(base_directory: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Plotting distributions...");
    println!("Base directory: {}", base_directory.display());

    let spinner = create_spinner("Drawing plots...");

    match visualization::plot_distributions(base_directory, &config.plot) {
        Ok(written) => {
            spinner.finish_and_clear();

            print_summary(
                "Plotting Complete",
                &[
                    ("Base directory", base_directory.display().to_string()),
                    ("Plots written", written.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Plotting failed: {}", e);
            std::process::exit(1);
        }
    }
}
