//! Configuration types for the DVS and mask-area pipelines.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::transforms::Calibration;

/// Column names and sheet rules for the DVS spreadsheet pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DvsConfig {
    /// Elapsed time column
    #[serde(default = "default_time_column")]
    pub time_column: String,

    /// Moisture content column
    #[serde(default = "default_moisture_column")]
    pub moisture_column: String,

    /// Humidity ramp direction column
    #[serde(default = "default_direction_column")]
    pub direction_column: String,

    /// Target partial pressure columns, probed in order
    #[serde(default = "default_pressure_columns")]
    pub pressure_columns: Vec<String>,

    /// Output name for time normalized per pressure step
    #[serde(default = "default_step_time_output")]
    pub step_time_output: String,

    /// Output name for moisture normalized per pressure step
    #[serde(default = "default_step_moisture_output")]
    pub step_moisture_output: String,

    /// Output name for time normalized per ramp direction
    #[serde(default = "default_ramp_time_output")]
    pub ramp_time_output: String,

    /// Sheets whose name matches this regex are left out
    #[serde(default = "default_placeholder_sheet_pattern")]
    pub placeholder_sheet_pattern: String,

    /// Optional log of skipped sheets
    #[serde(default)]
    pub skip_log: Option<PathBuf>,
}

fn default_time_column() -> String {
    "Time [minutes]".to_string()
}

fn default_moisture_column() -> String {
    "Moisture content %".to_string()
}

fn default_direction_column() -> String {
    "RH Direction".to_string()
}

fn default_pressure_columns() -> Vec<String> {
    vec![
        "Target Partial Pressure (Solvent A) [%]".to_string(),
        "Target Partial Pressure (Solvent B) [%]".to_string(),
    ]
}

fn default_step_time_output() -> String {
    "Normalised time (Individual RH Steps)".to_string()
}

fn default_step_moisture_output() -> String {
    "Normalised moisture content per RH step".to_string()
}

fn default_ramp_time_output() -> String {
    "Normalised time (up vs down RH ramps)".to_string()
}

fn default_placeholder_sheet_pattern() -> String {
    r"^Sheet\d+$".to_string()
}

impl Default for DvsConfig {
    fn default() -> Self {
        Self {
            time_column: default_time_column(),
            moisture_column: default_moisture_column(),
            direction_column: default_direction_column(),
            pressure_columns: default_pressure_columns(),
            step_time_output: default_step_time_output(),
            step_moisture_output: default_step_moisture_output(),
            ramp_time_output: default_ramp_time_output(),
            placeholder_sheet_pattern: default_placeholder_sheet_pattern(),
            skip_log: None,
        }
    }
}

/// Calibration and scan settings for the mask-area pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskConfig {
    /// Area of one pixel in mm²
    #[serde(default = "default_mm2_per_pixel")]
    pub mm2_per_pixel: f64,

    /// Multiplier from mm² to the reported area unit
    #[serde(default = "default_area_scale")]
    pub area_scale: f64,

    /// Mask image extension (matched case-insensitively)
    #[serde(default = "default_image_extension")]
    pub image_extension: String,

    /// Mask indices that are not particles (background, full frame)
    #[serde(default = "default_reserved_masks")]
    pub reserved_masks: Vec<u64>,

    /// Skip log written during CSV generation
    #[serde(default = "default_skip_log")]
    pub skip_log: PathBuf,
}

fn default_mm2_per_pixel() -> f64 {
    4.92843e-05
}

fn default_area_scale() -> f64 {
    1000.0
}

fn default_image_extension() -> String {
    "jpg".to_string()
}

fn default_reserved_masks() -> Vec<u64> {
    vec![0, 1]
}

fn default_skip_log() -> PathBuf {
    PathBuf::from("skipped_folders.log")
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            mm2_per_pixel: default_mm2_per_pixel(),
            area_scale: default_area_scale(),
            image_extension: default_image_extension(),
            reserved_masks: default_reserved_masks(),
            skip_log: default_skip_log(),
        }
    }
}

impl MaskConfig {
    /// Pixel calibration built from this config.
    pub fn calibration(&self) -> Calibration {
        Calibration {
            mm2_per_pixel: self.mm2_per_pixel,
            area_scale: self.area_scale,
        }
    }
}

/// Configuration for distribution plots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Plot width in pixels
    #[serde(default = "default_plot_width")]
    pub width: u32,

    /// Plot height in pixels
    #[serde(default = "default_plot_height")]
    pub height: u32,

    /// Marker radius in pixels
    #[serde(default = "default_point_radius")]
    pub point_radius: u32,

    /// Draw caption, axis descriptions and legend (needs a system font)
    #[serde(default = "default_draw_text")]
    pub draw_text: bool,
}

fn default_plot_width() -> u32 {
    1280
}

fn default_plot_height() -> u32 {
    960
}

fn default_point_radius() -> u32 {
    3
}

fn default_draw_text() -> bool {
    true
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_plot_width(),
            height: default_plot_height(),
            point_radius: default_point_radius(),
            draw_text: default_draw_text(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dvs: DvsConfig,

    #[serde(default)]
    pub mask: MaskConfig,

    #[serde(default)]
    pub plot: PlotConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
