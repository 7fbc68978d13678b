//! Core types for the SPR upload report library
//!
//! This module defines the records that flow between the pipeline stages.
//! Every stage hands the next one an owned, already-sorted `Vec`; nothing
//! here is mutated after it has been produced.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result type for report operations
pub type Result<T> = std::result::Result<T, ReportError>;

/// Errors that can occur while building an upload report
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File format error: {0}")]
    FileFormatError(String),

    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("Alignment error: {0}")]
    AlignmentError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Delimited file error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Spreadsheet write error: {0}")]
    XlsxError(#[from] rust_xlsxwriter::XlsxError),
}

impl ReportError {
    /// True for problems with the run configuration rather than the data
    pub fn is_config_error(&self) -> bool {
        matches!(self, ReportError::ConfigError(_))
    }
}

/// One compound from the compound-set manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundSetEntry {
    /// Broad compound identifier (e.g. `BRD-K70040629-001-01-9`)
    pub broad_id: String,
    /// Top concentration tested, in µM
    pub test_conc_um: f64,
    /// Compound molecular weight
    pub mw: f64,
}

impl CompoundSetEntry {
    /// Short key used by the instrument sample labels (`BRD-0629`)
    ///
    /// Built from characters 9..13 of the identifier. Returns `None` when
    /// the identifier is too short to carry one.
    pub fn merge_key(&self) -> Option<String> {
        self.broad_id
            .get(9..13)
            .map(|digits| format!("BRD-{}", digits))
    }
}

/// Ordering key parsed from an image file name
///
/// Both numbers are 1-based. Deriving `Ord` gives the (sample_order,
/// image_index) lexicographic order used everywhere records are sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ImageKey {
    pub sample_order: u32,
    pub image_index: u32,
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sample_order, self.image_index)
    }
}

/// A fit plot found in one of the image directories
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// Bare file name (`BRD-0629_4_181029_results_affinity_1.png`)
    pub file_name: String,
    /// Full path of the file on disk
    pub path: PathBuf,
    pub key: ImageKey,
}

/// One row of the instrument's report point table
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPointRecord {
    pub cycle: u32,
    /// Raw flow-channel label (e.g. `2-1 corr`)
    pub flow_channel: String,
    /// Report point name (`binding`, `baseline`, ...)
    pub report_point: String,
    /// Time of the report point in seconds
    pub time_s: Option<f64>,
    /// Relative response in RU
    pub rel_resp: Option<f64>,
    pub assay_step: String,
    pub cycle_type: String,
    /// Sample concentration in µM
    pub concentration_um: Option<f64>,
    /// Sample label (e.g. `BRD-0629_4`)
    pub sample: String,
}

impl ReportPointRecord {
    /// Compound merge key: the first `_` segment of the sample label
    pub fn merge_key(&self) -> &str {
        self.sample.split('_').next().unwrap_or("")
    }

    /// Numeric sample order: the second `_` segment of the sample label
    pub fn sample_order(&self) -> Option<u32> {
        self.sample.split('_').nth(1)?.trim().parse().ok()
    }

    /// True when the channel carries reference-subtracted data (`2-1 corr`)
    pub fn is_corrected(&self) -> bool {
        self.flow_channel.split_whitespace().nth(1) == Some("corr")
    }
}

/// Binding response at the top concentration for one (compound, channel)
#[derive(Debug, Clone, PartialEq)]
pub struct TopBinding {
    pub cycle: u32,
    /// Raw flow-channel label from the report point table
    pub flow_channel: String,
    /// Normalized channel key shared with sensorgram curves (`2-1Corr`)
    pub channel_key: String,
    pub sample: String,
    pub sample_order: Option<u32>,
    /// Compound that matched on (merge key, concentration)
    pub broad_id: String,
    pub concentration_um: f64,
    /// Relative response at the top concentration, in RU
    pub rel_resp: Option<f64>,
}

/// One row of the steady-state affinity export
#[derive(Debug, Clone, PartialEq)]
pub struct SteadyStateRecord {
    pub image_file: String,
    pub key: ImageKey,
    pub sample: String,
    /// Affinity constant in M as exported
    pub kd_molar: Option<f64>,
    /// Affinity constant converted to µM
    pub kd_um: Option<f64>,
    pub chi2: Option<f64>,
    pub rmax: Option<f64>,
}

/// One row of the 1:1 sensorgram fit export
#[derive(Debug, Clone, PartialEq)]
pub struct SensorgramRecord {
    pub image_file: String,
    pub key: ImageKey,
    pub sample: String,
    /// Raw curve label (e.g. `Fc=2-1 corr`)
    pub curve: String,
    /// Association rate (1/Ms)
    pub ka: Option<f64>,
    /// Dissociation rate (1/s)
    pub kd_off: Option<f64>,
    pub kd_molar: Option<f64>,
    pub kd_um: Option<f64>,
    pub chi2: Option<f64>,
    pub rmax: Option<f64>,
}

/// Instrument that produced the report point export
///
/// The S200 and the T100/T200 software export different column sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Instrument {
    BiacoreS200,
    /// First T-series (T100/T200) instrument
    Biacore1,
    /// Second T-series (T100/T200) instrument
    Biacore2,
}

impl Instrument {
    /// Identifier as written in configuration files and the report
    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::BiacoreS200 => "BiacoreS200",
            Instrument::Biacore1 => "Biacore1",
            Instrument::Biacore2 => "Biacore2",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Instrument {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "BiacoreS200" => Ok(Instrument::BiacoreS200),
            "Biacore1" => Ok(Instrument::Biacore1),
            "Biacore2" => Ok(Instrument::Biacore2),
            other => Err(ReportError::ConfigError(format!(
                "Unsupported instrument '{}': must be BiacoreS200, Biacore1, or Biacore2",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Instrument {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// One output row: one (compound, flow channel) pair
///
/// Numeric fields are `None` when the source had no value. Derived values
/// that hit a zero denominator are NaN rather than `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledRow {
    pub broad_id: String,
    pub project_code: String,
    pub curve_valid: Option<String>,
    pub top_compound_um: f64,
    pub rmax_theoretical: Option<f64>,
    pub ru_top_cmpd: Option<f64>,
    pub percent_binding_top: Option<f64>,
    pub kd_ss_um: Option<f64>,
    pub chi2_ss_affinity: Option<f64>,
    pub fitted_rmax_ss_affinity: Option<f64>,
    pub ka_1_1_binding: Option<f64>,
    pub kd_little_1_1_binding: Option<f64>,
    pub kd_1_1_binding_um: Option<f64>,
    pub chi2_1_1_binding: Option<f64>,
    /// Never populated: the meaning of this column is unknown
    pub u_value_1_1_binding: Option<f64>,
    pub fitted_rmax_1_1_binding: Option<f64>,
    pub comments: Option<String>,
    /// Normalized channel label (`FC2-1Corr`)
    pub fc: String,
    pub protein_ru: Option<f64>,
    pub protein_mw: Option<f64>,
    pub protein_id: Option<String>,
    pub mw: f64,
    pub instrument: Instrument,
    pub exp_date: String,
    pub nucleotide: String,
    pub chip_lot: String,
    pub operator: String,
    pub protocol_id: String,
    pub raw_data_file: String,
    pub dir_folder: String,
    pub unique_id: String,
    /// Steady-state plot embedded in this row
    pub ss_img: PathBuf,
    /// Sensorgram plot embedded in this row
    pub senso_img: PathBuf,
}

/// Outcome of a completed pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub output: PathBuf,
    pub compounds: usize,
    pub flow_channels: usize,
    pub rows: usize,
    pub images_embedded: usize,
}

impl RunSummary {
    pub fn output(&self) -> &Path {
        &self.output
    }
}
