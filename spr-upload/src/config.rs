//! Run configuration
//!
//! A run is described by a TOML file with two sections: `[paths]` for the
//! instrument exports and `[meta]` for the experiment metadata copied into
//! every report row. Scalar values may be written as strings or numbers,
//! so `experiment_date = 181029` and `experiment_date = "181029"` are the
//! same. Values with a leading zero must be quoted (`experiment_date =
//! "081029"`), since TOML integers cannot start with `0`.

use crate::report::assembler::{ProteinInfo, ProteinTable};
use crate::types::{Instrument, ReportError, Result};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};

/// Flow channels that can carry a protein (channel 1 is the reference)
pub const MAX_FLOW_CHANNELS: usize = 3;

/// Complete run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub paths: PathsConfig,
    pub meta: MetaConfig,
}

/// Locations of the instrument exports
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory of steady-state fit plots
    pub path_ss_img: PathBuf,
    /// Directory of sensorgram fit plots
    pub path_senso_img: PathBuf,
    /// Steady-state affinity text export
    pub path_ss_txt: PathBuf,
    /// Sensorgram fit text export
    pub path_senso_txt: PathBuf,
    /// Report point workbook
    pub path_report_pt: PathBuf,
    /// Where to write the upload workbook (CLI flag takes precedence)
    #[serde(default)]
    pub path_output: Option<PathBuf>,
}

/// Experiment metadata
#[derive(Debug, Clone, Deserialize)]
pub struct MetaConfig {
    #[serde(deserialize_with = "scalar_usize")]
    pub num_fc_used: usize,
    #[serde(deserialize_with = "scalar_string")]
    pub experiment_date: String,
    #[serde(deserialize_with = "scalar_string")]
    pub project_code: String,
    #[serde(deserialize_with = "scalar_string")]
    pub operator: String,
    #[serde(deserialize_with = "instrument")]
    pub instrument: Instrument,
    #[serde(deserialize_with = "scalar_string")]
    pub protocol: String,
    #[serde(deserialize_with = "scalar_string")]
    pub chip_lot: String,
    #[serde(deserialize_with = "scalar_string")]
    pub nucleotide: String,
    #[serde(deserialize_with = "scalar_string")]
    pub raw_data_filename: String,
    #[serde(deserialize_with = "scalar_string")]
    pub directory_folder: String,

    #[serde(rename = "fc2_protein_BIP", alias = "fc2_protein_bip", deserialize_with = "scalar_string")]
    pub fc2_protein_bip: String,
    #[serde(rename = "fc2_protein_RU", alias = "fc2_protein_ru", deserialize_with = "scalar_f64")]
    pub fc2_protein_ru: f64,
    #[serde(rename = "fc2_protein_MW", alias = "fc2_protein_mw", deserialize_with = "scalar_f64")]
    pub fc2_protein_mw: f64,

    #[serde(rename = "fc3_protein_BIP", alias = "fc3_protein_bip", deserialize_with = "scalar_string")]
    pub fc3_protein_bip: String,
    #[serde(rename = "fc3_protein_RU", alias = "fc3_protein_ru", deserialize_with = "scalar_f64")]
    pub fc3_protein_ru: f64,
    #[serde(rename = "fc3_protein_MW", alias = "fc3_protein_mw", deserialize_with = "scalar_f64")]
    pub fc3_protein_mw: f64,

    #[serde(rename = "fc4_protein_BIP", alias = "fc4_protein_bip", deserialize_with = "scalar_string")]
    pub fc4_protein_bip: String,
    #[serde(rename = "fc4_protein_RU", alias = "fc4_protein_ru", deserialize_with = "scalar_f64")]
    pub fc4_protein_ru: f64,
    #[serde(rename = "fc4_protein_MW", alias = "fc4_protein_mw", deserialize_with = "scalar_f64")]
    pub fc4_protein_mw: f64,
}

impl ReportConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReportConfig = toml::from_str(content)
            .map_err(|e| ReportError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let n = self.meta.num_fc_used;
        if n == 0 || n > MAX_FLOW_CHANNELS {
            return Err(ReportError::ConfigError(format!(
                "num_fc_used must be between 1 and {}, got {}",
                MAX_FLOW_CHANNELS, n
            )));
        }
        Ok(())
    }

    /// Protein metadata for flow channels 2, 3 and 4
    pub fn protein_table(&self) -> ProteinTable {
        let m = &self.meta;
        ProteinTable::new([
            (
                2,
                ProteinInfo {
                    bip: m.fc2_protein_bip.clone(),
                    ru: m.fc2_protein_ru,
                    mw: m.fc2_protein_mw,
                },
            ),
            (
                3,
                ProteinInfo {
                    bip: m.fc3_protein_bip.clone(),
                    ru: m.fc3_protein_ru,
                    mw: m.fc3_protein_mw,
                },
            ),
            (
                4,
                ProteinInfo {
                    bip: m.fc4_protein_bip.clone(),
                    ru: m.fc4_protein_ru,
                    mw: m.fc4_protein_mw,
                },
            ),
        ])
    }

    /// Every input path the pipeline reads, labelled by its config key
    pub fn input_paths(&self) -> [(&'static str, &Path); 5] {
        let p = &self.paths;
        [
            ("path_ss_img", p.path_ss_img.as_path()),
            ("path_senso_img", p.path_senso_img.as_path()),
            ("path_ss_txt", p.path_ss_txt.as_path()),
            ("path_senso_txt", p.path_senso_txt.as_path()),
            ("path_report_pt", p.path_report_pt.as_path()),
        ]
    }
}

/// Load the run configuration from a TOML file
pub fn load_config(path: &Path) -> Result<ReportConfig> {
    log::info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path).map_err(|e| {
        ReportError::ConfigError(format!("Failed to read config file {:?}: {}", path, e))
    })?;

    let config = ReportConfig::from_toml_str(&content)?;

    log::debug!(
        "Configuration loaded: instrument={}, flow channels={}",
        config.meta.instrument,
        config.meta.num_fc_used
    );
    Ok(config)
}

/// A TOML scalar that may stand in for a string or a number
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Scalar::deserialize(deserializer)?.into_string().trim().to_string())
}

fn scalar_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Int(i) => Ok(i as f64),
        Scalar::Float(f) => Ok(f),
        other => {
            let s = other.into_string();
            s.trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("expected a number, got '{}'", s)))
        }
    }
}

fn scalar_usize<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Scalar::deserialize(deserializer)?.into_string();
    s.trim()
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("expected a whole number, got '{}'", s)))
}

fn instrument<'de, D>(deserializer: D) -> std::result::Result<Instrument, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_string(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_toml(instrument: &str, num_fc: &str) -> String {
        format!(
            r#"
            [paths]
            path_ss_img = "ss_img"
            path_senso_img = "senso_img"
            path_ss_txt = "ss.txt"
            path_senso_txt = "senso.txt"
            path_report_pt = "report_points.xlsx"

            [meta]
            num_fc_used = {num_fc}
            experiment_date = 181029
            project_code = "PRJ1"
            operator = "jdoe"
            instrument = "{instrument}"
            protocol = "P-17"
            chip_lot = "LOT42"
            nucleotide = "GTP"
            raw_data_filename = "run.blr"
            directory_folder = "runs/181029"
            fc2_protein_BIP = "BIP-2"
            fc2_protein_RU = 2000
            fc2_protein_MW = "50000"
            fc3_protein_BIP = "BIP-3"
            fc3_protein_RU = 1500.5
            fc3_protein_MW = 42000
            fc4_protein_bip = "BIP-4"
            fc4_protein_ru = 1000
            fc4_protein_mw = 30000
            "#
        )
    }

    #[test]
    fn test_config_deserialization() {
        let config = ReportConfig::from_toml_str(&sample_toml("BiacoreS200", "3")).unwrap();

        assert_eq!(config.paths.path_report_pt, PathBuf::from("report_points.xlsx"));
        assert_eq!(config.paths.path_output, None);
        assert_eq!(config.meta.num_fc_used, 3);
        assert_eq!(config.meta.experiment_date, "181029");
        assert_eq!(config.meta.instrument, Instrument::BiacoreS200);
        assert_eq!(config.meta.fc2_protein_mw, 50000.0);
        assert_eq!(config.meta.fc3_protein_ru, 1500.5);
        assert_eq!(config.meta.fc4_protein_bip, "BIP-4");
    }

    #[test]
    fn test_leading_zero_date_must_be_quoted() {
        let quoted = sample_toml("Biacore1", "3")
            .replace("experiment_date = 181029", "experiment_date = \"081029\"");
        let config = ReportConfig::from_toml_str(&quoted).unwrap();
        assert_eq!(config.meta.experiment_date, "081029");

        let bare = sample_toml("Biacore1", "3")
            .replace("experiment_date = 181029", "experiment_date = 081029");
        let err = ReportConfig::from_toml_str(&bare).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_demo_config_parses() {
        let content = include_str!("../../demos/config.toml");
        let config = ReportConfig::from_toml_str(content).unwrap();
        assert_eq!(config.meta.experiment_date, "181029");
        assert_eq!(config.meta.instrument, Instrument::BiacoreS200);
    }

    #[test]
    fn test_string_number_for_fc_count() {
        let config = ReportConfig::from_toml_str(&sample_toml("Biacore1", "\"2\"")).unwrap();
        assert_eq!(config.meta.num_fc_used, 2);
    }

    #[test]
    fn test_unsupported_instrument() {
        let err = ReportConfig::from_toml_str(&sample_toml("Biacore3", "3")).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("Biacore3"));
    }

    #[test]
    fn test_fc_count_out_of_range() {
        let err = ReportConfig::from_toml_str(&sample_toml("Biacore2", "4")).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_missing_key() {
        let content = sample_toml("Biacore2", "3").replace("chip_lot = \"LOT42\"", "");
        let err = ReportConfig::from_toml_str(&content).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("chip_lot"));
    }

    #[test]
    fn test_non_numeric_protein_mw() {
        let content = sample_toml("Biacore2", "3").replace("\"50000\"", "\"fifty\"");
        let err = ReportConfig::from_toml_str(&content).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_protein_table_from_config() {
        let config = ReportConfig::from_toml_str(&sample_toml("Biacore1", "3")).unwrap();
        let table = config.protein_table();
        let fc3 = table.lookup("FC3-1Corr").unwrap();
        assert_eq!(fc3.bip, "BIP-3");
        assert_eq!(fc3.mw, 42000.0);
        assert!(table.lookup("FC5-1Corr").is_none());
    }
}
