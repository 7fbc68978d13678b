//! Main pipeline API
//!
//! `ReportPipeline` is the entry point of the library. It owns a validated
//! configuration and runs the four stages in order:
//!
//! 1. configuration (already loaded when the pipeline is built)
//! 2. record alignment: read and sort every export
//! 3. assembly: join the records into report rows
//! 4. output: write the upload workbook
//!
//! Any error aborts the run before the output file is created.

use crate::config::{load_config, ReportConfig};
use crate::readers::{
    extract_top_binding, list_image_files, read_fit_table, read_report_point_file,
};
use crate::report::{assemble, write_report, AlignedInputs};
use crate::types::{
    AssembledRow, CompoundSetEntry, ReportError, Result, RunSummary, SensorgramRecord,
    SteadyStateRecord,
};
use std::path::Path;

/// The report pipeline for one instrument run
pub struct ReportPipeline {
    config: ReportConfig,
}

impl ReportPipeline {
    /// Create a pipeline from an already-validated configuration
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Load the configuration file and create a pipeline from it
    ///
    /// # Example
    /// ```no_run
    /// use spr_upload::ReportPipeline;
    /// use std::path::Path;
    ///
    /// let pipeline = ReportPipeline::from_config_file(Path::new("config.toml")).unwrap();
    /// println!("{} flow channels", pipeline.config().meta.num_fc_used);
    /// ```
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self::new(load_config(path)?))
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Fail with `FileNotFound` for the first configured input that is missing
    pub fn check_inputs(&self) -> Result<()> {
        for (key, path) in self.config.input_paths() {
            if !path.exists() {
                log::error!("Input '{}' does not exist: {:?}", key, path);
                return Err(ReportError::FileNotFound(path.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Read every export and sort it into run order
    pub fn align(&self, compounds: &[CompoundSetEntry]) -> Result<AlignedInputs> {
        self.check_inputs()?;
        let paths = &self.config.paths;

        let report_points = read_report_point_file(&paths.path_report_pt, self.config.meta.instrument)?;
        let top_binding = extract_top_binding(&report_points, compounds);

        let steady_state = read_fit_table::<SteadyStateRecord>(&paths.path_ss_txt)?;
        let sensorgram = read_fit_table::<SensorgramRecord>(&paths.path_senso_txt)?;

        let ss_images = list_image_files(&paths.path_ss_img)?;
        let senso_images = list_image_files(&paths.path_senso_img)?;

        Ok(AlignedInputs {
            compounds: compounds.to_vec(),
            top_binding,
            steady_state,
            sensorgram,
            ss_images,
            senso_images,
        })
    }

    /// Read, align and join everything into report rows
    pub fn assemble(&self, compounds: &[CompoundSetEntry]) -> Result<Vec<AssembledRow>> {
        let inputs = self.align(compounds)?;
        assemble(&inputs, &self.config.meta, &self.config.protein_table())
    }

    /// Run the whole pipeline and write the upload workbook to `output`
    pub fn run(&self, compounds: &[CompoundSetEntry], output: &Path) -> Result<RunSummary> {
        log::info!(
            "Building upload report for {} compounds on {} flow channel(s)",
            compounds.len(),
            self.config.meta.num_fc_used
        );

        let rows = self.assemble(compounds)?;
        write_report(output, &rows)?;

        Ok(RunSummary {
            output: output.to_path_buf(),
            compounds: compounds.len(),
            flow_channels: self.config.meta.num_fc_used,
            rows: rows.len(),
            images_embedded: rows.len() * 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_inputs() {
        let toml = crate::config::tests::sample_toml("Biacore1", "3");
        let pipeline = ReportPipeline::new(ReportConfig::from_toml_str(&toml).unwrap());

        let err = pipeline.check_inputs().unwrap_err();
        assert!(matches!(err, ReportError::FileNotFound(ref p) if p.ends_with("ss_img")));
    }

    #[test]
    fn test_missing_config_file() {
        let result = ReportPipeline::from_config_file(Path::new("missing.toml"));
        assert!(matches!(result, Err(ReportError::ConfigError(_))));
    }
}
