//! Machine-readable run summary

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spr_upload::RunSummary;
use std::fs;
use std::path::Path;

/// Run summary as written to the `--summary` file
#[derive(Debug, Serialize)]
pub struct SummaryFile<'a> {
    pub generated_at: DateTime<Utc>,
    pub tool_version: &'static str,
    pub library_version: &'static str,
    pub instrument: &'a str,
    #[serde(flatten)]
    pub run: &'a RunSummary,
}

impl<'a> SummaryFile<'a> {
    pub fn new(run: &'a RunSummary, instrument: &'a str) -> Self {
        Self {
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION"),
            library_version: spr_upload::VERSION,
            instrument,
            run,
        }
    }
}

/// Write the summary as pretty-printed JSON
pub fn write_summary(path: &Path, summary: &SummaryFile) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    fs::write(path, json).with_context(|| format!("Failed to write summary to {:?}", path))?;
    log::debug!("Run summary written to {:?}", path);
    Ok(())
}
