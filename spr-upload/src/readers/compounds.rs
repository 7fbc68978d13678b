//! Compound-set manifest reader
//!
//! The manifest is usually copied out of a spreadsheet, so tab-delimited
//! text is the default. Files ending in `.csv` are read comma-delimited.

use crate::types::{CompoundSetEntry, ReportError, Result};
use std::collections::HashMap;
use std::path::Path;

pub const COL_BROAD_ID: &str = "Broad ID";
pub const COL_TEST_CONC: &str = "Test [Cpd] uM";
pub const COL_MW: &str = "MW";

/// Read the compound set, preserving manifest order
pub fn read_compound_set(path: &Path) -> Result<Vec<CompoundSetEntry>> {
    log::info!("Reading compound set: {:?}", path);

    if !path.is_file() {
        return Err(ReportError::FileNotFound(path.to_path_buf()));
    }

    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    let delimiter = if is_csv { b',' } else { b'\t' };

    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;
    let entries = parse_compound_set(reader)?;

    log::info!("Compound set has {} entries", entries.len());
    Ok(entries)
}

/// Parse compound-set rows from any delimited reader
pub fn parse_compound_set<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Vec<CompoundSetEntry>> {
    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
        .collect();

    let column = |name: &str| {
        columns.get(name).copied().ok_or_else(|| {
            ReportError::FileFormatError(format!("Compound set is missing column '{}'", name))
        })
    };
    let id_idx = column(COL_BROAD_ID)?;
    let conc_idx = column(COL_TEST_CONC)?;
    let mw_idx = column(COL_MW)?;

    let mut entries = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let broad_id = record.get(id_idx).unwrap_or("").trim();
        if broad_id.is_empty() {
            continue;
        }

        let number = |idx: usize, name: &str| -> Result<f64> {
            let text = record.get(idx).unwrap_or("").trim();
            text.parse().map_err(|_| {
                ReportError::FileFormatError(format!(
                    "Compound set line {}: '{}' is not a number: '{}'",
                    i + 2,
                    name,
                    text
                ))
            })
        };

        entries.push(CompoundSetEntry {
            broad_id: broad_id.to_string(),
            test_conc_um: number(conc_idx, COL_TEST_CONC)?,
            mw: number(mw_idx, COL_MW)?,
        });
    }

    Ok(entries)
}
