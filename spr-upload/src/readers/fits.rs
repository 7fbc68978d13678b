//! Steady-state and sensorgram fit table readers
//!
//! Both exports are tab-delimited text with one row per fitted curve. The
//! rows come out of the instrument software in no useful order, so each
//! table is re-sorted by the (sample order, image index) key embedded in
//! its `Image File` column.

use crate::readers::images::parse_image_file_name;
use crate::types::{ImageKey, ReportError, Result, SensorgramRecord, SteadyStateRecord};
use std::collections::HashMap;
use std::path::Path;

pub const COL_IMAGE_FILE: &str = "Image File";
pub const COL_SAMPLE: &str = "Sample";
pub const COL_KD: &str = "KD (M)";
pub const COL_CHI2: &str = "Chi² (RU²)";
pub const COL_RMAX: &str = "Rmax (RU)";
pub const COL_KA: &str = "ka (1/Ms)";
pub const COL_KD_OFF: &str = "kd (1/s)";
pub const COL_CURVE: &str = "Curve";

/// Molar to micromolar
const M_TO_UM: f64 = 1_000_000.0;

/// A single data row, addressable by column name
pub struct FitRow<'a> {
    line: usize,
    columns: &'a HashMap<String, usize>,
    record: &'a csv::StringRecord,
}

impl<'a> FitRow<'a> {
    /// Raw text of a column (empty if the row is short)
    pub fn text(&self, column: &str) -> Result<&'a str> {
        let idx = self.columns.get(column).ok_or_else(|| {
            ReportError::FileFormatError(format!("Missing column '{}'", column))
        })?;
        Ok(self.record.get(*idx).unwrap_or("").trim())
    }

    /// Numeric value of a column; blank cells are `None`
    pub fn number(&self, column: &str) -> Result<Option<f64>> {
        let text = self.text(column)?;
        if text.is_empty() {
            return Ok(None);
        }
        text.parse().map(Some).map_err(|_| {
            ReportError::FileFormatError(format!(
                "Line {}: column '{}' is not a number: '{}'",
                self.line, column, text
            ))
        })
    }

    /// Sort key parsed from the `Image File` column
    pub fn image_key(&self) -> Result<ImageKey> {
        parse_image_file_name(self.text(COL_IMAGE_FILE)?)
    }
}

/// A record type that can be read from a fit export
pub trait FitRecord: Sized {
    /// Human-readable name used in log and error messages
    const TABLE: &'static str;

    /// Columns that must be present in the header
    const REQUIRED_COLUMNS: &'static [&'static str];

    /// Build a record from one data row
    fn from_row(row: &FitRow<'_>) -> Result<Self>;

    /// Sort key shared with the image listing
    fn image_key(&self) -> ImageKey;
}

impl FitRecord for SteadyStateRecord {
    const TABLE: &'static str = "steady-state";
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &[COL_IMAGE_FILE, COL_SAMPLE, COL_KD, COL_CHI2, COL_RMAX];

    fn from_row(row: &FitRow<'_>) -> Result<Self> {
        let kd_molar = row.number(COL_KD)?;
        Ok(SteadyStateRecord {
            image_file: row.text(COL_IMAGE_FILE)?.to_string(),
            key: row.image_key()?,
            sample: row.text(COL_SAMPLE)?.to_string(),
            kd_molar,
            kd_um: kd_molar.map(|kd| kd * M_TO_UM),
            chi2: row.number(COL_CHI2)?,
            rmax: row.number(COL_RMAX)?,
        })
    }

    fn image_key(&self) -> ImageKey {
        self.key
    }
}

impl FitRecord for SensorgramRecord {
    const TABLE: &'static str = "sensorgram";
    const REQUIRED_COLUMNS: &'static [&'static str] = &[
        COL_IMAGE_FILE,
        COL_SAMPLE,
        COL_CURVE,
        COL_KA,
        COL_KD_OFF,
        COL_KD,
        COL_CHI2,
        COL_RMAX,
    ];

    fn from_row(row: &FitRow<'_>) -> Result<Self> {
        let kd_molar = row.number(COL_KD)?;
        Ok(SensorgramRecord {
            image_file: row.text(COL_IMAGE_FILE)?.to_string(),
            key: row.image_key()?,
            sample: row.text(COL_SAMPLE)?.to_string(),
            curve: row.text(COL_CURVE)?.to_string(),
            ka: row.number(COL_KA)?,
            kd_off: row.number(COL_KD_OFF)?,
            kd_molar,
            kd_um: kd_molar.map(|kd| kd * M_TO_UM),
            chi2: row.number(COL_CHI2)?,
            rmax: row.number(COL_RMAX)?,
        })
    }

    fn image_key(&self) -> ImageKey {
        self.key
    }
}

/// Read a fit export from disk, sorted by (sample order, image index)
pub fn read_fit_table<T: FitRecord>(path: &Path) -> Result<Vec<T>> {
    log::info!("Reading {} fit table: {:?}", T::TABLE, path);

    if !path.is_file() {
        return Err(ReportError::FileNotFound(path.to_path_buf()));
    }

    let reader = tab_reader().from_path(path)?;
    let records = parse_fit_table(reader)?;

    log::info!("Read {} {} fits from {:?}", records.len(), T::TABLE, path);
    Ok(records)
}

/// Parse fit rows from any reader, sorted by (sample order, image index)
pub fn parse_fit_table<T: FitRecord, R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Vec<T>> {
    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
        .collect();

    for required in T::REQUIRED_COLUMNS {
        if !columns.contains_key(*required) {
            return Err(ReportError::FileFormatError(format!(
                "{} fit table is missing column '{}'",
                T::TABLE,
                required
            )));
        }
    }

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let row = FitRow {
            line: i + 2,
            columns: &columns,
            record: &record,
        };
        records.push(T::from_row(&row)?);
    }

    records.sort_by_key(|r: &T| r.image_key());
    Ok(records)
}

fn tab_reader() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(b'\t').flexible(true);
    builder
}
