//! Fit plot image listing
//!
//! The instrument software names every plot after the sample it belongs to:
//!
//! ```text
//! BRD-0629_4_181029_results_affinity_1.png
//! ^^^^^^^^ ^ ^^^^^^ ^^^^^^^ ^^^^^^^^ ^
//! compound | date                    image index
//!          sample order
//! ```
//!
//! Only the two numeric fields matter; they order the plots the same way
//! the fit tables are ordered.

use crate::types::{ImageKey, ImageRecord, ReportError, Result};
use std::fs;
use std::path::Path;

const SAMPLE_ORDER_FIELD: usize = 1;
const IMAGE_INDEX_FIELD: usize = 5;
const MIN_FIELDS: usize = 6;

/// Parse the (sample order, image index) key out of an image file name
pub fn parse_image_file_name(name: &str) -> Result<ImageKey> {
    let fields: Vec<&str> = name.split('_').collect();
    if fields.len() < MIN_FIELDS {
        return Err(bad_name(name, "too few '_' separated fields"));
    }

    let sample_order = fields[SAMPLE_ORDER_FIELD]
        .trim()
        .parse()
        .map_err(|_| bad_name(name, "sample order is not a number"))?;

    let image_index = strip_png(fields[IMAGE_INDEX_FIELD].trim())
        .parse()
        .map_err(|_| bad_name(name, "image index is not a number"))?;

    Ok(ImageKey {
        sample_order,
        image_index,
    })
}

fn strip_png(field: &str) -> &str {
    let split = field.len().saturating_sub(4);
    match (field.get(..split), field.get(split..)) {
        (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(".png") => stem,
        _ => field,
    }
}

fn bad_name(name: &str, reason: &str) -> ReportError {
    ReportError::FileFormatError(format!(
        "Image file name '{}' is malformed ({}); expected e.g. \
         BRD-0629_4_181029_results_affinity_1.png",
        name, reason
    ))
}

/// List every PNG in `dir`, ordered by (sample order, image index)
pub fn list_image_files(dir: &Path) -> Result<Vec<ImageRecord>> {
    log::info!("Scanning image directory: {:?}", dir);

    if !dir.is_dir() {
        return Err(ReportError::FileNotFound(dir.to_path_buf()));
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if !is_png || !path.is_file() {
            continue;
        }

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => {
                return Err(ReportError::FileFormatError(format!(
                    "Image file name is not valid UTF-8: {:?}",
                    path
                )))
            }
        };

        let key = parse_image_file_name(&file_name)?;
        records.push(ImageRecord {
            file_name,
            path,
            key,
        });
    }

    // read_dir order is platform dependent; fix it before the stable key sort
    records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    sort_images(&mut records);

    log::info!("Found {} images in {:?}", records.len(), dir);
    Ok(records)
}

/// Stable sort by sample order, then image index
pub fn sort_images(records: &mut [ImageRecord]) {
    records.sort_by_key(|r| r.key);
}
