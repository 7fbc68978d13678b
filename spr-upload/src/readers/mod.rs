//! Readers for the instrument exports and the compound manifest
//!
//! Each reader returns its records already sorted into run order, so the
//! assembler only has to line them up.

pub mod compounds;
pub mod fits;
pub mod images;
pub mod report_points;

// Re-export reader entry points
pub use compounds::read_compound_set;
pub use fits::{read_fit_table, FitRecord};
pub use images::{list_image_files, parse_image_file_name};
pub use report_points::{extract_top_binding, read_report_point_file};
