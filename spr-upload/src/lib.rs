//! SPR Upload Report Library
//!
//! Turns the files exported by a Biacore SPR run into a single workbook
//! ready for upload to the lab data-management system.
//!
//! # Architecture
//!
//! The library is a single-pass batch pipeline:
//! - Loads the run configuration (`[paths]` and `[meta]` TOML sections)
//! - Reads the report point workbook, the steady-state and sensorgram fit
//!   tables, and the two plot directories, each sorted into run order
//! - Extracts the binding response at each compound's top concentration
//! - Joins everything into one row per (compound, flow channel) and derives
//!   theoretical Rmax and percent binding
//! - Writes the upload workbook with two embedded plots per row
//!
//! The library does NOT:
//! - Read the compound set from the clipboard (callers pass it in)
//! - Keep any state between runs
//!
//! # Example Usage
//!
//! ```no_run
//! use spr_upload::{read_compound_set, ReportPipeline};
//! use std::path::Path;
//!
//! let pipeline = ReportPipeline::from_config_file(Path::new("config.toml")).unwrap();
//! let compounds = read_compound_set(Path::new("compounds.txt")).unwrap();
//!
//! let summary = pipeline.run(&compounds, Path::new("upload.xlsx")).unwrap();
//! println!("Wrote {} rows to {:?}", summary.rows, summary.output);
//! ```

// Public modules
pub mod config;
pub mod pipeline;
pub mod readers;
pub mod report;
pub mod types;

// Re-export main types for convenience
pub use config::{load_config, MetaConfig, PathsConfig, ReportConfig};
pub use pipeline::ReportPipeline;
pub use readers::read_compound_set;
pub use types::{
    AssembledRow, CompoundSetEntry, ImageKey, ImageRecord, Instrument, ReportError,
    ReportPointRecord, Result, RunSummary, SensorgramRecord, SteadyStateRecord, TopBinding,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
