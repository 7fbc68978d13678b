//! Report assembly and workbook output

pub mod assembler;
pub mod writer;

// Re-export key types for convenience
pub use assembler::{assemble, AlignedInputs, ProteinInfo, ProteinTable};
pub use writer::{write_report, CellValue, COLUMNS};
