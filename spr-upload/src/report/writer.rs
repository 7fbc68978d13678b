//! Upload workbook writer
//!
//! Writes the assembled rows to a single `Sheet1` with the fixed upload
//! column layout, then embeds the steady-state and sensorgram plot of each
//! row in columns D and E. The workbook is built in memory and only hits
//! the disk once everything, images included, has been added.

use crate::types::{AssembledRow, Result};
use rust_xlsxwriter::{Format, FormatAlign, Image, Workbook};
use std::fs;
use std::path::Path;

pub const SHEET_NAME: &str = "Sheet1";

/// Upload columns A through AI, in order
pub const COLUMNS: [&str; 35] = [
    "BROAD_ID",
    "PROJECT_CODE",
    "CURVE_VALID",
    "STEADY_STATE_IMG",
    "1to1_IMG",
    "TOP_COMPOUND_UM",
    "RMAX_THEORETICAL",
    "RU_TOP_CMPD",
    "%_BINDING_TOP",
    "KD_SS_UM",
    "CHI2_SS_AFFINITY",
    "FITTED_RMAX_SS_AFFINITY",
    "KA_1_1_BINDING",
    "KD_LITTLE_1_1_BINDING",
    "KD_1_1_BINDING_UM",
    "chi2_1_1_binding",
    "U_VALUE_1_1_BINDING",
    "FITTED_RMAX_1_1_BINDING",
    "COMMENTS",
    "FC",
    "PROTEIN_RU",
    "PROTEIN_MW",
    "PROTEIN_ID",
    "MW",
    "INSTRUMENT",
    "EXP_DATE",
    "NUCLEOTIDE",
    "CHIP_LOT",
    "OPERATOR",
    "PROTOCOL_ID",
    "RAW_DATA_FILE",
    "DIR_FOLDER",
    "UNIQUE_ID",
    "SS_IMG_ID",
    "SENSO_IMG_ID",
];

/// Column holding the steady-state plot (D)
pub const SS_IMAGE_COLUMN: u16 = 3;
/// Column holding the sensorgram plot (E)
pub const SENSO_IMAGE_COLUMN: u16 = 4;

const COLUMN_WIDTH: f64 = 25.0;
const IMAGE_COLUMN_WIDTH: f64 = 58.0;
const IMAGE_ROW_HEIGHT: f64 = 235.0;

/// Value of one output cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Blank,
}

impl CellValue {
    fn text(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }

    fn optional_text(value: &Option<String>) -> Self {
        match value {
            Some(s) => CellValue::Text(s.clone()),
            None => CellValue::Blank,
        }
    }

    /// Missing and non-finite numbers are left blank
    fn number(value: f64) -> Self {
        if value.is_finite() {
            CellValue::Number(value)
        } else {
            CellValue::Blank
        }
    }

    fn optional_number(value: Option<f64>) -> Self {
        value.map_or(CellValue::Blank, CellValue::number)
    }
}

impl AssembledRow {
    /// Cell values in [`COLUMNS`] order
    pub fn cells(&self) -> [CellValue; 35] {
        [
            CellValue::text(&self.broad_id),
            CellValue::text(&self.project_code),
            CellValue::optional_text(&self.curve_valid),
            CellValue::Blank,
            CellValue::Blank,
            CellValue::number(self.top_compound_um),
            CellValue::optional_number(self.rmax_theoretical),
            CellValue::optional_number(self.ru_top_cmpd),
            CellValue::optional_number(self.percent_binding_top),
            CellValue::optional_number(self.kd_ss_um),
            CellValue::optional_number(self.chi2_ss_affinity),
            CellValue::optional_number(self.fitted_rmax_ss_affinity),
            CellValue::optional_number(self.ka_1_1_binding),
            CellValue::optional_number(self.kd_little_1_1_binding),
            CellValue::optional_number(self.kd_1_1_binding_um),
            CellValue::optional_number(self.chi2_1_1_binding),
            CellValue::optional_number(self.u_value_1_1_binding),
            CellValue::optional_number(self.fitted_rmax_1_1_binding),
            CellValue::optional_text(&self.comments),
            CellValue::text(&self.fc),
            CellValue::optional_number(self.protein_ru),
            CellValue::optional_number(self.protein_mw),
            CellValue::optional_text(&self.protein_id),
            CellValue::number(self.mw),
            CellValue::text(self.instrument.as_str()),
            CellValue::text(&self.exp_date),
            CellValue::text(&self.nucleotide),
            CellValue::text(&self.chip_lot),
            CellValue::text(&self.operator),
            CellValue::text(&self.protocol_id),
            CellValue::text(&self.raw_data_file),
            CellValue::text(&self.dir_folder),
            CellValue::text(&self.unique_id),
            CellValue::Text(self.ss_img.display().to_string()),
            CellValue::Text(self.senso_img.display().to_string()),
        ]
    }
}

/// Build the upload workbook in memory
///
/// Fails if any plot cannot be loaded; nothing is written in that case.
pub fn build_workbook(rows: &[AssembledRow]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    let cell_format = Format::new()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let header_format = cell_format.clone().set_bold();

    {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        for col in 0..COLUMNS.len() as u16 {
            let width = if col == SS_IMAGE_COLUMN || col == SENSO_IMAGE_COLUMN {
                IMAGE_COLUMN_WIDTH
            } else {
                COLUMN_WIDTH
            };
            worksheet.set_column_width(col, width)?;
            worksheet.set_column_format(col, &cell_format)?;
        }

        for (col, name) in COLUMNS.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *name, &header_format)?;
        }

        for (i, row) in rows.iter().enumerate() {
            let xl_row = i as u32 + 1;
            worksheet.set_row_height(xl_row, IMAGE_ROW_HEIGHT)?;

            for (col, cell) in row.cells().iter().enumerate() {
                let col = col as u16;
                match cell {
                    CellValue::Text(s) => {
                        worksheet.write_string_with_format(xl_row, col, s, &cell_format)?;
                    }
                    CellValue::Number(n) => {
                        worksheet.write_number_with_format(xl_row, col, *n, &cell_format)?;
                    }
                    CellValue::Blank => {
                        worksheet.write_blank(xl_row, col, &cell_format)?;
                    }
                }
            }

            log::trace!("Embedding plots for row {}: {:?}", xl_row, row.ss_img);
            let ss_image = Image::new(&row.ss_img)?;
            let senso_image = Image::new(&row.senso_img)?;
            worksheet.insert_image(xl_row, SS_IMAGE_COLUMN, &ss_image)?;
            worksheet.insert_image(xl_row, SENSO_IMAGE_COLUMN, &senso_image)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Write the upload workbook to `path`
pub fn write_report(path: &Path, rows: &[AssembledRow]) -> Result<()> {
    log::info!("Writing {} rows to {:?}", rows.len(), path);

    let buffer = build_workbook(rows)?;
    fs::write(path, buffer)?;

    log::info!("Upload workbook written: {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Instrument;
    use std::path::PathBuf;

    fn row() -> AssembledRow {
        AssembledRow {
            broad_id: "BRD-K70040629-001-01-9".into(),
            project_code: "PRJ1".into(),
            curve_valid: None,
            top_compound_um: 10.0,
            rmax_theoretical: Some(20.0),
            ru_top_cmpd: Some(15.0),
            percent_binding_top: Some(f64::NAN),
            kd_ss_um: Some(1.5),
            chi2_ss_affinity: Some(0.1),
            fitted_rmax_ss_affinity: Some(21.0),
            ka_1_1_binding: Some(1e5),
            kd_little_1_1_binding: Some(0.01),
            kd_1_1_binding_um: Some(0.1),
            chi2_1_1_binding: None,
            u_value_1_1_binding: None,
            fitted_rmax_1_1_binding: Some(19.0),
            comments: None,
            fc: "FC2-1Corr".into(),
            protein_ru: Some(2000.0),
            protein_mw: Some(50000.0),
            protein_id: Some("BIP-2".into()),
            mw: 500.0,
            instrument: Instrument::BiacoreS200,
            exp_date: "181029".into(),
            nucleotide: "GTP".into(),
            chip_lot: "LOT42".into(),
            operator: "jdoe".into(),
            protocol_id: "P-17".into(),
            raw_data_file: "run.blr".into(),
            dir_folder: "runs".into(),
            unique_id: "BRD-0629_4_FC2-1Corr_PRJ1_181029_1".into(),
            ss_img: PathBuf::from("ss/a.png"),
            senso_img: PathBuf::from("senso/a.png"),
        }
    }

    #[test]
    fn test_column_layout() {
        assert_eq!(COLUMNS[SS_IMAGE_COLUMN as usize], "STEADY_STATE_IMG");
        assert_eq!(COLUMNS[SENSO_IMAGE_COLUMN as usize], "1to1_IMG");
        assert_eq!(COLUMNS[34], "SENSO_IMG_ID");
    }

    #[test]
    fn test_cells_follow_columns() {
        fn col(name: &str) -> usize {
            COLUMNS.iter().position(|c| *c == name).unwrap()
        }
        let cells = row().cells();

        assert_eq!(cells[col("BROAD_ID")], CellValue::text("BRD-K70040629-001-01-9"));
        assert_eq!(cells[col("RMAX_THEORETICAL")], CellValue::Number(20.0));
        assert_eq!(cells[col("%_BINDING_TOP")], CellValue::Blank);
        assert_eq!(cells[col("chi2_1_1_binding")], CellValue::Blank);
        assert_eq!(cells[col("U_VALUE_1_1_BINDING")], CellValue::Blank);
        assert_eq!(cells[col("FC")], CellValue::text("FC2-1Corr"));
        assert_eq!(cells[col("INSTRUMENT")], CellValue::text("BiacoreS200"));
        assert_eq!(
            cells[col("SS_IMG_ID")],
            CellValue::Text(PathBuf::from("ss/a.png").display().to_string())
        );
    }

    #[test]
    fn test_missing_image_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.xlsx");

        let mut row = row();
        row.ss_img = dir.path().join("missing.png");
        row.senso_img = dir.path().join("missing.png");

        assert!(write_report(&out, &[row]).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_header_only_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty.xlsx");
        write_report(&out, &[]).unwrap();
        assert!(fs::metadata(&out).unwrap().len() > 0);
    }
}
