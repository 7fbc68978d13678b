//! Report point table reader and top-concentration extraction
//!
//! The report point export is a workbook with a `Report Point Table` sheet.
//! Three preamble rows precede the header on row 4. The header differs
//! between the S200 and the T100/T200 control software, and is checked
//! against the exact expected column list before any data row is read.
//!
//! ## Top-concentration extraction
//!
//! Every compound is injected at several concentrations, but the report
//! only carries the response at the top one. Joining the `binding` rows
//! with the compound set on (merge key, concentration) keeps exactly the
//! top-concentration row of each compound, since the manifest only lists
//! the top concentration.

use crate::report::assembler::channel_key;
use crate::types::{
    CompoundSetEntry, Instrument, ReportError, ReportPointRecord, Result, TopBinding,
};
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashSet;
use std::path::Path;

pub const REPORT_POINT_SHEET: &str = "Report Point Table";

/// Zero-based row index of the header in the report point sheet
pub const HEADER_ROW: u32 = 3;

const BINDING_REPORT_POINT: &str = "binding";
const EXCLUDED_ASSAY_STEPS: [&str; 2] = ["Startup", "Solvent correction"];

/// Exported by the S200 software; the first column has no header
const S200_COLUMNS: [&str; 23] = [
    "",
    "Cycle",
    "Fc",
    "Report Point",
    "Time [s]",
    "Window [s]",
    "AbsResp [RU]",
    "SD",
    "Slope [RU/s]",
    "LRSD",
    "RelResp [RU]",
    "Baseline",
    "AssayStep",
    "Assay Step Purpose",
    "Buffer",
    "Cycle Type",
    "Temp",
    "Sample_1_Barcode",
    "Sample_1_Conc [µM]",
    "Sample_1_Ligand",
    "Sample_1_MW [Da]",
    "Sample_1_Sample",
    "General_1_Solution",
];

/// Exported by the T100 and T200 software
const T_SERIES_COLUMNS: [&str; 21] = [
    "Cycle",
    "Fc",
    "Time",
    "Window",
    "AbsResp",
    "SD",
    "Slope",
    "LRSD",
    "Baseline",
    "RelResp",
    "Report Point",
    "AssayStep",
    "AssayStepPurpose",
    "Buffer",
    "CycleType",
    "Temp",
    "Sample_1_Sample",
    "Sample_1_Ligand",
    "Sample_1_Conc",
    "Sample_1_MW",
    "General_1_Solution",
];

/// Names of the columns the extraction reads, per instrument
struct ColumnNames {
    cycle: &'static str,
    fc: &'static str,
    report_point: &'static str,
    time: &'static str,
    rel_resp: &'static str,
    assay_step: &'static str,
    cycle_type: &'static str,
    conc: &'static str,
    sample: &'static str,
}

const S200_NAMES: ColumnNames = ColumnNames {
    cycle: "Cycle",
    fc: "Fc",
    report_point: "Report Point",
    time: "Time [s]",
    rel_resp: "RelResp [RU]",
    assay_step: "AssayStep",
    cycle_type: "Cycle Type",
    conc: "Sample_1_Conc [µM]",
    sample: "Sample_1_Sample",
};

const T_SERIES_NAMES: ColumnNames = ColumnNames {
    cycle: "Cycle",
    fc: "Fc",
    report_point: "Report Point",
    time: "Time",
    rel_resp: "RelResp",
    assay_step: "AssayStep",
    cycle_type: "CycleType",
    conc: "Sample_1_Conc",
    sample: "Sample_1_Sample",
};

impl Instrument {
    /// Exact header the instrument writes to the report point sheet
    pub fn expected_report_point_columns(&self) -> &'static [&'static str] {
        match self {
            Instrument::BiacoreS200 => &S200_COLUMNS,
            Instrument::Biacore1 | Instrument::Biacore2 => &T_SERIES_COLUMNS,
        }
    }

    fn report_point_names(&self) -> &'static ColumnNames {
        match self {
            Instrument::BiacoreS200 => &S200_NAMES,
            Instrument::Biacore1 | Instrument::Biacore2 => &T_SERIES_NAMES,
        }
    }
}

/// Read the report point workbook exported by `instrument`
pub fn read_report_point_file(path: &Path, instrument: Instrument) -> Result<Vec<ReportPointRecord>> {
    log::info!("Reading report point file ({}): {:?}", instrument, path);

    if !path.is_file() {
        return Err(ReportError::FileNotFound(path.to_path_buf()));
    }

    let mut workbook = open_workbook_auto(path).map_err(|e| {
        ReportError::FileFormatError(format!("Failed to open workbook {:?}: {}", path, e))
    })?;

    if !workbook.sheet_names().iter().any(|name| name == REPORT_POINT_SHEET) {
        return Err(ReportError::FileFormatError(format!(
            "Workbook {:?} has no '{}' sheet",
            path, REPORT_POINT_SHEET
        )));
    }

    let range = workbook.worksheet_range(REPORT_POINT_SHEET).map_err(|e| {
        ReportError::FileFormatError(format!("Failed to read '{}': {}", REPORT_POINT_SHEET, e))
    })?;

    // The used range starts at the first non-empty cell, not at A1
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut header = None;
    let mut rows = Vec::new();
    for (i, cells) in range.rows().enumerate() {
        let row_idx = start_row + i as u32;
        if row_idx < HEADER_ROW {
            continue;
        }
        let mut text: Vec<String> = vec![String::new(); start_col as usize];
        text.extend(cells.iter().map(cell_text));
        if row_idx == HEADER_ROW {
            header = Some(text);
        } else {
            rows.push(text);
        }
    }

    let header = header.ok_or_else(|| {
        ReportError::FileFormatError(format!(
            "'{}' has no header on row {}",
            REPORT_POINT_SHEET,
            HEADER_ROW + 1
        ))
    })?;

    let records = parse_report_point_rows(&header, &rows, instrument)?;
    log::info!("Read {} report points from {:?}", records.len(), path);
    Ok(records)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Validate the header and convert text rows into records
///
/// The header must match the instrument's column list exactly (trailing
/// blank cells aside); nothing is parsed when it does not.
pub fn parse_report_point_rows(
    header: &[String],
    rows: &[Vec<String>],
    instrument: Instrument,
) -> Result<Vec<ReportPointRecord>> {
    let expected = instrument.expected_report_point_columns();
    let used = header
        .iter()
        .rposition(|h| !h.trim().is_empty())
        .map_or(0, |last| last + 1);
    let header = &header[..used];

    if header.len() != expected.len() || header.iter().zip(expected).any(|(h, e)| h.trim() != *e) {
        let first_diff = header
            .iter()
            .map(|h| h.trim())
            .zip(expected.iter().copied())
            .position(|(h, e)| h != e)
            .unwrap_or_else(|| header.len().min(expected.len()));
        return Err(ReportError::FileFormatError(format!(
            "The columns in the report point file do not match the expected {} layout \
             (first difference at column {}: found {:?}, expected {:?})",
            instrument,
            first_diff + 1,
            header.get(first_diff).map(|h| h.trim()),
            expected.get(first_diff),
        )));
    }

    let names = instrument.report_point_names();
    let position = |name: &str| expected.iter().position(|e| *e == name).unwrap_or(0);
    let idx_cycle = position(names.cycle);
    let idx_fc = position(names.fc);
    let idx_report_point = position(names.report_point);
    let idx_time = position(names.time);
    let idx_rel_resp = position(names.rel_resp);
    let idx_assay_step = position(names.assay_step);
    let idx_cycle_type = position(names.cycle_type);
    let idx_conc = position(names.conc);
    let idx_sample = position(names.sample);

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let line = HEADER_ROW as usize + i + 2;
        let text = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or("");
        let number = |idx: usize, column: &str| -> Result<Option<f64>> {
            let value = text(idx);
            if value.is_empty() {
                return Ok(None);
            }
            value.parse().map(Some).map_err(|_| {
                ReportError::FileFormatError(format!(
                    "Report point row {}: '{}' is not a number: '{}'",
                    line, column, value
                ))
            })
        };

        let cycle = number(idx_cycle, names.cycle)?
            .filter(|c| c.fract() == 0.0 && *c >= 0.0)
            .ok_or_else(|| {
                ReportError::FileFormatError(format!(
                    "Report point row {}: invalid cycle '{}'",
                    line,
                    text(idx_cycle)
                ))
            })? as u32;

        records.push(ReportPointRecord {
            cycle,
            flow_channel: text(idx_fc).to_string(),
            report_point: text(idx_report_point).to_string(),
            time_s: number(idx_time, names.time)?,
            rel_resp: number(idx_rel_resp, names.rel_resp)?,
            assay_step: text(idx_assay_step).to_string(),
            cycle_type: text(idx_cycle_type).to_string(),
            concentration_um: number(idx_conc, names.conc)?,
            sample: text(idx_sample).to_string(),
        });
    }

    Ok(records)
}

fn concentrations_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Binding response at the top tested concentration, in run order
///
/// Keeps reference-subtracted `binding` report points of sample cycles
/// whose (merge key, concentration) matches a compound-set entry, collapses
/// repeated (channel, sample) pairs to their first occurrence, and sorts
/// by (cycle, sample order).
pub fn extract_top_binding(
    records: &[ReportPointRecord],
    compounds: &[CompoundSetEntry],
) -> Vec<TopBinding> {
    let keyed: Vec<(String, &CompoundSetEntry)> = compounds
        .iter()
        .filter_map(|c| c.merge_key().map(|key| (key, c)))
        .collect();

    let mut seen = HashSet::new();
    let mut top: Vec<TopBinding> = Vec::new();

    for rec in records {
        if rec.report_point != BINDING_REPORT_POINT
            || EXCLUDED_ASSAY_STEPS.contains(&rec.assay_step.as_str())
        {
            continue;
        }

        let conc = match rec.concentration_um {
            Some(conc) => conc,
            None => continue,
        };
        let compound = keyed
            .iter()
            .find(|(key, c)| key == rec.merge_key() && concentrations_match(c.test_conc_um, conc));
        let compound = match compound {
            Some((_, c)) => c,
            None => continue,
        };

        if !rec.is_corrected() {
            continue;
        }

        if !seen.insert((rec.flow_channel.clone(), rec.sample.clone())) {
            log::debug!(
                "Dropping repeated run of {} on {} (cycle {})",
                rec.sample,
                rec.flow_channel,
                rec.cycle
            );
            continue;
        }

        log::trace!(
            "Top binding: cycle {} {} {} = {:?} RU",
            rec.cycle,
            rec.flow_channel,
            rec.sample,
            rec.rel_resp
        );
        top.push(TopBinding {
            cycle: rec.cycle,
            flow_channel: rec.flow_channel.clone(),
            channel_key: channel_key(&rec.flow_channel),
            sample: rec.sample.clone(),
            sample_order: rec.sample_order(),
            broad_id: compound.broad_id.clone(),
            concentration_um: conc,
            rel_resp: rec.rel_resp,
        });
    }

    top.sort_by_key(|t| (t.cycle, t.sample_order.unwrap_or(u32::MAX)));

    log::info!("Extracted {} top-concentration binding responses", top.len());
    top
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compound(id: &str, conc: f64) -> CompoundSetEntry {
        CompoundSetEntry {
            broad_id: id.to_string(),
            test_conc_um: conc,
            mw: 500.0,
        }
    }

    fn point(cycle: u32, fc: &str, sample: &str, conc: f64, resp: f64) -> ReportPointRecord {
        ReportPointRecord {
            cycle,
            flow_channel: fc.to_string(),
            report_point: "binding".to_string(),
            time_s: Some(60.0),
            rel_resp: Some(resp),
            assay_step: "Sample".to_string(),
            cycle_type: "Sample".to_string(),
            concentration_um: Some(conc),
            sample: sample.to_string(),
        }
    }

    fn t_series_header() -> Vec<String> {
        T_SERIES_COLUMNS.iter().map(|s| s.to_string()).collect()
    }

    fn t_series_row(cycle: &str, fc: &str, report_point: &str, resp: &str, sample: &str, conc: &str) -> Vec<String> {
        let mut row = vec![String::new(); T_SERIES_COLUMNS.len()];
        row[0] = cycle.to_string();
        row[1] = fc.to_string();
        row[2] = "60".to_string();
        row[9] = resp.to_string();
        row[10] = report_point.to_string();
        row[11] = "Sample".to_string();
        row[14] = "Sample".to_string();
        row[16] = sample.to_string();
        row[18] = conc.to_string();
        row
    }

    #[test]
    fn test_only_top_concentration_kept() {
        let compounds = vec![compound("BRD-K70040629-001-01-9", 10.0)];
        let mut records = Vec::new();
        for (cycle, conc) in [(3, 0.1), (4, 1.0), (5, 10.0)] {
            records.push(point(cycle, "2-1 corr", "BRD-0629_4", conc, conc * 2.0));
            records.push(point(cycle, "2", "BRD-0629_4", conc, 100.0));
        }
        let mut baseline = point(5, "2-1 corr", "BRD-0629_4", 10.0, 1.0);
        baseline.report_point = "baseline".to_string();
        records.push(baseline);

        let top = extract_top_binding(&records, &compounds);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].cycle, 5);
        assert_eq!(top[0].rel_resp, Some(20.0));
        assert_eq!(top[0].channel_key, "2-1Corr");
        assert_eq!(top[0].broad_id, "BRD-K70040629-001-01-9");
    }

    #[test]
    fn test_duplicate_runs_collapse_to_first() {
        let compounds = vec![compound("BRD-K70040629-001-01-9", 10.0)];
        let records = vec![
            point(5, "2-1 corr", "BRD-0629_4", 10.0, 11.0),
            point(9, "2-1 corr", "BRD-0629_4", 10.0, 99.0),
            point(5, "3-1 corr", "BRD-0629_4", 10.0, 12.0),
        ];

        let top = extract_top_binding(&records, &compounds);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].rel_resp, Some(11.0));
        assert_eq!(top[1].rel_resp, Some(12.0));
    }

    #[test]
    fn test_startup_and_solvent_cycles_skipped() {
        let compounds = vec![compound("BRD-K70040629-001-01-9", 10.0)];
        let mut startup = point(1, "2-1 corr", "BRD-0629_4", 10.0, 1.0);
        startup.assay_step = "Startup".to_string();
        let mut solvent = point(2, "2-1 corr", "BRD-0629_4", 10.0, 2.0);
        solvent.assay_step = "Solvent correction".to_string();

        assert!(extract_top_binding(&[startup, solvent], &compounds).is_empty());
    }

    #[test]
    fn test_sorted_by_cycle_then_numeric_sample_order() {
        let compounds = vec![
            compound("BRD-K00000010-001-01-1", 10.0),
            compound("BRD-K00000002-001-01-1", 10.0),
            compound("BRD-K00000003-001-01-1", 10.0),
        ];
        let records = vec![
            point(7, "2-1 corr", "BRD-0003_3", 10.0, 3.0),
            point(6, "2-1 corr", "BRD-0010_10", 10.0, 10.0),
            point(6, "2-1 corr", "BRD-0002_2", 10.0, 2.0),
        ];

        let top = extract_top_binding(&records, &compounds);
        let samples: Vec<&str> = top.iter().map(|t| t.sample.as_str()).collect();
        assert_eq!(samples, vec!["BRD-0002_2", "BRD-0010_10", "BRD-0003_3"]);
    }

    #[test]
    fn test_parse_t_series_rows() {
        let rows = vec![
            t_series_row("5", "2-1 corr", "binding", "15.5", "BRD-0629_4", "10"),
            vec![String::new(); 3],
        ];
        let records = parse_report_point_rows(&t_series_header(), &rows, Instrument::Biacore1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cycle, 5);
        assert_eq!(records[0].rel_resp, Some(15.5));
        assert_eq!(records[0].concentration_um, Some(10.0));
        assert_eq!(records[0].sample, "BRD-0629_4");
        assert_eq!(records[0].time_s, Some(60.0));
    }

    #[test]
    fn test_trailing_blank_header_cells_ignored() {
        let mut header = t_series_header();
        header.push(String::new());
        assert!(parse_report_point_rows(&header, &[], Instrument::Biacore2).is_ok());
    }

    #[test]
    fn test_renamed_column_rejected_before_rows() {
        let mut header = t_series_header();
        header[9] = "Relative Response".to_string();
        // The row would fail to parse; the header check must fire first
        let rows = vec![t_series_row("not a cycle", "2-1 corr", "binding", "x", "s", "y")];

        let err = parse_report_point_rows(&header, &rows, Instrument::Biacore1).unwrap_err();
        match err {
            ReportError::FileFormatError(msg) => assert!(msg.contains("column 10")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_s200_header_expected_for_s200_only() {
        let header = t_series_header();
        assert!(parse_report_point_rows(&header, &[], Instrument::BiacoreS200).is_err());

        let s200: Vec<String> = S200_COLUMNS.iter().map(|s| s.to_string()).collect();
        assert!(parse_report_point_rows(&s200, &[], Instrument::BiacoreS200).is_ok());
    }

    #[test]
    fn test_invalid_cycle() {
        let rows = vec![t_series_row("1.5", "2-1 corr", "binding", "1", "BRD-0629_4", "10")];
        let err = parse_report_point_rows(&t_series_header(), &rows, Instrument::Biacore1).unwrap_err();
        assert!(err.to_string().contains("invalid cycle"));
    }

    #[test]
    fn test_missing_file() {
        let err = read_report_point_file(Path::new("missing.xlsx"), Instrument::Biacore1).unwrap_err();
        assert!(matches!(err, ReportError::FileNotFound(_)));
    }
}
