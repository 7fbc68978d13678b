//! Report assembly
//!
//! Builds one output row per (compound, flow channel). The sorted
//! sensorgram table is the spine of the report: every other source is
//! joined onto it by a shared key where one exists, and only falls back to
//! position when the keys do not line up but the row counts do.
//!
//! | source              | join key                         |
//! |---------------------|----------------------------------|
//! | steady-state fits   | image file name                  |
//! | top binding         | (sample label, channel key)      |
//! | steady-state images | steady-state image file name     |
//! | sensorgram images   | sensorgram image file name       |
//! | compound set        | merge key of the sample label    |

use crate::config::MetaConfig;
use crate::types::{
    AssembledRow, CompoundSetEntry, ImageRecord, ReportError, Result, SensorgramRecord,
    SteadyStateRecord, TopBinding,
};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

/// Repeat every value `times` times in a row, keeping the original order
///
/// Lines up a per-compound value with each of that compound's per-channel
/// rows: `[a, b]` with 3 channels becomes `[a, a, a, b, b, b]`.
pub fn replicate<T: Clone>(values: &[T], times: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len() * times);
    for value in values {
        out.extend(std::iter::repeat(value).take(times).cloned());
    }
    out
}

/// Canonical channel label: `Fc=2-1 corr` becomes `FC2-1Corr`
pub fn normalize_curve_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '=' && !c.is_whitespace())
        .map(|c| if c == 'c' { 'C' } else { c })
        .collect()
}

/// Channel key shared by sensorgram curves and report point channels
///
/// The sensorgram export writes `Fc=2-1 corr` and the report point table
/// writes `2-1 corr`; both give `2-1Corr`.
pub fn channel_key(raw: &str) -> String {
    let normalized = normalize_curve_label(raw);
    match normalized.strip_prefix("FC") {
        Some(rest) => rest.to_string(),
        None => normalized,
    }
}

/// Round to two decimals, ties to even
///
/// Scales by 100 first, so `0.125` gives `0.12` and `0.375` gives `0.38`.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Theoretical maximum response of a compound on a protein surface
pub fn rmax_theoretical(compound_mw: f64, protein_mw: f64, protein_ru: f64) -> f64 {
    round2(compound_mw / protein_mw * protein_ru)
}

/// Percent of the theoretical maximum reached at the top concentration
///
/// NaN when the theoretical maximum is zero or not finite.
pub fn percent_binding(ru_top: f64, rmax_theoretical: f64) -> f64 {
    if rmax_theoretical == 0.0 || !rmax_theoretical.is_finite() {
        return f64::NAN;
    }
    round2(ru_top / rmax_theoretical * 100.0)
}

/// Upload identifier: `{sample}_{fc}_{project}_{date}_{image index}`
pub fn unique_id(sample: &str, fc: &str, project_code: &str, experiment_date: &str, image_index: u32) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        sample, fc, project_code, experiment_date, image_index
    )
}

/// Protein immobilized on one flow channel
#[derive(Debug, Clone, PartialEq)]
pub struct ProteinInfo {
    /// Protein registration identifier
    pub bip: String,
    /// Immobilization level in RU
    pub ru: f64,
    pub mw: f64,
}

/// Protein metadata keyed by normalized channel label (`FC2-1Corr`)
#[derive(Debug, Clone, Default)]
pub struct ProteinTable {
    channels: HashMap<String, ProteinInfo>,
}

impl ProteinTable {
    /// Build from (flow channel number, protein) pairs; channel 1 is the reference
    pub fn new(channels: impl IntoIterator<Item = (u8, ProteinInfo)>) -> Self {
        Self {
            channels: channels
                .into_iter()
                .map(|(fc, info)| (format!("FC{}-1Corr", fc), info))
                .collect(),
        }
    }

    /// Unknown labels have no metadata
    pub fn lookup(&self, label: &str) -> Option<&ProteinInfo> {
        self.channels.get(label)
    }
}

/// Every source the assembler needs, each already in run order
#[derive(Debug, Clone, Default)]
pub struct AlignedInputs {
    pub compounds: Vec<CompoundSetEntry>,
    pub top_binding: Vec<TopBinding>,
    pub steady_state: Vec<SteadyStateRecord>,
    pub sensorgram: Vec<SensorgramRecord>,
    pub ss_images: Vec<ImageRecord>,
    pub senso_images: Vec<ImageRecord>,
}

/// Line `records` up with `spine`, by key where possible
///
/// Each spine row takes the next unused record with its key. Spine rows
/// whose key matches nothing are filled, in order, with the records no
/// key claimed; the two counts must agree.
fn align_to_spine<'a, T, K, F>(
    source: &str,
    spine: &[K],
    records: &'a [T],
    key_of: F,
) -> Result<Vec<&'a T>>
where
    K: Eq + Hash + Debug,
    F: Fn(&'a T) -> K,
{
    let mut by_key: HashMap<K, VecDeque<usize>> = HashMap::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        by_key.entry(key_of(record)).or_default().push_back(idx);
    }

    let mut claimed = vec![false; records.len()];
    let slots: Vec<Option<usize>> = spine
        .iter()
        .map(|key| {
            let idx = by_key.get_mut(key).and_then(|queue| queue.pop_front());
            if let Some(idx) = idx {
                claimed[idx] = true;
            }
            idx
        })
        .collect();

    let unmatched: Vec<&K> = spine
        .iter()
        .zip(&slots)
        .filter(|(_, slot)| slot.is_none())
        .map(|(key, _)| key)
        .collect();
    if unmatched.is_empty() {
        log::debug!("{}: joined {} rows by key", source, slots.len());
        return Ok(slots.into_iter().flatten().map(|idx| &records[idx]).collect());
    }

    let leftover: Vec<usize> = (0..records.len()).filter(|idx| !claimed[*idx]).collect();
    if leftover.len() != unmatched.len() {
        return Err(ReportError::AlignmentError(format!(
            "{}: {} report rows have no matching key (first: {:?}) but {} records are left to place",
            source,
            unmatched.len(),
            unmatched[0],
            leftover.len()
        )));
    }

    log::warn!(
        "{}: {} of {} rows have no matching key (first: {:?}); placing them by position",
        source,
        unmatched.len(),
        spine.len(),
        unmatched[0]
    );
    let mut leftover = leftover.into_iter();
    Ok(slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| leftover.next()))
        .map(|idx| &records[idx])
        .collect())
}

/// Join all sources into report rows
///
/// The sensorgram table must hold exactly one fit per (compound, channel);
/// anything else is an alignment error. A compound with a merge key is
/// only ever reported against samples carrying that key; compounds
/// without one (controls) take the leftover rows by position.
pub fn assemble(
    inputs: &AlignedInputs,
    meta: &MetaConfig,
    proteins: &ProteinTable,
) -> Result<Vec<AssembledRow>> {
    let num_fc = meta.num_fc_used;
    let expected = inputs.compounds.len() * num_fc;
    let spine = &inputs.sensorgram;

    if spine.len() != expected {
        return Err(ReportError::AlignmentError(format!(
            "{} compounds x {} flow channels needs {} sensorgram fits, found {}",
            inputs.compounds.len(),
            num_fc,
            expected,
            spine.len()
        )));
    }

    let fit_files: Vec<String> = spine.iter().map(|s| s.image_file.clone()).collect();
    let steady_state = align_to_spine("steady-state fits", &fit_files, &inputs.steady_state, |r| {
        r.image_file.clone()
    })?;

    let binding_keys: Vec<(String, String)> = spine
        .iter()
        .map(|s| (s.sample.clone(), channel_key(&s.curve)))
        .collect();
    let top_binding = align_to_spine("top binding", &binding_keys, &inputs.top_binding, |t| {
        (t.sample.clone(), t.channel_key.clone())
    })?;

    let ss_files: Vec<String> = steady_state.iter().map(|r| r.image_file.clone()).collect();
    let ss_images = align_to_spine("steady-state images", &ss_files, &inputs.ss_images, |i| {
        i.file_name.clone()
    })?;
    let senso_images = align_to_spine("sensorgram images", &fit_files, &inputs.senso_images, |i| {
        i.file_name.clone()
    })?;

    let replicated = replicate(&inputs.compounds, num_fc);
    let sample_keys: Vec<Option<String>> = spine
        .iter()
        .map(|s| s.sample.split('_').next().map(str::to_string))
        .collect();
    let compounds = align_to_spine("compound set", &sample_keys, &replicated, |c| c.merge_key())?;

    let mut rows = Vec::with_capacity(expected);
    for (i, senso) in spine.iter().enumerate() {
        let compound = compounds[i];
        let ss = steady_state[i];
        let top = top_binding[i];

        match compound.merge_key() {
            Some(key) if Some(key.as_str()) != sample_keys[i].as_deref() => {
                return Err(ReportError::AlignmentError(format!(
                    "Row {}: compound {} cannot be reported against sample {}",
                    i + 1,
                    compound.broad_id,
                    senso.sample
                )));
            }
            Some(_) => {}
            None => log::warn!(
                "Row {}: compound {} has no merge key; reported against sample {}",
                i + 1,
                compound.broad_id,
                senso.sample
            ),
        }

        let fc = normalize_curve_label(&senso.curve);
        let protein = proteins.lookup(&fc);
        if protein.is_none() {
            log::debug!("Row {}: no protein metadata for channel {}", i + 1, fc);
        }

        let rmax = protein.map(|p| rmax_theoretical(compound.mw, p.mw, p.ru));
        let percent = match (top.rel_resp, rmax) {
            (Some(ru), Some(rmax)) => Some(percent_binding(ru, rmax)),
            _ => None,
        };

        rows.push(AssembledRow {
            broad_id: compound.broad_id.clone(),
            project_code: meta.project_code.clone(),
            curve_valid: None,
            top_compound_um: compound.test_conc_um,
            rmax_theoretical: rmax,
            ru_top_cmpd: top.rel_resp,
            percent_binding_top: percent,
            kd_ss_um: ss.kd_um,
            chi2_ss_affinity: ss.chi2,
            fitted_rmax_ss_affinity: ss.rmax,
            ka_1_1_binding: senso.ka,
            kd_little_1_1_binding: senso.kd_off,
            kd_1_1_binding_um: senso.kd_um,
            chi2_1_1_binding: senso.chi2,
            u_value_1_1_binding: None,
            fitted_rmax_1_1_binding: senso.rmax,
            comments: None,
            protein_ru: protein.map(|p| p.ru),
            protein_mw: protein.map(|p| p.mw),
            protein_id: protein.map(|p| p.bip.clone()),
            mw: compound.mw,
            instrument: meta.instrument,
            exp_date: meta.experiment_date.clone(),
            nucleotide: meta.nucleotide.clone(),
            chip_lot: meta.chip_lot.clone(),
            operator: meta.operator.clone(),
            protocol_id: meta.protocol.clone(),
            raw_data_file: meta.raw_data_filename.clone(),
            dir_folder: meta.directory_folder.clone(),
            unique_id: unique_id(
                &senso.sample,
                &fc,
                &meta.project_code,
                &meta.experiment_date,
                senso.key.image_index,
            ),
            ss_img: ss_images[i].path.clone(),
            senso_img: senso_images[i].path.clone(),
            fc,
        });
    }

    log::info!("Assembled {} report rows", rows.len());
    Ok(rows)
}
