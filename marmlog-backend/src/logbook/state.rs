//! Counter state is never persisted on its own: everything here is a pure
//! function of the rows already written to a log, so a conflict retry that
//! re-downloads the log also re-derives every counter.

use std::{
    collections::{BTreeMap, HashMap},
    sync::LazyLock,
};

use regex::Regex;

use super::{
    assign::AmpCode,
    sheet::{Cell, Sheet},
};

static BARCODED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^P(\d{4})_([1-8])$").unwrap());

static LIBRARY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(LP[A-Z0-9]+)_(\d{6})_(\d+)_([A-Z]\d{2})$").unwrap());

/// Chip/well usage for one experiment date, reconstructed from
/// `barcoded_cell_sample_name` values.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChipState {
    /// Highest chip seen for the date; `None` when the date has no rows yet.
    pub max_chip: Option<u32>,
    /// Per-chip count of wells already used (wells are assigned in order, so
    /// the max well number is the count).
    pub wells: BTreeMap<u32, u8>,
}

#[must_use]
pub fn derive_chip_state(sheet: &Sheet, date: &str) -> ChipState {
    let mut state = ChipState::default();

    let (Some(date_col), Some(barcode_col)) = (
        sheet.column("experiment_start_date"),
        sheet.column("barcoded_cell_sample_name"),
    ) else {
        return state;
    };

    for row in sheet.rows() {
        if row.get(date_col).and_then(Cell::as_str) != Some(date) {
            continue;
        }
        let Some(captures) = row
            .get(barcode_col)
            .and_then(Cell::as_str)
            .and_then(|name| BARCODED_NAME.captures(name))
        else {
            continue;
        };

        let chip: u32 = captures[1].parse().unwrap_or(0);
        let well: u8 = captures[2].parse().unwrap_or(0);

        let used = state.wells.entry(chip).or_default();
        *used = (*used).max(well);
        state.max_chip = Some(state.max_chip.map_or(chip, |max| max.max(chip)));
    }

    state
}

/// The next amplification code for a (prefix, amplification date) pair: one
/// step past the greatest `{prefix}_{date}_{batch}_{letter}` already in the
/// log, or `1_A` on a fresh pair.
#[must_use]
pub fn next_amp_code(sheet: &Sheet, prefix: &str, date: &str) -> AmpCode {
    let pattern = format!(
        r"^{}_{}_(\d+)_([A-H])$",
        regex::escape(prefix),
        regex::escape(date)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return AmpCode::FIRST;
    };

    sheet
        .column_values("amplified_cdna_name")
        .filter_map(|name| {
            let captures = re.captures(name)?;
            let batch: u32 = captures[1].parse().ok()?;
            let letter = captures[2].chars().next()?;

            Some(AmpCode { batch, letter })
        })
        .max()
        .map_or(AmpCode::FIRST, AmpCode::next)
}

/// Duplicate counters for `library_prep_set` numbering, keyed by
/// (library set, prep date, sequencing index). Seeded from the log so a key
/// reused across submissions keeps counting instead of colliding at `_1`.
pub type LibraryCounters = HashMap<(String, String, String), u32>;

#[must_use]
pub fn derive_library_counters(sheet: &Sheet) -> LibraryCounters {
    let mut counters = LibraryCounters::new();

    for name in sheet.column_values("library_name") {
        let Some(captures) = LIBRARY_NAME.captures(name) else {
            continue;
        };
        let Ok(n) = captures[3].parse::<u32>() else {
            continue;
        };

        let key = (
            captures[1].to_string(),
            captures[2].to_string(),
            captures[4].to_string(),
        );
        let seen = counters.entry(key).or_default();
        *seen = (*seen).max(n);
    }

    counters
}
