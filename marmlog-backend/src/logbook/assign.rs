use std::collections::BTreeMap;

pub const WELLS_PER_CHIP: u8 = 8;

/// One multiplexing slot: a chip and a well in 1..=8.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChipWell {
    pub chip: u32,
    pub well: u8,
}

impl ChipWell {
    /// `P{chip:04}_{well}`, the `barcoded_cell_sample_name` column value.
    #[must_use]
    pub fn barcoded_name(&self) -> String {
        let Self { chip, well } = self;

        format!("P{chip:04}_{well}")
    }
}

/// Allocates `count` wells starting from `start_chip`, continuing any wells
/// already used on it this date and rolling to the next chip at 8. A chip
/// that is already full (including every full chip after it) is skipped
/// before the first assignment.
#[must_use]
pub fn assign_wells(count: usize, start_chip: u32, used: &BTreeMap<u32, u8>) -> Vec<ChipWell> {
    let mut chip = start_chip;
    let mut wells_used = used.get(&chip).copied().unwrap_or(0);

    let mut assignments = Vec::with_capacity(count);
    for _ in 0..count {
        while wells_used >= WELLS_PER_CHIP {
            chip += 1;
            wells_used = used.get(&chip).copied().unwrap_or(0);
        }

        wells_used += 1;
        assignments.push(ChipWell {
            chip,
            well: wells_used,
        });
    }

    assignments
}

/// Amplification batch/letter code: letters cycle A..H within a batch, then
/// the batch number advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AmpCode {
    pub batch: u32,
    pub letter: char,
}

impl AmpCode {
    pub const FIRST: Self = Self {
        batch: 1,
        letter: 'A',
    };

    #[must_use]
    pub fn next(self) -> Self {
        let Self { batch, letter } = self;

        if letter == 'H' {
            Self {
                batch: batch + 1,
                letter: 'A',
            }
        } else {
            Self {
                batch,
                letter: (letter as u8 + 1) as char,
            }
        }
    }

    /// `{prefix}_{date}_{batch}_{letter}`, the `amplified_cdna_name` column
    /// value.
    #[must_use]
    pub fn label(&self, prefix: &str, date: &str) -> String {
        let Self { batch, letter } = self;

        format!("{prefix}_{date}_{batch}_{letter}")
    }
}

#[must_use]
pub fn assign_amp_codes(count: usize, first: AmpCode) -> Vec<AmpCode> {
    std::iter::successors(Some(first), |code| Some(code.next()))
        .take(count)
        .collect()
}
