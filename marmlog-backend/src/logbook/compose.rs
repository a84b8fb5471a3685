use super::{
    assign::{AmpCode, ChipWell},
    sheet::{Cell, HEADERS, Row},
    state::LibraryCounters,
    submission::{Modality, Submission},
};

fn set(row: &mut Row, header: &str, cell: Cell) {
    let column = HEADERS
        .iter()
        .position(|h| *h == header)
        .expect("column names are fixed at compile time");
    row[column] = cell;
}

/// Builds the rows for one submission: one per (reaction, modality), RNA
/// before ATAC within a reaction. `amp_codes` holds one code per reaction
/// (consumed by the RNA row); `counters` carries the log-derived library
/// duplicate counts and is advanced as rows are composed.
#[must_use]
pub fn compose_rows(
    submission: &Submission,
    assignments: &[ChipWell],
    amp_codes: &[AmpCode],
    counters: &mut LibraryCounters,
) -> Vec<Row> {
    let mut rows = Vec::with_capacity(submission.rxn_number * submission.modalities().len());

    for x in 0..submission.rxn_number {
        for modality in submission.modalities() {
            rows.push(compose_row(
                submission,
                x,
                *modality,
                assignments[x],
                amp_codes[x],
                counters,
            ));
        }
    }

    rows
}

fn compose_row(
    submission: &Submission,
    x: usize,
    modality: Modality,
    assignment: ChipWell,
    amp_code: AmpCode,
    counters: &mut LibraryCounters,
) -> Row {
    let s = submission;
    let mut row = vec![Cell::Empty; HEADERS.len()];

    let krienen_lab_identifier = format!(
        "{}_HMBA_{}_{}_{}_{}_{}{}",
        s.date,
        s.mit_name,
        s.slab_part,
        s.tile_part,
        s.sort_method,
        modality,
        x + 1
    );
    set(&mut row, "krienen_lab_identifier", Cell::text(krienen_lab_identifier));
    set(&mut row, "seq_portal", Cell::text("no"));
    set(
        &mut row,
        "elab_link",
        if s.elab_link.is_empty() {
            Cell::Empty
        } else {
            Cell::text(&s.elab_link)
        },
    );
    set(&mut row, "experiment_start_date", Cell::text(&s.date));
    set(&mut row, "mit_name", Cell::text(&s.mit_name));
    set(&mut row, "donor_name", Cell::text(&s.donor_code));

    let tissue_name = s.tissue_name();
    set(&mut row, "tissue_name", Cell::text(&tissue_name));
    // Retired column, kept for sheet compatibility
    set(&mut row, "tissue_name_old", Cell::NotApplicable);
    set(
        &mut row,
        "dissociated_cell_sample_name",
        Cell::text(format!(
            "{}_{}{}",
            s.date,
            tissue_name,
            s.project.dissociated_suffix()
        )),
    );
    set(&mut row, "facs_population_plan", Cell::text(&s.facs_population));
    set(&mut row, "cell_prep_type", Cell::text("nuclei"));
    set(&mut row, "study", Cell::text(&s.study));

    let container = format!(
        "{}_{}_{}_{}",
        s.project.enriched_prefix(),
        s.date,
        s.sort_method.sorting_status(),
        s.initials
    );
    set(
        &mut row,
        "enriched_cell_sample_container_name",
        Cell::text(&container),
    );
    set(&mut row, "expc_cell_capture", Cell::Number(s.expected_recovery as f64));
    set(&mut row, "port_well", Cell::Number(f64::from(assignment.well)));
    set(
        &mut row,
        "enriched_cell_sample_name",
        Cell::text(format!("{container}_{}", assignment.well)),
    );
    set(
        &mut row,
        "enriched_cell_sample_quantity_count",
        Cell::Number(s.enriched_cell_count as f64),
    );
    set(
        &mut row,
        "barcoded_cell_sample_name",
        Cell::text(assignment.barcoded_name()),
    );
    set(
        &mut row,
        "library_method",
        Cell::text(s.project.library_method(modality)),
    );

    let library_set = s.library_set(modality);
    let prep_date = s.prep_date(modality);
    let index = match modality {
        Modality::Rna => &s.rna_indices[x],
        Modality::Atac => &s.atac_indices[x],
    };
    let count = counters
        .entry((library_set.clone(), prep_date.to_string(), index.clone()))
        .or_default();
    *count += 1;
    let library_prep_set = format!("{library_set}_{prep_date}_{count}");
    set(&mut row, "library_creation_date", Cell::text(prep_date));
    set(&mut row, "library_prep_set", Cell::text(&library_prep_set));
    set(
        &mut row,
        "library_name",
        Cell::text(format!("{library_prep_set}_{index}")),
    );
    set(&mut row, "library_prep_pass_fail", Cell::text("Pass"));

    match modality {
        Modality::Rna => {
            let concentration = s.cdna_concentration[x];
            let amplified_quantity = concentration * 40.0;

            set(
                &mut row,
                "cDNA_amplification_method",
                Cell::text(s.project.library_method(Modality::Rna)),
            );
            set(&mut row, "cDNA_amplification_date", Cell::text(&s.cdna_amp_date));
            set(
                &mut row,
                "amplified_cdna_name",
                Cell::text(amp_code.label(&s.amp_prefix(), &s.cdna_amp_date)),
            );
            set(
                &mut row,
                "cDNA_pcr_cycles",
                Cell::Number(f64::from(s.cdna_pcr_cycles[x])),
            );
            set(&mut row, "rna_amplification_pass_fail", Cell::text("Pass"));
            set(
                &mut row,
                "percent_cdna_longer_than_400bp",
                Cell::Number(s.percent_cdna_400bp[x]),
            );
            set(
                &mut row,
                "cdna_amplified_quantity_ng",
                Cell::Number(amplified_quantity),
            );
            set(
                &mut row,
                "cDNA_library_input_ng",
                Cell::Number(amplified_quantity * 0.25),
            );
            set(
                &mut row,
                "tapestation_avg_size_bp",
                Cell::Number(f64::from(s.rna_sizes[x])),
            );
            set(
                &mut row,
                "library_num_cycles",
                Cell::Number(f64::from(s.library_cycles_rna[x])),
            );
            set(
                &mut row,
                "lib_quantification_ng",
                Cell::Number(s.rna_lib_concentration[x] * 35.0),
            );
            set(
                &mut row,
                "r1_index",
                Cell::text(format!("SI-TT-{index}_i7")),
            );
            set(
                &mut row,
                "r2_index",
                Cell::text(format!("SI-TT-{index}_b(i5)")),
            );
            set(&mut row, "ATAC_index", Cell::NotApplicable);
        }
        Modality::Atac => {
            for header in [
                "cDNA_amplification_method",
                "cDNA_amplification_date",
                "amplified_cdna_name",
                "cDNA_pcr_cycles",
                "rna_amplification_pass_fail",
                "percent_cdna_longer_than_400bp",
                "cdna_amplified_quantity_ng",
                "cDNA_library_input_ng",
                "r1_index",
                "r2_index",
            ] {
                set(&mut row, header, Cell::NotApplicable);
            }

            set(
                &mut row,
                "tapestation_avg_size_bp",
                Cell::Number(f64::from(s.atac_sizes[x])),
            );
            set(
                &mut row,
                "library_num_cycles",
                Cell::Number(f64::from(s.library_cycles_atac[x])),
            );
            set(
                &mut row,
                "lib_quantification_ng",
                Cell::Number(s.atac_lib_concentration[x] * 20.0),
            );
            set(
                &mut row,
                "ATAC_index",
                Cell::text(format!("SI-NA-{index}")),
            );
        }
    }

    row
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::logbook::{
        assign::assign_amp_codes,
        sheet::Sheet,
        submission::{Project, SortMethod},
    };

    fn submission() -> Submission {
        Submission {
            user_key: "Ahmed".to_string(),
            date: "251001".to_string(),
            mit_name: "cjPetra".to_string(),
            donor_code: "CJ23.56.001".to_string(),
            project: Project::SingleSlab,
            study: "HMBA_CjAtlas_Subcortex".to_string(),
            slab: "05".to_string(),
            combined_slab_label: None,
            slab_part: "Slab5".to_string(),
            tile: "07".to_string(),
            tile_part: "Tile7".to_string(),
            tile_location: "A1".to_string(),
            sort_method: SortMethod::Pooled,
            facs_population: "NeuN+".to_string(),
            initials: "HT".to_string(),
            rxn_number: 2,
            elab_link: String::new(),
            expected_recovery: 10000,
            enriched_cell_count: 50000,
            cdna_amp_date: "251002".to_string(),
            rna_prep_date: "251003".to_string(),
            atac_prep_date: Some("251004".to_string()),
            rna_indices: vec!["A12".to_string(), "A12".to_string()],
            atac_indices: vec!["B07".to_string(), "C03".to_string()],
            cdna_concentration: vec![10.0, 11.0],
            percent_cdna_400bp: vec![50.0, 60.0],
            rna_lib_concentration: vec![4.0, 5.0],
            cdna_pcr_cycles: vec![7, 7],
            rna_sizes: vec![450, 460],
            library_cycles_rna: vec![14, 14],
            atac_lib_concentration: vec![2.5, 3.0],
            atac_sizes: vec![500, 510],
            library_cycles_atac: vec![9, 9],
        }
    }

    fn cell<'a>(sheet: &'a Sheet, row: &'a Row, header: &str) -> &'a Cell {
        &row[sheet.column(header).unwrap()]
    }

    #[test]
    fn rows_interleave_rna_and_atac_per_reaction() {
        let submission = submission();
        let assignments = [
            ChipWell { chip: 90, well: 1 },
            ChipWell { chip: 90, well: 2 },
        ];
        let amp_codes = assign_amp_codes(2, AmpCode::FIRST);

        let rows = compose_rows(
            &submission,
            &assignments,
            &amp_codes,
            &mut LibraryCounters::new(),
        );
        let sheet = Sheet::new_log();

        assert_eq!(rows.len(), 4);
        assert_eq!(
            cell(&sheet, &rows[0], "krienen_lab_identifier"),
            &Cell::text("251001_HMBA_cjPetra_Slab5_Tile7_pooled_RNA1")
        );
        assert_eq!(
            cell(&sheet, &rows[1], "krienen_lab_identifier"),
            &Cell::text("251001_HMBA_cjPetra_Slab5_Tile7_pooled_ATAC1")
        );
        assert_eq!(
            cell(&sheet, &rows[2], "krienen_lab_identifier"),
            &Cell::text("251001_HMBA_cjPetra_Slab5_Tile7_pooled_RNA2")
        );

        // Same chip/well on both modality rows of a reaction
        assert_eq!(
            cell(&sheet, &rows[0], "barcoded_cell_sample_name"),
            cell(&sheet, &rows[1], "barcoded_cell_sample_name")
        );
        assert_eq!(
            cell(&sheet, &rows[0], "amplified_cdna_name"),
            &Cell::text("APHTXR_251002_1_A")
        );
        assert_eq!(
            cell(&sheet, &rows[2], "amplified_cdna_name"),
            &Cell::text("APHTXR_251002_1_B")
        );
    }

    #[test]
    fn modality_inapplicable_cells_carry_the_sentinel() {
        let submission = submission();
        let assignments = [
            ChipWell { chip: 90, well: 1 },
            ChipWell { chip: 90, well: 2 },
        ];
        let amp_codes = assign_amp_codes(2, AmpCode::FIRST);

        let rows = compose_rows(
            &submission,
            &assignments,
            &amp_codes,
            &mut LibraryCounters::new(),
        );
        let sheet = Sheet::new_log();

        let rna = &rows[0];
        let atac = &rows[1];
        assert_eq!(cell(&sheet, rna, "ATAC_index"), &Cell::NotApplicable);
        assert_eq!(cell(&sheet, rna, "tissue_name_old"), &Cell::NotApplicable);
        assert_eq!(cell(&sheet, rna, "r1_index"), &Cell::text("SI-TT-A12_i7"));
        assert_eq!(
            cell(&sheet, atac, "amplified_cdna_name"),
            &Cell::NotApplicable
        );
        assert_eq!(cell(&sheet, atac, "cDNA_pcr_cycles"), &Cell::NotApplicable);
        assert_eq!(cell(&sheet, atac, "ATAC_index"), &Cell::text("SI-NA-B07"));
        assert_eq!(
            cell(&sheet, atac, "lib_quantification_ng"),
            &Cell::Number(50.0)
        );
    }

    #[test]
    fn duplicate_library_keys_keep_counting() {
        let submission = submission(); // both reactions use RNA index A12
        let assignments = [
            ChipWell { chip: 90, well: 1 },
            ChipWell { chip: 90, well: 2 },
        ];
        let amp_codes = assign_amp_codes(2, AmpCode::FIRST);

        // Counter seeded as if one A12 library already exists in the log
        let mut counters = LibraryCounters::from([(
            (
                "LPHTXR".to_string(),
                "251003".to_string(),
                "A12".to_string(),
            ),
            1,
        )]);

        let rows = compose_rows(&submission, &assignments, &amp_codes, &mut counters);
        let sheet = Sheet::new_log();

        assert_eq!(
            cell(&sheet, &rows[0], "library_name"),
            &Cell::text("LPHTXR_251003_2_A12")
        );
        assert_eq!(
            cell(&sheet, &rows[2], "library_name"),
            &Cell::text("LPHTXR_251003_3_A12")
        );
    }

    #[test]
    fn derived_quantities_follow_the_bench_math() {
        let submission = submission();
        let assignments = [
            ChipWell { chip: 90, well: 1 },
            ChipWell { chip: 90, well: 2 },
        ];
        let amp_codes = assign_amp_codes(2, AmpCode::FIRST);

        let rows = compose_rows(
            &submission,
            &assignments,
            &amp_codes,
            &mut LibraryCounters::new(),
        );
        let sheet = Sheet::new_log();

        let rna = &rows[0];
        assert_eq!(
            cell(&sheet, rna, "cdna_amplified_quantity_ng"),
            &Cell::Number(400.0)
        );
        assert_eq!(
            cell(&sheet, rna, "cDNA_library_input_ng"),
            &Cell::Number(100.0)
        );
        assert_eq!(
            cell(&sheet, rna, "lib_quantification_ng"),
            &Cell::Number(140.0)
        );
        assert_eq!(
            cell(&sheet, rna, "enriched_cell_sample_quantity_count"),
            &Cell::Number(50000.0)
        );
    }
}
