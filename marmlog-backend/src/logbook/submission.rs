use std::str::FromStr;

use garde::Validate;
use itertools::Itertools;
use serde::Deserialize;
use valuable::Valuable;

use super::{
    donor::DonorCodes,
    error::{Error, Result},
    normalize::{
        normalize_date, normalize_sequencing_index, pad_index, resolve_single_slab,
        resolve_slab_list, resolve_tile, sanitize_user_key,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Hemisphere {
    Left,
    Right,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SortMethod {
    #[strum(to_string = "pooled")]
    Pooled,
    #[strum(to_string = "DAPI")]
    Dapi,
    #[strum(to_string = "unsorted")]
    Unsorted,
}

impl SortMethod {
    /// `PS` (pre-sorted) for pooled/DAPI sorts, `PN` otherwise; part of the
    /// enriched-sample naming convention.
    #[must_use]
    pub fn sorting_status(self) -> &'static str {
        match self {
            Self::Pooled | Self::Dapi => "PS",
            Self::Unsorted => "PN",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Modality {
    #[strum(to_string = "RNA")]
    Rna,
    #[strum(to_string = "ATAC")]
    Atac,
}

/// Study classification. Cortex and Aim4 are multi-slab studies; everything
/// else takes a single slab with the hemisphere folded into its number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Project {
    CortexMultiSlab,
    Aim4,
    SingleSlab,
}

impl Project {
    #[must_use]
    pub fn from_study(study: &str) -> Self {
        match study {
            "HMBA_CjAtlas_Cortex" => Self::CortexMultiSlab,
            "HMBA_Aim4" => Self::Aim4,
            _ => Self::SingleSlab,
        }
    }

    #[must_use]
    pub fn is_multi_slab(self) -> bool {
        matches!(self, Self::CortexMultiSlab | Self::Aim4)
    }

    /// Aim4 runs RNA-seq only; every other study is a multiome run producing
    /// one RNA and one ATAC row per reaction.
    #[must_use]
    pub fn modalities(self) -> &'static [Modality] {
        match self {
            Self::Aim4 => &[Modality::Rna],
            _ => &[Modality::Rna, Modality::Atac],
        }
    }

    #[must_use]
    pub fn enriched_prefix(self) -> &'static str {
        match self {
            Self::Aim4 => "MPTX",
            _ => "MPXM",
        }
    }

    #[must_use]
    pub fn rna_suffix(self) -> &'static str {
        match self {
            Self::Aim4 => "TX",
            _ => "XR",
        }
    }

    #[must_use]
    pub fn dissociated_suffix(self) -> &'static str {
        match self {
            Self::Aim4 => ".Rseq",
            _ => ".Multiome",
        }
    }

    #[must_use]
    pub fn library_suffix(self, modality: Modality) -> &'static str {
        match modality {
            Modality::Rna => self.rna_suffix(),
            Modality::Atac => "XA",
        }
    }

    #[must_use]
    pub fn library_method(self, modality: Modality) -> &'static str {
        match (modality, self) {
            (Modality::Rna, Self::Aim4) => "10xV4",
            (Modality::Rna, _) => "10xMultiome-RSeq",
            (Modality::Atac, _) => "10xMultiome-ASeq",
        }
    }
}

/// A scalar the form may submit as either a JSON number or a string.
#[derive(Clone, Debug, Deserialize, Valuable)]
#[serde(untagged)]
pub enum NumOrStr {
    Num(f64),
    Str(String),
}

impl NumOrStr {
    fn as_f64(&self, field: &str) -> Result<f64> {
        match self {
            Self::Num(n) => Ok(*n),
            Self::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::malformed(field, format!("{s:?} is not a number"))),
        }
    }

    fn as_i64(&self, field: &str) -> Result<i64> {
        let n = self.as_f64(field)?;
        if n.fract() != 0.0 {
            return Err(Error::malformed(field, format!("{n} is not an integer")));
        }

        Ok(n as i64)
    }
}

/// The wire payload, field for field what the production form posts. Garde
/// catches absent required fields up front; everything deeper (dates, index
/// shapes, per-reaction array lengths) happens in [`SubmissionForm::normalize`],
/// before any row is composed.
#[derive(Debug, Deserialize, Validate, Valuable)]
#[garde(allow_unvalidated)]
pub struct SubmissionForm {
    #[garde(required, length(min = 1))]
    pub user_first_name: Option<String>,
    #[garde(required, length(min = 1))]
    pub date: Option<String>,
    #[garde(required, length(min = 1))]
    pub marmoset: Option<String>,
    #[garde(required, length(min = 1))]
    pub slab: Option<String>,
    #[garde(required, length(min = 1))]
    pub tile: Option<String>,
    #[garde(required, length(min = 1))]
    pub hemisphere: Option<String>,
    #[garde(required, length(min = 1))]
    pub tile_location: Option<String>,
    #[garde(required, length(min = 1))]
    pub sort_method: Option<String>,
    #[garde(required)]
    pub rxn_number: Option<NumOrStr>,
    #[garde(required, length(min = 1))]
    pub sorter_initials: Option<String>,
    pub project: Option<String>,
    pub facs_population: Option<String>,
    pub elab_link: Option<String>,
    pub expected_recovery: Option<NumOrStr>,
    pub nuclei_concentration: Option<NumOrStr>,
    pub nuclei_volume: Option<NumOrStr>,
    pub cdna_amp_date: Option<String>,
    pub rna_prep_date: Option<String>,
    pub atac_prep_date: Option<String>,
    pub rna_indices: Option<String>,
    pub atac_indices: Option<String>,
    pub cdna_concentration: Option<String>,
    pub percent_cdna_400bp: Option<String>,
    pub rna_lib_concentration: Option<String>,
    pub cdna_pcr_cycles: Option<String>,
    pub rna_sizes: Option<String>,
    pub library_cycles_rna: Option<String>,
    pub atac_lib_concentration: Option<String>,
    pub atac_sizes: Option<String>,
    pub library_cycles_atac: Option<String>,
}

/// A fully validated and normalized submission. Every derivation failure has
/// already been reported by the time one of these exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub user_key: String,
    pub date: String,
    pub mit_name: String,
    pub donor_code: String,
    pub project: Project,
    pub study: String,
    pub slab: String,
    pub combined_slab_label: Option<String>,
    pub slab_part: String,
    pub tile: String,
    pub tile_part: String,
    pub tile_location: String,
    pub sort_method: SortMethod,
    pub facs_population: String,
    pub initials: String,
    pub rxn_number: usize,
    pub elab_link: String,
    pub expected_recovery: i64,
    pub enriched_cell_count: i64,
    pub cdna_amp_date: String,
    pub rna_prep_date: String,
    pub atac_prep_date: Option<String>,
    pub rna_indices: Vec<String>,
    pub atac_indices: Vec<String>,
    pub cdna_concentration: Vec<f64>,
    pub percent_cdna_400bp: Vec<f64>,
    pub rna_lib_concentration: Vec<f64>,
    pub cdna_pcr_cycles: Vec<u32>,
    pub rna_sizes: Vec<u32>,
    pub library_cycles_rna: Vec<u32>,
    pub atac_lib_concentration: Vec<f64>,
    pub atac_sizes: Vec<u32>,
    pub library_cycles_atac: Vec<u32>,
}

impl Submission {
    #[must_use]
    pub fn modalities(&self) -> &'static [Modality] {
        self.project.modalities()
    }

    /// `AP{initials}{TX|XR}`, the amplified-cDNA naming prefix.
    #[must_use]
    pub fn amp_prefix(&self) -> String {
        format!("AP{}{}", self.initials, self.project.rna_suffix())
    }

    /// `LP{initials}{suffix}`, the library-prep set prefix for a modality.
    #[must_use]
    pub fn library_set(&self, modality: Modality) -> String {
        format!(
            "LP{}{}",
            self.initials,
            self.project.library_suffix(modality)
        )
    }

    /// `{donorCode}.{tileLocation}.{slabLabel}.{tile}`.
    #[must_use]
    pub fn tissue_name(&self) -> String {
        let slab_label = self.combined_slab_label.as_ref().unwrap_or(&self.slab);

        format!(
            "{}.{}.{}.{}",
            self.donor_code, self.tile_location, slab_label, self.tile
        )
    }

    #[must_use]
    pub fn prep_date(&self, modality: Modality) -> &str {
        match modality {
            Modality::Rna => &self.rna_prep_date,
            Modality::Atac => self.atac_prep_date.as_deref().unwrap_or_default(),
        }
    }
}

fn require<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::MissingField {
            field: field.to_string(),
        }),
    }
}

fn require_num<'a>(field: &str, value: &'a Option<NumOrStr>) -> Result<&'a NumOrStr> {
    value.as_ref().ok_or_else(|| Error::MissingField {
        field: field.to_string(),
    })
}

fn parse_list<T>(field: &str, raw: &Option<String>, count: usize) -> Result<Vec<T>>
where
    T: FromStr,
{
    let raw = require(field, raw)?;

    let values: Vec<T> = raw
        .split(',')
        .map(str::trim)
        .map(|token| {
            token
                .parse()
                .map_err(|_| Error::malformed(field, format!("{token:?} is not a number")))
        })
        .collect::<Result<_>>()?;

    if values.len() < count {
        return Err(Error::malformed(
            field,
            format!("expected at least {count} values, got {}", values.len()),
        ));
    }

    Ok(values)
}

fn parse_indices(field: &str, raw: &Option<String>, count: usize) -> Result<Vec<String>> {
    let raw = require(field, raw)?;

    let indices: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .map(|token| {
            normalize_sequencing_index(token)
                .map(|index| pad_index(&index))
                .ok_or_else(|| Error::IndexFormat {
                    input: token.to_string(),
                })
        })
        .collect::<Result<_>>()?;

    if indices.len() < count {
        return Err(Error::malformed(
            field,
            format!("expected at least {count} indices, got {}", indices.len()),
        ));
    }

    Ok(indices)
}

fn unpadded(entry: &str) -> String {
    entry
        .parse::<u32>()
        .map_or_else(|_| entry.to_string(), |n| n.to_string())
}

impl SubmissionForm {
    /// Validates and normalizes the raw form into a [`Submission`].
    ///
    /// # Errors
    /// Reports the first failure encountered, in field order; nothing is
    /// derived lazily, so a returned submission cannot fail mid-write.
    pub fn normalize(&self, donors: &DonorCodes) -> Result<Submission> {
        let user_key = sanitize_user_key(require("user_first_name", &self.user_first_name)?);
        let date = normalize_date(require("date", &self.date)?)?;

        let donor = require("marmoset", &self.marmoset)?;
        let donor_code = donors.lookup(donor)?.to_string();
        let mit_name = format!("cj{donor}");

        let hemisphere_raw = require("hemisphere", &self.hemisphere)?;
        let hemisphere = hemisphere_raw
            .split_whitespace()
            .next()
            .and_then(|token| Hemisphere::from_str(token).ok())
            .ok_or_else(|| {
                Error::malformed("hemisphere", format!("expected LEFT, RIGHT or BOTH, got {hemisphere_raw:?}"))
            })?;

        let sort_raw = require("sort_method", &self.sort_method)?;
        let sort_method = SortMethod::from_str(sort_raw).map_err(|_| {
            Error::malformed("sort_method", format!("expected pooled, DAPI or unsorted, got {sort_raw:?}"))
        })?;

        let study = self.project.clone().unwrap_or_default();
        let project = Project::from_study(&study);

        let slab_raw = require("slab", &self.slab)?;
        let (slab, combined_slab_label, slab_part) = if project.is_multi_slab() {
            let entries = resolve_slab_list(slab_raw)?;
            let combined = entries.iter().join("_");
            let slab_part = if entries.len() > 1 {
                format!("Slabs_{}", entries.iter().map(|e| unpadded(e)).join("_"))
            } else {
                format!("Slab{}", unpadded(&entries[0]))
            };

            (entries[0].clone(), Some(combined), slab_part)
        } else {
            let slab = resolve_single_slab(slab_raw, hemisphere)?;
            let slab_part = format!("Slab{}", unpadded(&slab));

            (slab, None, slab_part)
        };

        let tile = resolve_tile(require("tile", &self.tile)?);
        let tile_part = match tile.parse::<u32>() {
            Ok(n) => format!("Tile{n}"),
            Err(_) => tile.clone(),
        };
        let tile_location = require("tile_location", &self.tile_location)?.to_string();

        let rxn_number = require_num("rxn_number", &self.rxn_number)?.as_i64("rxn_number")?;
        if rxn_number < 1 {
            return Err(Error::malformed("rxn_number", "must be a positive integer"));
        }
        let rxn_number = rxn_number as usize;

        let initials = require("sorter_initials", &self.sorter_initials)?
            .trim()
            .to_uppercase();

        let facs_population = match sort_method {
            SortMethod::Pooled => require("facs_population", &self.facs_population)?.to_string(),
            SortMethod::Unsorted => "no_FACS".to_string(),
            SortMethod::Dapi => "DAPI".to_string(),
        };

        let elab_link = self
            .elab_link
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let expected_recovery = require_num("expected_recovery", &self.expected_recovery)?
            .as_i64("expected_recovery")?;

        let nuclei_concentration = match require_num("nuclei_concentration", &self.nuclei_concentration)? {
            NumOrStr::Num(n) => *n,
            // The form renders concentrations with thousands separators
            NumOrStr::Str(s) => {
                let cleaned = s.trim().replace(',', "");
                cleaned.parse().map_err(|_| {
                    Error::malformed("nuclei_concentration", format!("{s:?} is not a number"))
                })?
            }
        };
        let nuclei_volume =
            require_num("nuclei_volume", &self.nuclei_volume)?.as_f64("nuclei_volume")?;
        let enriched_cell_count = (nuclei_concentration * nuclei_volume).round() as i64;

        let cdna_amp_date = normalize_date(require("cdna_amp_date", &self.cdna_amp_date)?)?;
        let rna_prep_date = normalize_date(require("rna_prep_date", &self.rna_prep_date)?)?;

        let rna_indices = parse_indices("rna_indices", &self.rna_indices, rxn_number)?;
        let cdna_concentration =
            parse_list("cdna_concentration", &self.cdna_concentration, rxn_number)?;
        let percent_cdna_400bp =
            parse_list("percent_cdna_400bp", &self.percent_cdna_400bp, rxn_number)?;
        let rna_lib_concentration = parse_list(
            "rna_lib_concentration",
            &self.rna_lib_concentration,
            rxn_number,
        )?;
        let cdna_pcr_cycles = parse_list("cdna_pcr_cycles", &self.cdna_pcr_cycles, rxn_number)?;
        let rna_sizes = parse_list("rna_sizes", &self.rna_sizes, rxn_number)?;
        let library_cycles_rna =
            parse_list("library_cycles_rna", &self.library_cycles_rna, rxn_number)?;

        let atac = project.modalities().contains(&Modality::Atac);
        let (atac_prep_date, atac_indices, atac_lib_concentration, atac_sizes, library_cycles_atac) =
            if atac {
                (
                    Some(normalize_date(require("atac_prep_date", &self.atac_prep_date)?)?),
                    parse_indices("atac_indices", &self.atac_indices, rxn_number)?,
                    parse_list(
                        "atac_lib_concentration",
                        &self.atac_lib_concentration,
                        rxn_number,
                    )?,
                    parse_list("atac_sizes", &self.atac_sizes, rxn_number)?,
                    parse_list("library_cycles_atac", &self.library_cycles_atac, rxn_number)?,
                )
            } else {
                (None, Vec::new(), Vec::new(), Vec::new(), Vec::new())
            };

        Ok(Submission {
            user_key,
            date,
            mit_name,
            donor_code,
            project,
            study,
            slab,
            combined_slab_label,
            slab_part,
            tile,
            tile_part,
            tile_location,
            sort_method,
            facs_population,
            initials,
            rxn_number,
            elab_link,
            expected_recovery,
            enriched_cell_count,
            cdna_amp_date,
            rna_prep_date,
            atac_prep_date,
            rna_indices,
            atac_indices,
            cdna_concentration,
            percent_cdna_400bp,
            rna_lib_concentration,
            cdna_pcr_cycles,
            rna_sizes,
            library_cycles_rna,
            atac_lib_concentration,
            atac_sizes,
            library_cycles_atac,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn form() -> SubmissionForm {
        serde_json::from_value(serde_json::json!({
            "user_first_name": "Ahmed",
            "date": "2025-10-01",
            "marmoset": "Petra",
            "slab": "5",
            "tile": "7",
            "hemisphere": "Left hemisphere",
            "tile_location": "A1",
            "sort_method": "pooled",
            "facs_population": "NeuN+",
            "rxn_number": 2,
            "sorter_initials": "ht",
            "project": "HMBA_CjAtlas_Subcortex",
            "elab_link": "https://elab.example.org/x",
            "expected_recovery": 10000,
            "nuclei_concentration": "1,250",
            "nuclei_volume": 40,
            "cdna_amp_date": "251002",
            "rna_prep_date": "251003",
            "atac_prep_date": "251004",
            "rna_indices": "12a, 3B",
            "atac_indices": "A1,B2",
            "cdna_concentration": "10.5, 11",
            "percent_cdna_400bp": "50,60",
            "rna_lib_concentration": "4.2,4.4",
            "cdna_pcr_cycles": "7,7",
            "rna_sizes": "450,460",
            "library_cycles_rna": "14,14",
            "atac_lib_concentration": "2.5,2.6",
            "atac_sizes": "500,510",
            "library_cycles_atac": "9,9",
        }))
        .unwrap()
    }

    #[test]
    fn a_complete_form_normalizes() {
        let submission = form().normalize(&DonorCodes::default()).unwrap();

        assert_eq!(submission.user_key, "Ahmed");
        assert_eq!(submission.date, "251001");
        assert_eq!(submission.mit_name, "cjPetra");
        assert_eq!(submission.donor_code, "CJ23.56.001");
        assert_eq!(submission.slab, "05");
        assert_eq!(submission.slab_part, "Slab5");
        assert_eq!(submission.tile_part, "Tile7");
        assert_eq!(submission.initials, "HT");
        assert_eq!(submission.facs_population, "NeuN+");
        assert_eq!(submission.enriched_cell_count, 50000);
        assert_eq!(submission.rna_indices, vec!["A12", "B03"]);
        assert_eq!(submission.atac_indices, vec!["A01", "B02"]);
        assert_eq!(submission.tissue_name(), "CJ23.56.001.A1.05.07");
        assert_eq!(submission.amp_prefix(), "APHTXR");
        assert_eq!(submission.library_set(Modality::Atac), "LPHTXA");
    }

    #[test]
    fn multi_slab_projects_combine_labels() {
        let mut form = form();
        form.project = Some("HMBA_CjAtlas_Cortex".to_string());
        form.slab = Some("9,10,11".to_string());

        let submission = form.normalize(&DonorCodes::default()).unwrap();

        assert_eq!(
            submission.combined_slab_label.as_deref(),
            Some("09_10_11")
        );
        assert_eq!(submission.slab_part, "Slabs_9_10_11");
        assert_eq!(submission.slab, "09");
        assert_eq!(submission.tissue_name(), "CJ23.56.001.A1.09_10_11.07");
    }

    #[test]
    fn aim4_skips_the_atac_surface() {
        let mut form = form();
        form.project = Some("HMBA_Aim4".to_string());
        form.atac_indices = None;
        form.atac_prep_date = None;
        form.atac_lib_concentration = None;
        form.atac_sizes = None;
        form.library_cycles_atac = None;

        let submission = form.normalize(&DonorCodes::default()).unwrap();

        assert_eq!(submission.modalities(), &[Modality::Rna]);
        assert_eq!(submission.amp_prefix(), "APHTTX");
        assert_eq!(submission.project.library_method(Modality::Rna), "10xV4");
    }

    #[rstest]
    #[case("Right hemisphere", "45")]
    #[case("BOTH", "95")]
    fn hemisphere_offsets_apply(#[case] hemisphere: &str, #[case] expected: &str) {
        let mut form = form();
        form.hemisphere = Some(hemisphere.to_string());

        let submission = form.normalize(&DonorCodes::default()).unwrap();

        assert_eq!(submission.slab, expected);
    }

    #[test]
    fn missing_required_fields_are_named() {
        let mut form = form();
        form.date = None;

        assert_eq!(
            form.normalize(&DonorCodes::default()),
            Err(Error::MissingField {
                field: "date".to_string()
            })
        );
    }

    #[test]
    fn short_reaction_arrays_are_rejected() {
        let mut form = form();
        form.rna_sizes = Some("450".to_string());

        assert!(matches!(
            form.normalize(&DonorCodes::default()),
            Err(Error::MalformedField { field, .. }) if field == "rna_sizes"
        ));
    }

    #[test]
    fn bad_indices_fail_before_composition() {
        let mut form = form();
        form.rna_indices = Some("12a,qqq".to_string());

        assert_eq!(
            form.normalize(&DonorCodes::default()),
            Err(Error::IndexFormat {
                input: "qqq".to_string()
            })
        );
    }

    #[test]
    fn unknown_donors_are_rejected() {
        let mut form = form();
        form.marmoset = Some("Garfield".to_string());

        assert_eq!(
            form.normalize(&DonorCodes::default()),
            Err(Error::UnknownDonor {
                name: "Garfield".to_string()
            })
        );
    }

    #[test]
    fn garde_flags_absent_required_fields() {
        let form: SubmissionForm = serde_json::from_value(serde_json::json!({})).unwrap();

        let report = form.validate().unwrap_err();
        let (path, _) = report.iter().next().unwrap();
        assert_eq!(path.to_string(), "user_first_name");
    }
}
