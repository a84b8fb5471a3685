use super::error::{Error, Result};

/// The log's column set. Order matters: rows are written positionally and
/// downstream consumers index by header name.
pub const HEADERS: [&str; 37] = [
    "krienen_lab_identifier",
    "seq_portal",
    "elab_link",
    "experiment_start_date",
    "mit_name",
    "donor_name",
    "tissue_name",
    "tissue_name_old",
    "dissociated_cell_sample_name",
    "facs_population_plan",
    "cell_prep_type",
    "study",
    "enriched_cell_sample_container_name",
    "expc_cell_capture",
    "port_well",
    "enriched_cell_sample_name",
    "enriched_cell_sample_quantity_count",
    "barcoded_cell_sample_name",
    "library_method",
    "cDNA_amplification_method",
    "cDNA_amplification_date",
    "amplified_cdna_name",
    "cDNA_pcr_cycles",
    "rna_amplification_pass_fail",
    "percent_cdna_longer_than_400bp",
    "cdna_amplified_quantity_ng",
    "cDNA_library_input_ng",
    "library_creation_date",
    "library_prep_set",
    "library_name",
    "tapestation_avg_size_bp",
    "library_num_cycles",
    "lib_quantification_ng",
    "library_prep_pass_fail",
    "r1_index",
    "r2_index",
    "ATAC_index",
];

/// Sentinel for cells that are *not applicable* to a row, as opposed to
/// merely absent. Downstream consumers treat the two differently, so the
/// codec must round-trip the distinction.
pub const NOT_APPLICABLE: &str = "#N/A";

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    NotApplicable,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl AsRef<str>) -> Self {
        Self::Text(value.as_ref().to_string())
    }

    /// The cell's content as written to the log. Numbers drop a trailing
    /// `.0` so integral values read as integers.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::NotApplicable => NOT_APPLICABLE.to_string(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<&str> for Cell {
    fn from(raw: &str) -> Self {
        match raw {
            "" => Self::Empty,
            NOT_APPLICABLE => Self::NotApplicable,
            other => Self::Text(other.to_string()),
        }
    }
}

pub type Row = Vec<Cell>;

/// An in-memory view of one user log: a header row plus data rows, with
/// columns addressed by header name.
#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Sheet {
    /// A fresh log containing only the header row.
    #[must_use]
    pub fn new_log() -> Self {
        Self {
            headers: HEADERS.iter().map(|h| (*h).to_string()).collect(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Cells of `column` across all data rows, skipping blanks.
    pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        let column = self.column(name);

        self.rows
            .iter()
            .filter_map(move |row| row.get(column?))
            .filter_map(Cell::as_str)
    }

    /// Appends after the last row holding any content; trailing fully-blank
    /// rows are dropped first so content never lands past a gap.
    pub fn append_row(&mut self, row: Row) {
        while self
            .rows
            .last()
            .is_some_and(|r| r.iter().all(Cell::is_blank))
        {
            self.rows.pop();
        }

        self.rows.push(row);
    }
}

/// CSV codec for the object-store representation of a log. The binary
/// workbook format the lab's desktop tooling exports to is out of scope;
/// only the row/column/sentinel contract matters here.
pub struct CsvCodec;

impl CsvCodec {
    /// # Errors
    pub fn decode(bytes: &[u8]) -> Result<Sheet> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);

        let headers = reader
            .headers()?
            .iter()
            .map(ToString::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(Cell::from).collect());
        }

        Ok(Sheet { headers, rows })
    }

    /// # Errors
    pub fn encode(sheet: &Sheet) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record(sheet.headers())?;
        for row in sheet.rows() {
            writer.write_record(row.iter().map(|cell| cell.render()))?;
        }

        writer
            .into_inner()
            .map_err(|err| Error::Storage {
                message: format!("{err:?}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn new_log_carries_the_full_header_row() {
        let sheet = Sheet::new_log();

        assert_eq!(sheet.headers().len(), 37);
        assert_eq!(sheet.column("krienen_lab_identifier"), Some(0));
        assert_eq!(sheet.column("ATAC_index"), Some(36));
        assert_eq!(sheet.column("nonexistent"), None);
    }

    #[test]
    fn sentinel_round_trips_distinct_from_empty() {
        let mut sheet = Sheet::new_log();
        let mut row = vec![Cell::Empty; 37];
        row[0] = Cell::text("250101_HMBA_cjPetra_Slab5_Tile7_pooled_RNA1");
        row[7] = Cell::NotApplicable;
        row[14] = Cell::Number(3.0);
        sheet.append_row(row);

        let decoded = CsvCodec::decode(&CsvCodec::encode(&sheet).unwrap()).unwrap();

        let row = &decoded.rows()[0];
        assert_eq!(row[7], Cell::NotApplicable);
        assert_eq!(row[1], Cell::Empty);
        assert_eq!(row[14], Cell::text("3"));
    }

    #[test]
    fn append_lands_after_existing_content() {
        let mut sheet = Sheet::new_log();
        sheet.append_row(vec![Cell::text("first"); 37]);
        sheet.append_row(vec![Cell::Empty; 37]);
        sheet.append_row(vec![Cell::text("second"); 37]);

        assert_eq!(sheet.rows().len(), 2);
        assert_eq!(sheet.rows()[1][0], Cell::text("second"));
    }

    #[test]
    fn numbers_render_without_spurious_fraction() {
        assert_eq!(Cell::Number(52.0).render(), "52");
        assert_eq!(Cell::Number(10.4).render(), "10.4");
    }
}
