//! The derivation core: everything between a parsed form and the bytes
//! written back to the object store.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub mod assign;
pub mod compose;
pub mod donor;
pub mod error;
pub mod normalize;
pub mod sheet;
pub mod state;
pub mod store;
pub mod submission;

use self::{
    donor::DonorCodes,
    error::{Error, Result},
    normalize::sanitize_user_key,
    sheet::{CsvCodec, Sheet},
    store::{ObjectStore, Version, WritePrecondition},
    submission::SubmissionForm,
};

/// Bound on the conditional-write retry loop. Each retry re-downloads the
/// log and re-derives every counter from the fresh content.
const WRITE_ATTEMPTS: usize = 3;

pub const DEFAULT_BASELINE_CHIP: u32 = 90;

fn log_key(user_key: &str) -> String {
    format!("logs/{user_key}.csv")
}

fn counter_key(user_key: &str) -> String {
    format!("counters/{user_key}.json")
}

/// The per-user stored next-chip override. Log content is the source of
/// truth for everything else; this object only exists so an operator can
/// force where the next allocation starts.
#[derive(Serialize, Deserialize, Default)]
struct StoredCounter {
    next_chip: Option<u32>,
}

#[derive(Serialize, Debug)]
pub struct SubmissionReceipt {
    pub success: bool,
    pub message: String,
    pub user_key: String,
    pub rows_appended: usize,
    pub barcoded_cell_sample_names: Vec<String>,
}

pub struct LogDownload {
    pub filename: String,
    pub bytes: Bytes,
}

#[derive(Clone)]
pub struct Logbook {
    store: ObjectStore,
    donors: DonorCodes,
    baseline_chip: u32,
}

impl Logbook {
    #[must_use]
    pub fn new(store: ObjectStore, donors: DonorCodes, baseline_chip: u32) -> Self {
        Self {
            store,
            donors,
            baseline_chip,
        }
    }

    /// Runs the full pipeline for one form submission: normalize, derive
    /// counter state from the log, assign, compose, append, and write back
    /// conditionally. On a version conflict the whole derivation is redone
    /// against the fresh log, up to [`WRITE_ATTEMPTS`] times.
    ///
    /// # Errors
    pub async fn submit(&self, form: &SubmissionForm) -> Result<SubmissionReceipt> {
        let submission = form.normalize(&self.donors)?;
        let key = log_key(&submission.user_key);

        for attempt in 1..=WRITE_ATTEMPTS {
            let (mut sheet, version) = self.load_log(&key).await?;
            let override_chip = self.read_counter(&submission.user_key).await?;

            let chip_state = state::derive_chip_state(&sheet, &submission.date);
            let start_chip = override_chip
                .or(chip_state.max_chip)
                .unwrap_or(self.baseline_chip);
            let assignments =
                assign::assign_wells(submission.rxn_number, start_chip, &chip_state.wells);

            let amp_first = state::next_amp_code(
                &sheet,
                &submission.amp_prefix(),
                &submission.cdna_amp_date,
            );
            let amp_codes = assign::assign_amp_codes(submission.rxn_number, amp_first);

            let mut counters = state::derive_library_counters(&sheet);
            let rows = compose::compose_rows(&submission, &assignments, &amp_codes, &mut counters);
            let rows_appended = rows.len();
            for row in rows {
                sheet.append_row(row);
            }

            let bytes = Bytes::from(CsvCodec::encode(&sheet)?);
            let precondition = version.map_or(WritePrecondition::Absent, WritePrecondition::Matches);

            match self.store.write(&key, bytes, precondition).await {
                Ok(_) => {
                    if override_chip.is_some() {
                        self.clear_counter(&submission.user_key).await?;
                    }

                    tracing::info!(
                        user = %submission.user_key,
                        rows = rows_appended,
                        attempt,
                        "appended submission"
                    );

                    return Ok(SubmissionReceipt {
                        success: true,
                        message: "Data saved successfully!".to_string(),
                        user_key: submission.user_key.clone(),
                        rows_appended,
                        barcoded_cell_sample_names: assignments
                            .iter()
                            .map(assign::ChipWell::barcoded_name)
                            .collect(),
                    });
                }
                Err(Error::VersionConflict { .. }) if attempt < WRITE_ATTEMPTS => {
                    tracing::warn!(
                        user = %submission.user_key,
                        attempt,
                        "log changed underneath submission, rederiving"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::VersionConflict { key })
    }

    /// The current log for a user, created with a bare header row on first
    /// touch.
    ///
    /// # Errors
    pub async fn download(&self, user: &str) -> Result<LogDownload> {
        let user_key = sanitize_user_key(user);
        let key = log_key(&user_key);

        let bytes = match self.store.read(&key).await? {
            Some((bytes, _)) => bytes,
            None => {
                let bytes = Bytes::from(CsvCodec::encode(&Sheet::new_log())?);
                match self
                    .store
                    .write(&key, bytes.clone(), WritePrecondition::Absent)
                    .await
                {
                    Ok(_) => bytes,
                    // Another request created it first; serve that one
                    Err(Error::VersionConflict { .. }) => self
                        .store
                        .read(&key)
                        .await?
                        .map_or(bytes, |(created, _)| created),
                    Err(err) => return Err(err),
                }
            }
        };

        Ok(LogDownload {
            filename: format!("{user_key}_krienen_data_log.csv"),
            bytes,
        })
    }

    /// # Errors
    pub async fn next_chip(&self, user: &str) -> Result<Option<u32>> {
        self.read_counter(&sanitize_user_key(user)).await
    }

    /// # Errors
    pub async fn set_next_chip(&self, user: &str, next_chip: u32) -> Result<()> {
        self.write_counter(&sanitize_user_key(user), Some(next_chip))
            .await
    }

    async fn load_log(&self, key: &str) -> Result<(Sheet, Option<Version>)> {
        match self.store.read(key).await? {
            Some((bytes, version)) => Ok((CsvCodec::decode(&bytes)?, Some(version))),
            None => Ok((Sheet::new_log(), None)),
        }
    }

    async fn read_counter(&self, user_key: &str) -> Result<Option<u32>> {
        let Some((bytes, _)) = self.store.read(&counter_key(user_key)).await? else {
            return Ok(None);
        };

        let stored: StoredCounter = serde_json::from_slice(&bytes).unwrap_or_default();

        Ok(stored.next_chip)
    }

    async fn clear_counter(&self, user_key: &str) -> Result<()> {
        self.write_counter(user_key, None).await
    }

    async fn write_counter(&self, user_key: &str, next_chip: Option<u32>) -> Result<()> {
        let stored = StoredCounter { next_chip };
        let bytes = serde_json::to_vec(&stored).map_err(Error::storage)?;

        self.store
            .write(&counter_key(user_key), bytes.into(), WritePrecondition::None)
            .await?;

        Ok(())
    }
}
