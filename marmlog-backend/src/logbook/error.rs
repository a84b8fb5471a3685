use serde::Serialize;
use valuable::Valuable;

#[derive(thiserror::Error, Debug, Serialize, Valuable, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error("missing required field: {field}")]
    MissingField { field: String },
    #[error("malformed field {field}: {reason}")]
    MalformedField { field: String, reason: String },
    #[error("unknown donor: {name}")]
    UnknownDonor { name: String },
    #[error("unparseable date: {input}")]
    DateParse { input: String },
    #[error("unrecognized sequencing index: {input}")]
    IndexFormat { input: String },
    #[error("log {key} was modified by another submission")]
    VersionConflict { key: String },
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl Error {
    pub(crate) fn malformed(field: &str, reason: impl ToString) -> Self {
        Self::MalformedField {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn storage(err: impl std::error::Error) -> Self {
        Self::Storage {
            message: format!("{err:?}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::storage(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
