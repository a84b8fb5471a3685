use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use valuable::Valuable;

use crate::logbook;

#[derive(thiserror::Error, Serialize, Debug, Clone, Valuable)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error(transparent)]
    Logbook(#[from] logbook::error::Error),
    #[error("{reason}")]
    InvalidData { reason: String },
    #[error("malformed request")]
    MalformedRequest {
        #[serde(skip)]
        #[valuable(skip)]
        status: StatusCode,
        message: String,
    },
}

impl Error {
    fn status_code(&self) -> StatusCode {
        use Error::{InvalidData, Logbook, MalformedRequest};
        use logbook::error::Error::{
            DateParse, IndexFormat, MalformedField, MissingField, Storage, UnknownDonor,
            VersionConflict,
        };

        match self {
            InvalidData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            MalformedRequest { status, .. } => *status,
            Logbook(inner) => match inner {
                MissingField { .. }
                | MalformedField { .. }
                | UnknownDonor { .. }
                | DateParse { .. }
                | IndexFormat { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                VersionConflict { .. } => StatusCode::CONFLICT,
                Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(err: JsonRejection) -> Self {
        Self::MalformedRequest {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<garde::Report> for Error {
    fn from(err: garde::Report) -> Self {
        // The first entry names the first missing or invalid field
        let reason = err
            .iter()
            .next()
            .map_or_else(|| format!("{err:#}"), |(path, e)| format!("{path}: {e}"));

        Self::InvalidData { reason }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        tracing::error!(error = self.as_value());

        #[derive(Serialize)]
        struct ErrorResponse {
            success: bool,
            status: u16,
            reason: String,
            error: Option<Error>,
        }

        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return (
                status,
                axum::Json(ErrorResponse {
                    success: false,
                    status: status.as_u16(),
                    reason: "internal server error".to_string(),
                    error: None,
                }),
            )
                .into_response();
        }

        (
            status,
            axum::Json(ErrorResponse {
                success: false,
                status: status.as_u16(),
                reason: self.to_string(),
                error: Some(self),
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
