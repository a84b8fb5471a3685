use axum::{
    Json,
    extract::{FromRequest, Query, State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use valuable::Valuable;

use crate::{
    logbook::{SubmissionReceipt, submission::SubmissionForm},
    server::AppState,
};

use super::error::{Error, Result};

pub(super) struct ValidJson<T>(T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Validate,
    <T as Validate>::Context: std::default::Default,
{
    type Rejection = Error;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let axum::Json(data) = axum::Json::<T>::from_request(req, state).await?;
        data.validate()?;

        Ok(Self(data))
    }
}

pub(super) async fn submit(
    State(app_state): State<AppState>,
    ValidJson(form): ValidJson<SubmissionForm>,
) -> Result<Json<SubmissionReceipt>> {
    tracing::debug!(deserialized_form = form.as_value());

    let receipt = app_state.logbook().submit(&form).await?;

    Ok(Json(receipt))
}

#[derive(Deserialize, Validate)]
pub(super) struct UserParams {
    #[garde(length(min = 1))]
    user: String,
}

pub(super) async fn download(
    State(app_state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<Response> {
    params.validate()?;

    let log = app_state.logbook().download(&params.user).await?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", log.filename),
        ),
    ];

    Ok((headers, log.bytes).into_response())
}

#[derive(Serialize)]
pub(super) struct CounterResponse {
    success: bool,
    next_chip: Option<u32>,
}

pub(super) async fn get_counter(
    State(app_state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<Json<CounterResponse>> {
    params.validate()?;

    let next_chip = app_state.logbook().next_chip(&params.user).await?;

    Ok(Json(CounterResponse {
        success: true,
        next_chip,
    }))
}

#[derive(Deserialize, Validate, Valuable)]
pub(super) struct CounterUpdate {
    #[garde(length(min = 1))]
    user: String,
    #[garde(skip)]
    next_chip: u32,
}

pub(super) async fn update_counter(
    State(app_state): State<AppState>,
    ValidJson(update): ValidJson<CounterUpdate>,
) -> Result<Json<CounterResponse>> {
    tracing::info!(counter_update = update.as_value());

    let CounterUpdate { user, next_chip } = update;
    app_state.logbook().set_next_chip(&user, next_chip).await?;

    Ok(Json(CounterResponse {
        success: true,
        next_chip: Some(next_chip),
    }))
}
