//! REST API module.
//!
//! Serves the data store's collections and forwards writes through it. Every response carries
//! the backend revision so clients can tell whether their view is current.

mod datastore;
mod influencers;
mod records;
mod videos;

pub use datastore::*;
pub use influencers::*;
pub use records::*;
pub use videos::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: impl Into<AppError>, revision_id: i64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err.into(),
        revision_id,
    })
}

/// Current revision for a response envelope. A failed lookup is reported as revision 0.
pub(crate) async fn current_revision(state: &AppState) -> i64 {
    state.repo.get_revision_id().await.unwrap_or(0)
}

/// Reject a blank required text field.
pub(crate) fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Reject a patch that would blank a required text field.
pub(crate) fn require_if_present(value: Option<&String>, field: &str) -> Result<(), AppError> {
    match value {
        Some(value) => require(value, field),
        None => Ok(()),
    }
}
