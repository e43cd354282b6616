//! Datastore API endpoints.

use axum::extract::State;

use super::{current_revision, error, success, ApiResult};
use crate::auth::Session;
use crate::errors::AppErrorWithRevision;
use crate::models::{Datastore, RevisionInfo};
use crate::AppState;

/// GET /api/datastore - Every cached collection with its loading flag.
pub async fn get_datastore(State(state): State<AppState>) -> ApiResult<Datastore> {
    let revision_id = current_revision(&state).await;
    success(state.store.snapshot(revision_id), revision_id)
}

/// GET /api/datastore/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_info = state
        .repo
        .get_revision_info()
        .await
        .map_err(|e| AppErrorWithRevision {
            error: e,
            revision_id: 0,
        })?;

    let revision_id = revision_info.revision_id;
    success(revision_info, revision_id)
}

/// POST /api/datastore/refresh - Refetch every collection now instead of waiting for a change.
pub async fn refresh_datastore(State(state): State<AppState>) -> ApiResult<Datastore> {
    let revision_id = current_revision(&state).await;

    match state.store.fetch_all().await {
        Ok(()) => success(state.store.snapshot(revision_id), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/session - The session the data store is loading for, if any.
pub async fn get_session(State(state): State<AppState>) -> ApiResult<Option<Session>> {
    let revision_id = current_revision(&state).await;
    success(state.sessions.current(), revision_id)
}
