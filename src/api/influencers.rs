//! Influencer profile link endpoints.
//!
//! Both sides of a link change together, so the response carries both committed rows instead of
//! leaving the caller to wait for the cache.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{current_revision, error, require, success, ApiResult};
use crate::models::{LinkInfluencerRequest, LinkedPair};
use crate::AppState;

/// POST /api/influencers/{id}/links - Link two profiles.
pub async fn link_influencer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<LinkInfluencerRequest>,
) -> ApiResult<LinkedPair> {
    let revision_id = current_revision(&state).await;

    if let Err(e) = require(&request.other_id, "Other id") {
        return error(e, revision_id);
    }

    match state.repo.link_influencers(&id, &request.other_id).await {
        Ok(pair) => success(pair, current_revision(&state).await),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/influencers/{id}/links/{other_id} - Unlink two profiles.
pub async fn unlink_influencer(
    State(state): State<AppState>,
    Path((id, other_id)): Path<(String, String)>,
) -> ApiResult<LinkedPair> {
    let revision_id = current_revision(&state).await;

    match state.repo.unlink_influencers(&id, &other_id).await {
        Ok(pair) => success(pair, current_revision(&state).await),
        Err(e) => error(e, revision_id),
    }
}
