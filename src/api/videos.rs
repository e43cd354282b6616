//! Campaign video endpoints. Videos are read per campaign straight from the repository.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{current_revision, error, require, require_if_present, success, ApiResult};
use crate::errors::AppError;
use crate::models::{CampaignVideo, CreateVideoRequest, UpdateVideoRequest};
use crate::AppState;

/// GET /api/campaigns/{id}/videos - Visible videos of a campaign.
pub async fn list_campaign_videos(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> ApiResult<Vec<CampaignVideo>> {
    let revision_id = current_revision(&state).await;

    match state.repo.get_campaign(&campaign_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error(
                AppError::NotFound(format!("Campaign {} not found", campaign_id)),
                revision_id,
            )
        }
        Err(e) => return error(e, revision_id),
    }

    match state.repo.list_campaign_videos(&campaign_id).await {
        Ok(videos) => success(videos, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/videos - Record a delivered video.
pub async fn create_video(
    State(state): State<AppState>,
    Json(request): Json<CreateVideoRequest>,
) -> ApiResult<CampaignVideo> {
    let revision_id = current_revision(&state).await;

    let valid = require(&request.campaign_id, "Campaign id").and_then(|_| require(&request.url, "URL"));
    if let Err(e) = valid {
        return error(e, revision_id);
    }

    match state.repo.create_video(&request).await {
        Ok(video) => success(video, current_revision(&state).await),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/videos/{id} - Update a video.
pub async fn update_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateVideoRequest>,
) -> ApiResult<CampaignVideo> {
    let revision_id = current_revision(&state).await;

    if let Err(e) = require_if_present(request.url.as_ref(), "URL") {
        return error(e, revision_id);
    }

    match state.repo.update_video(&id, &request).await {
        Ok(video) => success(video, current_revision(&state).await),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/videos/{id} - Soft-delete a video.
pub async fn delete_video(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let revision_id = current_revision(&state).await;

    match state.repo.soft_delete_video(&id).await {
        Ok(()) => success((), current_revision(&state).await),
        Err(e) => error(e, revision_id),
    }
}
