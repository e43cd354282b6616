//! CRUD endpoints shared by every cached collection.
//!
//! Reads come from the data store's cache; writes go through the store to the backend and show
//! up in the cache once the change feed has triggered a refresh.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use super::{current_revision, error, require, require_if_present, success, ApiResult};
use crate::db::{check_dates, Repository};
use crate::errors::AppError;
use crate::models::{
    Brand, BrandPoc, Campaign, CampaignInfluencer, CreateBrandPocRequest, CreateBrandRequest,
    CreateCampaignInfluencerRequest, CreateCampaignRequest, CreateInfluencerRequest,
    CreateUserRoleRequest, Influencer, UpdateBrandPocRequest, UpdateBrandRequest,
    UpdateCampaignRequest, UpdateInfluencerRequest, UpdateUserRoleRequest, UserRole,
};
use crate::store::{Backend, DataStore, EntityStore, Record};
use crate::AppState;

/// A collection exposed over HTTP.
pub trait Resource: Record {
    /// Human-readable name used in error messages.
    const NAME: &'static str;

    fn store(store: &DataStore<Repository>) -> &EntityStore<Self, Repository>;

    fn validate_create(_request: &Self::Create) -> Result<(), AppError> {
        Ok(())
    }

    fn validate_update(_request: &Self::Update) -> Result<(), AppError> {
        Ok(())
    }
}

impl Resource for Brand {
    const NAME: &'static str = "Brand";

    fn store(store: &DataStore<Repository>) -> &EntityStore<Self, Repository> {
        store.brands()
    }

    fn validate_create(request: &CreateBrandRequest) -> Result<(), AppError> {
        require(&request.name, "Name")
    }

    fn validate_update(request: &UpdateBrandRequest) -> Result<(), AppError> {
        require_if_present(request.name.as_ref(), "Name")
    }
}

impl Resource for BrandPoc {
    const NAME: &'static str = "Brand contact";

    fn store(store: &DataStore<Repository>) -> &EntityStore<Self, Repository> {
        store.brand_pocs()
    }

    fn validate_create(request: &CreateBrandPocRequest) -> Result<(), AppError> {
        require(&request.brand_id, "Brand id")?;
        require(&request.name, "Name")
    }

    fn validate_update(request: &UpdateBrandPocRequest) -> Result<(), AppError> {
        require_if_present(request.name.as_ref(), "Name")
    }
}

impl Resource for Campaign {
    const NAME: &'static str = "Campaign";

    fn store(store: &DataStore<Repository>) -> &EntityStore<Self, Repository> {
        store.campaigns()
    }

    fn validate_create(request: &CreateCampaignRequest) -> Result<(), AppError> {
        require(&request.brand_id, "Brand id")?;
        require(&request.name, "Name")?;
        check_dates(request.start_date, request.end_date)
    }

    fn validate_update(request: &UpdateCampaignRequest) -> Result<(), AppError> {
        require_if_present(request.brand_id.as_ref(), "Brand id")?;
        require_if_present(request.name.as_ref(), "Name")?;
        check_dates(request.start_date, request.end_date)
    }
}

impl Resource for Influencer {
    const NAME: &'static str = "Influencer";

    fn store(store: &DataStore<Repository>) -> &EntityStore<Self, Repository> {
        store.influencers()
    }

    fn validate_create(request: &CreateInfluencerRequest) -> Result<(), AppError> {
        require(&request.name, "Name")
    }

    fn validate_update(request: &UpdateInfluencerRequest) -> Result<(), AppError> {
        require_if_present(request.name.as_ref(), "Name")
    }
}

impl Resource for CampaignInfluencer {
    const NAME: &'static str = "Campaign influencer";

    fn store(store: &DataStore<Repository>) -> &EntityStore<Self, Repository> {
        store.campaign_influencers()
    }

    fn validate_create(request: &CreateCampaignInfluencerRequest) -> Result<(), AppError> {
        require(&request.campaign_id, "Campaign id")?;
        require(&request.influencer_id, "Influencer id")
    }
}

impl Resource for UserRole {
    const NAME: &'static str = "User role";

    fn store(store: &DataStore<Repository>) -> &EntityStore<Self, Repository> {
        store.user_roles()
    }

    fn validate_create(request: &CreateUserRoleRequest) -> Result<(), AppError> {
        require(&request.user_id, "User id")?;
        require(&request.role, "Role")
    }

    fn validate_update(request: &UpdateUserRoleRequest) -> Result<(), AppError> {
        require_if_present(request.role.as_ref(), "Role")
    }
}

/// `GET /` and `POST /` on `path`, plus `GET`, `PUT` and `DELETE` on `path/{id}`.
pub fn resource_routes<R: Resource>(path: &str) -> Router<AppState>
where
    Repository: Backend<R>,
{
    Router::new()
        .route(path, get(list_records::<R>).post(create_record::<R>))
        .route(
            &format!("{}/{{id}}", path),
            get(get_record::<R>)
                .put(update_record::<R>)
                .delete(delete_record::<R>),
        )
}

/// GET - List the cached rows.
pub async fn list_records<R: Resource>(State(state): State<AppState>) -> ApiResult<Vec<R>>
where
    Repository: Backend<R>,
{
    let revision_id = current_revision(&state).await;
    success(R::store(&state.store).rows().to_vec(), revision_id)
}

/// GET /{id} - One cached row.
pub async fn get_record<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<R>
where
    Repository: Backend<R>,
{
    let revision_id = current_revision(&state).await;

    match R::store(&state.store).get(&id) {
        Some(row) => success(row, revision_id),
        None => error(
            AppError::NotFound(format!("{} {} not found", R::NAME, id)),
            revision_id,
        ),
    }
}

/// POST - Insert a row.
pub async fn create_record<R: Resource>(
    State(state): State<AppState>,
    Json(request): Json<R::Create>,
) -> ApiResult<R>
where
    Repository: Backend<R>,
{
    let revision_id = current_revision(&state).await;

    if let Err(e) = R::validate_create(&request) {
        return error(e, revision_id);
    }

    match R::store(&state.store).add(&request).await {
        Ok(row) => success(row, current_revision(&state).await),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /{id} - Partially update a row.
pub async fn update_record<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<R::Update>,
) -> ApiResult<R>
where
    Repository: Backend<R>,
{
    let revision_id = current_revision(&state).await;

    if let Err(e) = R::validate_update(&patch) {
        return error(e, revision_id);
    }

    match R::store(&state.store).update(&id, &patch).await {
        Ok(row) => success(row, current_revision(&state).await),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /{id} - Delete a row.
pub async fn delete_record<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()>
where
    Repository: Backend<R>,
{
    let revision_id = current_revision(&state).await;

    match R::store(&state.store).delete(&id).await {
        Ok(()) => success((), current_revision(&state).await),
        Err(e) => error(e, revision_id),
    }
}
