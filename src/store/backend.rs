//! The seam between the data store and whatever owns the tables.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{
    Brand, BrandPoc, Campaign, CampaignInfluencer, CreateBrandPocRequest, CreateBrandRequest,
    CreateCampaignInfluencerRequest, CreateCampaignRequest, CreateInfluencerRequest,
    CreateUserRoleRequest, Influencer, UpdateBrandPocRequest, UpdateBrandRequest,
    UpdateCampaignInfluencerRequest, UpdateCampaignRequest, UpdateInfluencerRequest,
    UpdateUserRoleRequest, UserRole,
};
use crate::realtime::{ChangeEvent, Table};

/// A row type cached by the data store.
pub trait Record: Clone + Serialize + Send + Sync + 'static {
    /// Insert payload.
    type Create: DeserializeOwned + Send + Sync + 'static;
    /// Partial update payload.
    type Update: DeserializeOwned + Send + Sync + 'static;

    const TABLE: Table;

    fn id(&self) -> &str;
}

/// CRUD access to one table.
#[async_trait]
pub trait Backend<R: Record>: Send + Sync + 'static {
    async fn fetch_all(&self) -> Result<Vec<R>, AppError>;
    async fn insert(&self, payload: &R::Create) -> Result<R, AppError>;
    async fn update(&self, id: &str, patch: &R::Update) -> Result<R, AppError>;
    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

/// Source of per-table change notifications.
pub trait ChangeSource: Send + Sync + 'static {
    fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent>;
}

/// Everything the data store needs from its backend.
pub trait CrmBackend:
    Backend<Brand>
    + Backend<BrandPoc>
    + Backend<Campaign>
    + Backend<Influencer>
    + Backend<CampaignInfluencer>
    + Backend<UserRole>
    + ChangeSource
{
}

impl<T> CrmBackend for T where
    T: Backend<Brand>
        + Backend<BrandPoc>
        + Backend<Campaign>
        + Backend<Influencer>
        + Backend<CampaignInfluencer>
        + Backend<UserRole>
        + ChangeSource
{
}

impl ChangeSource for Repository {
    fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        Repository::subscribe(self, table)
    }
}

/// Wire a record type to its table and repository operations.
macro_rules! repository_backend {
    (
        $record:ty, $table:expr, create: $create:ty, update: $update:ty,
        list: $list:ident, insert: $insert:ident, patch: $patch:ident, delete: $delete:ident
    ) => {
        impl Record for $record {
            type Create = $create;
            type Update = $update;

            const TABLE: Table = $table;

            fn id(&self) -> &str {
                &self.id
            }
        }

        #[async_trait]
        impl Backend<$record> for Repository {
            async fn fetch_all(&self) -> Result<Vec<$record>, AppError> {
                self.$list().await
            }

            async fn insert(&self, payload: &$create) -> Result<$record, AppError> {
                self.$insert(payload).await
            }

            async fn update(&self, id: &str, patch: &$update) -> Result<$record, AppError> {
                self.$patch(id, patch).await
            }

            async fn delete(&self, id: &str) -> Result<(), AppError> {
                self.$delete(id).await
            }
        }
    };
}

repository_backend!(
    Brand, Table::Brands,
    create: CreateBrandRequest, update: UpdateBrandRequest,
    list: list_brands, insert: create_brand, patch: update_brand, delete: delete_brand
);

repository_backend!(
    BrandPoc, Table::BrandPocs,
    create: CreateBrandPocRequest, update: UpdateBrandPocRequest,
    list: list_brand_pocs, insert: create_brand_poc, patch: update_brand_poc, delete: delete_brand_poc
);

repository_backend!(
    Campaign, Table::Campaigns,
    create: CreateCampaignRequest, update: UpdateCampaignRequest,
    list: list_campaigns, insert: create_campaign, patch: update_campaign, delete: delete_campaign
);

repository_backend!(
    Influencer, Table::Influencers,
    create: CreateInfluencerRequest, update: UpdateInfluencerRequest,
    list: list_influencers, insert: create_influencer, patch: update_influencer, delete: delete_influencer
);

repository_backend!(
    CampaignInfluencer, Table::CampaignInfluencers,
    create: CreateCampaignInfluencerRequest, update: UpdateCampaignInfluencerRequest,
    list: list_campaign_influencers, insert: create_campaign_influencer,
    patch: update_campaign_influencer, delete: delete_campaign_influencer
);

repository_backend!(
    UserRole, Table::UserRoles,
    create: CreateUserRoleRequest, update: UpdateUserRoleRequest,
    list: list_user_roles, insert: create_user_role, patch: update_user_role, delete: delete_user_role
);
