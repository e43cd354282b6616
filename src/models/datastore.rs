//! Snapshot of the cached collections served to clients.

use serde::{Deserialize, Serialize};

use super::{Brand, BrandPoc, Campaign, CampaignInfluencer, Influencer, UserRole};

/// Every cached collection at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datastore {
    pub revision_id: i64,
    pub brands: Vec<Brand>,
    pub brand_pocs: Vec<BrandPoc>,
    pub campaigns: Vec<Campaign>,
    pub influencers: Vec<Influencer>,
    pub campaign_influencers: Vec<CampaignInfluencer>,
    pub user_roles: Vec<UserRole>,
    pub loading: LoadingFlags,
}

/// Per-collection loading flags. `true` until the first fetch resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFlags {
    pub brands: bool,
    pub brand_pocs: bool,
    pub campaigns: bool,
    pub influencers: bool,
    pub campaign_influencers: bool,
    pub user_roles: bool,
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
