//! Shared application data store.
//!
//! Holds the brand, contact, campaign, influencer, assignment and role collections, exposes CRUD
//! per entity and keeps every collection fresh from the backend's change feed while a session is
//! present. Constructed once at start-up and handed to consumers by handle.

mod backend;
mod collection;

pub use backend::*;
pub use collection::*;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::Session;
use crate::errors::StoreError;
use crate::models::{
    Brand, BrandPoc, Campaign, CampaignInfluencer, Datastore, Influencer, LoadingFlags, UserRole,
};

/// Typed cache of every CRM collection.
pub struct DataStore<B> {
    backend: Arc<B>,
    brands: EntityStore<Brand, B>,
    brand_pocs: EntityStore<BrandPoc, B>,
    campaigns: EntityStore<Campaign, B>,
    influencers: EntityStore<Influencer, B>,
    campaign_influencers: EntityStore<CampaignInfluencer, B>,
    user_roles: EntityStore<UserRole, B>,
}

impl<B> Clone for DataStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            brands: self.brands.clone(),
            brand_pocs: self.brand_pocs.clone(),
            campaigns: self.campaigns.clone(),
            influencers: self.influencers.clone(),
            campaign_influencers: self.campaign_influencers.clone(),
            user_roles: self.user_roles.clone(),
        }
    }
}

impl<B: CrmBackend> DataStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            brands: EntityStore::new(Arc::clone(&backend)),
            brand_pocs: EntityStore::new(Arc::clone(&backend)),
            campaigns: EntityStore::new(Arc::clone(&backend)),
            influencers: EntityStore::new(Arc::clone(&backend)),
            campaign_influencers: EntityStore::new(Arc::clone(&backend)),
            user_roles: EntityStore::new(Arc::clone(&backend)),
            backend,
        }
    }

    pub fn brands(&self) -> &EntityStore<Brand, B> {
        &self.brands
    }

    pub fn brand_pocs(&self) -> &EntityStore<BrandPoc, B> {
        &self.brand_pocs
    }

    pub fn campaigns(&self) -> &EntityStore<Campaign, B> {
        &self.campaigns
    }

    pub fn influencers(&self) -> &EntityStore<Influencer, B> {
        &self.influencers
    }

    pub fn campaign_influencers(&self) -> &EntityStore<CampaignInfluencer, B> {
        &self.campaign_influencers
    }

    pub fn user_roles(&self) -> &EntityStore<UserRole, B> {
        &self.user_roles
    }

    /// Refetch every collection concurrently. Returns the first failure once all have resolved.
    pub async fn fetch_all(&self) -> Result<(), StoreError> {
        let (brands, brand_pocs, campaigns, influencers, campaign_influencers, user_roles) = tokio::join!(
            self.brands.fetch_all(),
            self.brand_pocs.fetch_all(),
            self.campaigns.fetch_all(),
            self.influencers.fetch_all(),
            self.campaign_influencers.fetch_all(),
            self.user_roles.fetch_all(),
        );
        brands?;
        brand_pocs?;
        campaigns?;
        influencers?;
        campaign_influencers?;
        user_roles?;
        Ok(())
    }

    /// Open one change subscription per cached table.
    fn open_channels(&self) -> Vec<Subscription> {
        let backend = &*self.backend;
        vec![
            self.brands.subscribe(backend.subscribe(Brand::TABLE)),
            self.brand_pocs.subscribe(backend.subscribe(BrandPoc::TABLE)),
            self.campaigns.subscribe(backend.subscribe(Campaign::TABLE)),
            self.influencers.subscribe(backend.subscribe(Influencer::TABLE)),
            self.campaign_influencers
                .subscribe(backend.subscribe(CampaignInfluencer::TABLE)),
            self.user_roles.subscribe(backend.subscribe(UserRole::TABLE)),
        ]
    }

    /// Follow the session: load and subscribe while signed in, release everything otherwise.
    ///
    /// The returned guard stops following when dropped.
    pub fn attach(&self, sessions: watch::Receiver<Option<Session>>) -> Attachment {
        let store = self.clone();
        Attachment {
            handle: tokio::spawn(store.follow_session(sessions)),
        }
    }

    async fn follow_session(self, mut sessions: watch::Receiver<Option<Session>>) {
        loop {
            let session = sessions.borrow_and_update().clone();
            let channels = match session {
                Some(session) => {
                    tracing::info!(user_id = %session.user_id, "Session available, loading data store");
                    // Subscribe before the initial load so no change slips between the two.
                    let channels = self.open_channels();
                    if let Err(err) = self.fetch_all().await {
                        tracing::warn!(error = %err, "Initial data store load incomplete");
                    }
                    Some(channels)
                }
                None => {
                    tracing::info!("No session, data store idle");
                    None
                }
            };

            if sessions.changed().await.is_err() {
                tracing::debug!("Session source closed");
                break;
            }
            if let Some(channels) = channels {
                tracing::info!(count = channels.len(), "Session changed, closing change channels");
            }
        }
    }

    /// Copy of every collection for serving.
    pub fn snapshot(&self, revision_id: i64) -> Datastore {
        Datastore {
            revision_id,
            brands: self.brands.rows().to_vec(),
            brand_pocs: self.brand_pocs.rows().to_vec(),
            campaigns: self.campaigns.rows().to_vec(),
            influencers: self.influencers.rows().to_vec(),
            campaign_influencers: self.campaign_influencers.rows().to_vec(),
            user_roles: self.user_roles.rows().to_vec(),
            loading: self.loading_flags(),
        }
    }

    pub fn loading_flags(&self) -> LoadingFlags {
        LoadingFlags {
            brands: self.brands.is_loading(),
            brand_pocs: self.brand_pocs.is_loading(),
            campaigns: self.campaigns.is_loading(),
            influencers: self.influencers.is_loading(),
            campaign_influencers: self.campaign_influencers.is_loading(),
            user_roles: self.user_roles.is_loading(),
        }
    }
}

/// Keeps a data store following a session. Dropping it releases every subscription.
#[derive(Debug)]
pub struct Attachment {
    handle: JoinHandle<()>,
}

impl Attachment {
    /// Stop following and wait until every subscription is released.
    pub async fn detach(mut self) {
        self.handle.abort();
        // Cancellation is the expected outcome here.
        let _ = (&mut self.handle).await;
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests;
