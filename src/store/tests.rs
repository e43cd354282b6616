use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{broadcast, Notify};
use tokio::time::{sleep, timeout};

use super::*;
use crate::auth::SessionHandle;
use crate::db::{init_database, Repository};
use crate::errors::AppError;
use crate::models::{
    Brand, CreateBrandPocRequest, CreateBrandRequest, CreateCampaignInfluencerRequest,
    CreateCampaignRequest, CreateInfluencerRequest, CreateUserRoleRequest, UpdateBrandPocRequest,
    UpdateBrandRequest, UpdateCampaignInfluencerRequest, UpdateCampaignRequest,
    UpdateInfluencerRequest, UpdateUserRoleRequest,
};
use crate::realtime::{ChangeEvent, ChangeFeed, Table};

async fn repository() -> (Arc<Repository>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&dir.path().join("crm.sqlite"))
        .await
        .expect("Failed to init DB");
    (Arc::new(Repository::new(pool, ChangeFeed::new(64))), dir)
}

fn brand_request(name: &str) -> CreateBrandRequest {
    CreateBrandRequest {
        name: name.to_string(),
        ..Default::default()
    }
}

/// Poll until `check` holds, failing the test after a few seconds.
async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Add, update and delete one row, refetching after each step.
async fn assert_crud_cycle<R, B>(
    store: &EntityStore<R, B>,
    create: R::Create,
    patch: R::Update,
    patched: impl Fn(&R, &R) -> bool,
) where
    R: Record + PartialEq + Debug,
    B: Backend<R>,
{
    let created = store.add(&create).await.unwrap();
    assert!(!created.id().is_empty());
    store.fetch_all().await.unwrap();
    assert_eq!(store.get(created.id()).as_ref(), Some(&created));

    let updated = store.update(created.id(), &patch).await.unwrap();
    assert!(patched(&created, &updated), "patch not applied: {:?}", updated);
    store.fetch_all().await.unwrap();
    assert_eq!(store.get(created.id()).as_ref(), Some(&updated));

    store.delete(created.id()).await.unwrap();
    store.fetch_all().await.unwrap();
    assert!(store.get(created.id()).is_none());
}

/// Repository wrapper whose calls can be switched to fail.
struct FlakyBackend {
    inner: Repository,
    failing: AtomicBool,
}

impl FlakyBackend {
    fn new(inner: Repository) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::Database("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<R> Backend<R> for FlakyBackend
where
    R: Record,
    Repository: Backend<R>,
{
    async fn fetch_all(&self) -> Result<Vec<R>, AppError> {
        self.check()?;
        <Repository as Backend<R>>::fetch_all(&self.inner).await
    }

    async fn insert(&self, payload: &R::Create) -> Result<R, AppError> {
        self.check()?;
        <Repository as Backend<R>>::insert(&self.inner, payload).await
    }

    async fn update(&self, id: &str, patch: &R::Update) -> Result<R, AppError> {
        self.check()?;
        <Repository as Backend<R>>::update(&self.inner, id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.check()?;
        <Repository as Backend<R>>::delete(&self.inner, id).await
    }
}

impl ChangeSource for FlakyBackend {
    fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        self.inner.subscribe(table)
    }
}

#[tokio::test]
async fn test_brand_scenario() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(repo);
    let brands = store.brands();

    let acme = brands.add(&brand_request("Acme")).await.unwrap();
    brands.fetch_all().await.unwrap();
    let rows = brands.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Acme");
    assert_eq!(rows[0].id, acme.id);

    brands
        .update(
            &acme.id,
            &UpdateBrandRequest {
                industry: Some("Tech".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    brands.fetch_all().await.unwrap();
    let stored = brands.get(&acme.id).unwrap();
    assert_eq!(stored.name, "Acme");
    assert_eq!(stored.industry.as_deref(), Some("Tech"));

    brands.delete(&acme.id).await.unwrap();
    brands.fetch_all().await.unwrap();
    assert!(brands.get(&acme.id).is_none());
    assert!(brands.rows().is_empty());
}

#[tokio::test]
async fn test_crud_cycle_for_every_collection() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(Arc::clone(&repo));

    assert_crud_cycle(
        store.brands(),
        brand_request("Globex"),
        UpdateBrandRequest {
            website: Some("https://globex.test".to_string()),
            ..Default::default()
        },
        |before, after| {
            after.website.as_deref() == Some("https://globex.test") && after.name == before.name
        },
    )
    .await;

    let brand = repo.create_brand(&brand_request("Acme")).await.unwrap();

    assert_crud_cycle(
        store.brand_pocs(),
        CreateBrandPocRequest {
            brand_id: brand.id.clone(),
            name: "Pat".to_string(),
            email: Some("pat@acme.test".to_string()),
            ..Default::default()
        },
        UpdateBrandPocRequest {
            is_primary: Some(true),
            ..Default::default()
        },
        |before, after| after.is_primary && after.email == before.email,
    )
    .await;

    assert_crud_cycle(
        store.campaigns(),
        CreateCampaignRequest {
            brand_id: brand.id.clone(),
            name: "Launch".to_string(),
            budget: Some(12_500.0),
            ..Default::default()
        },
        UpdateCampaignRequest {
            status: Some("live".to_string()),
            ..Default::default()
        },
        |before, after| after.status == "live" && after.budget == before.budget,
    )
    .await;

    assert_crud_cycle(
        store.influencers(),
        CreateInfluencerRequest {
            name: "Sam".to_string(),
            social_handle: Some("@sam".to_string()),
            ..Default::default()
        },
        UpdateInfluencerRequest {
            follower_count: Some(120_000),
            ..Default::default()
        },
        |before, after| {
            after.follower_count == Some(120_000) && after.social_handle == before.social_handle
        },
    )
    .await;

    let campaign = repo
        .create_campaign(&CreateCampaignRequest {
            brand_id: brand.id.clone(),
            name: "Holiday".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let influencer = repo
        .create_influencer(&CreateInfluencerRequest {
            name: "Lee".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_crud_cycle(
        store.campaign_influencers(),
        CreateCampaignInfluencerRequest {
            campaign_id: campaign.id.clone(),
            influencer_id: influencer.id.clone(),
            fee: Some(800.0),
            ..Default::default()
        },
        UpdateCampaignInfluencerRequest {
            status: Some("confirmed".to_string()),
            ..Default::default()
        },
        |before, after| after.status.as_deref() == Some("confirmed") && after.fee == before.fee,
    )
    .await;

    assert_crud_cycle(
        store.user_roles(),
        CreateUserRoleRequest {
            user_id: "user-7".to_string(),
            role: "manager".to_string(),
            permissions: vec!["campaigns:write".to_string()],
        },
        UpdateUserRoleRequest {
            role: Some("admin".to_string()),
            ..Default::default()
        },
        |before, after| after.role == "admin" && after.permissions == before.permissions,
    )
    .await;
}

#[tokio::test]
async fn test_add_leaves_collection_for_next_refresh() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(repo);

    store.brands().add(&brand_request("Acme")).await.unwrap();

    assert!(store.brands().rows().is_empty());
    assert!(store.brands().is_loading());
}

#[tokio::test]
async fn test_failed_calls_leave_collection_untouched() {
    let (repo, _dir) = repository().await;
    let backend = Arc::new(FlakyBackend::new((*repo).clone()));
    let store = DataStore::new(Arc::clone(&backend));
    let brands = store.brands();

    let acme = brands.add(&brand_request("Acme")).await.unwrap();
    brands.fetch_all().await.unwrap();
    assert_eq!(brands.rows().len(), 1);

    backend.set_failing(true);
    repo.create_brand(&brand_request("Globex")).await.unwrap();

    let err = brands.fetch_all().await.unwrap_err();
    assert_eq!(err.table(), Table::Brands);
    assert_eq!(brands.rows().len(), 1);
    assert_eq!(brands.rows()[0].id, acme.id);

    assert!(brands.add(&brand_request("Initech")).await.is_err());
    assert!(brands
        .update(&acme.id, &UpdateBrandRequest::default())
        .await
        .is_err());
    assert!(brands.delete(&acme.id).await.is_err());
    assert_eq!(brands.rows().len(), 1);

    backend.set_failing(false);
    brands.fetch_all().await.unwrap();
    assert_eq!(brands.rows().len(), 2);
}

#[tokio::test]
async fn test_loading_flag_clears_once_even_on_failure() {
    let (repo, _dir) = repository().await;
    let backend = Arc::new(FlakyBackend::new((*repo).clone()));
    let store = DataStore::new(Arc::clone(&backend));
    let campaigns = store.campaigns();
    let mut rx = campaigns.watch();

    assert!(campaigns.is_loading());
    assert!(store.loading_flags().campaigns);

    backend.set_failing(true);
    assert!(campaigns.fetch_all().await.is_err());
    assert!(!campaigns.is_loading());
    assert!(rx.has_changed().unwrap());
    rx.borrow_and_update();

    // A second failure changes nothing observable.
    assert!(campaigns.fetch_all().await.is_err());
    assert!(!rx.has_changed().unwrap());

    backend.set_failing(false);
    campaigns.fetch_all().await.unwrap();
    assert!(!campaigns.is_loading());
    assert!(!store.loading_flags().campaigns);
    assert!(store.loading_flags().brands);
}

/// Repository wrapper that can park one fetch after it has read its rows.
struct GatedBackend {
    inner: Repository,
    hold_next: AtomicBool,
    parked: Notify,
    release: Notify,
}

impl GatedBackend {
    fn new(inner: Repository) -> Self {
        Self {
            inner,
            hold_next: AtomicBool::new(false),
            parked: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl<R> Backend<R> for GatedBackend
where
    R: Record,
    Repository: Backend<R>,
{
    async fn fetch_all(&self) -> Result<Vec<R>, AppError> {
        let rows = <Repository as Backend<R>>::fetch_all(&self.inner).await?;
        if self.hold_next.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.release.notified().await;
        }
        Ok(rows)
    }

    async fn insert(&self, payload: &R::Create) -> Result<R, AppError> {
        <Repository as Backend<R>>::insert(&self.inner, payload).await
    }

    async fn update(&self, id: &str, patch: &R::Update) -> Result<R, AppError> {
        <Repository as Backend<R>>::update(&self.inner, id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        <Repository as Backend<R>>::delete(&self.inner, id).await
    }
}

#[tokio::test]
async fn test_stale_fetch_never_overwrites_newer_rows() {
    let (repo, _dir) = repository().await;
    let backend = Arc::new(GatedBackend::new((*repo).clone()));
    let brands: EntityStore<Brand, GatedBackend> = EntityStore::new(Arc::clone(&backend));

    // The first fetch reads an empty table, then stalls.
    backend.hold_next.store(true, Ordering::SeqCst);
    let stale = tokio::spawn({
        let brands = brands.clone();
        async move { brands.fetch_all().await }
    });
    backend.parked.notified().await;

    repo.create_brand(&brand_request("Acme")).await.unwrap();
    brands.fetch_all().await.unwrap();
    assert_eq!(brands.rows().len(), 1);
    assert_eq!(brands.watch().borrow().applied(), 2);

    let mut rx = brands.watch();
    rx.borrow_and_update();
    backend.release.notify_one();
    stale.await.unwrap().unwrap();

    assert_eq!(brands.rows().len(), 1);
    assert_eq!(brands.rows()[0].name, "Acme");
    assert_eq!(rx.borrow().applied(), 2);
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_fetch_all_loads_every_collection() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(Arc::clone(&repo));
    repo.create_brand(&brand_request("Acme")).await.unwrap();

    store.fetch_all().await.unwrap();

    let flags = store.loading_flags();
    assert!(!flags.brands && !flags.brand_pocs && !flags.campaigns);
    assert!(!flags.influencers && !flags.campaign_influencers && !flags.user_roles);

    let snapshot = store.snapshot(42);
    assert_eq!(snapshot.revision_id, 42);
    assert_eq!(snapshot.brands.len(), 1);
    assert!(snapshot.campaigns.is_empty());
}

#[tokio::test]
async fn test_change_feed_refreshes_attached_store() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(Arc::clone(&repo));
    let sessions = SessionHandle::new();
    sessions.sign_in("user-1");

    let attachment = store.attach(sessions.subscribe());
    let mut brands_rx = store.brands().watch();
    timeout(Duration::from_secs(5), brands_rx.wait_for(|state| !state.loading))
        .await
        .unwrap()
        .unwrap();

    let brand = repo.create_brand(&brand_request("Acme")).await.unwrap();
    timeout(
        Duration::from_secs(5),
        brands_rx.wait_for(|state| state.rows.iter().any(|b| b.id == brand.id)),
    )
    .await
    .unwrap()
    .unwrap();

    repo.update_brand(
        &brand.id,
        &UpdateBrandRequest {
            industry: Some("Tech".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    timeout(
        Duration::from_secs(5),
        brands_rx.wait_for(|state| {
            state
                .rows
                .iter()
                .any(|b| b.industry.as_deref() == Some("Tech"))
        }),
    )
    .await
    .unwrap()
    .unwrap();

    attachment.detach().await;
}

#[tokio::test]
async fn test_linking_refreshes_both_profiles() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(Arc::clone(&repo));
    let sessions = SessionHandle::new();
    sessions.sign_in("user-1");
    let _attachment = store.attach(sessions.subscribe());

    let a = repo
        .create_influencer(&CreateInfluencerRequest {
            name: "Ana".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let b = repo
        .create_influencer(&CreateInfluencerRequest {
            name: "Ana alt".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    repo.link_influencers(&a.id, &b.id).await.unwrap();

    let influencers = store.influencers().clone();
    eventually(|| {
        let linked = |id: &str, other: &str| {
            influencers
                .get(id)
                .is_some_and(|row| row.linked_profiles.contains(other))
        };
        linked(&a.id, &b.id) && linked(&b.id, &a.id)
    })
    .await;
}

#[tokio::test]
async fn test_signed_out_store_stays_idle() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(Arc::clone(&repo));
    let sessions = SessionHandle::new();

    let _attachment = store.attach(sessions.subscribe());
    sleep(Duration::from_millis(50)).await;

    assert!(store.brands().is_loading());
    assert_eq!(repo.feed().subscriber_count(Table::Brands), 0);

    sessions.sign_in("user-1");
    let feed = repo.feed().clone();
    eventually(|| feed.subscriber_count(Table::Brands) == 1).await;
    eventually(|| !store.brands().is_loading()).await;
}

#[tokio::test]
async fn test_sign_out_releases_subscriptions() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(Arc::clone(&repo));
    let sessions = SessionHandle::new();
    sessions.sign_in("user-1");
    let _attachment = store.attach(sessions.subscribe());

    let feed = repo.feed().clone();
    eventually(|| Table::ALL[..6].iter().all(|t| feed.subscriber_count(*t) == 1)).await;
    eventually(|| !store.user_roles().is_loading()).await;

    sessions.sign_out();
    eventually(|| Table::ALL.iter().all(|t| feed.subscriber_count(*t) == 0)).await;

    repo.create_brand(&brand_request("Acme")).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(store.brands().rows().is_empty());
}

#[tokio::test]
async fn test_detach_releases_subscriptions() {
    let (repo, _dir) = repository().await;
    let store = DataStore::new(Arc::clone(&repo));
    let sessions = SessionHandle::new();
    sessions.sign_in("user-1");
    let attachment = store.attach(sessions.subscribe());

    let feed = repo.feed().clone();
    eventually(|| feed.subscriber_count(Table::Campaigns) == 1).await;

    attachment.detach().await;
    eventually(|| feed.subscriber_count(Table::Campaigns) == 0).await;
}
