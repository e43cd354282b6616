//! Influencer CRM Backend
//!
//! SQLite-backed tables with a per-table change feed, a data store that caches the CRM
//! collections and refreshes them on change, and a REST API over both.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod realtime;
mod store;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::SessionHandle;
use config::Config;
use db::Repository;
use models::{Brand, BrandPoc, Campaign, CampaignInfluencer, Influencer, UserRole};
use realtime::ChangeFeed;
use store::DataStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub store: Arc<DataStore<Repository>>,
    pub sessions: Arc<SessionHandle>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Influencer CRM Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (CRM_API_PSK). Authentication is disabled!");
    }

    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool, ChangeFeed::new(config.feed_capacity)));

    // The store loads and follows changes only while a session exists.
    let store = Arc::new(DataStore::new(Arc::clone(&repo)));
    let sessions = Arc::new(SessionHandle::new());
    let attachment = store.attach(sessions.subscribe());
    sessions.sign_in(&config.service_user);

    let state = AppState {
        repo,
        store,
        sessions: Arc::clone(&sessions),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.sign_out();
    attachment.detach().await;
    tracing::info!("Shut down");

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Datastore
        .route("/datastore", get(api::get_datastore))
        .route("/datastore/revision", get(api::get_revision))
        .route("/datastore/refresh", post(api::refresh_datastore))
        .route("/session", get(api::get_session))
        // Cached collections
        .merge(api::resource_routes::<Brand>("/brands"))
        .merge(api::resource_routes::<BrandPoc>("/brand-pocs"))
        .merge(api::resource_routes::<Campaign>("/campaigns"))
        .merge(api::resource_routes::<Influencer>("/influencers"))
        .merge(api::resource_routes::<CampaignInfluencer>(
            "/campaign-influencers",
        ))
        .merge(api::resource_routes::<UserRole>("/user-roles"))
        // Influencer links
        .route("/influencers/{id}/links", post(api::link_influencer))
        .route(
            "/influencers/{id}/links/{other_id}",
            delete(api::unlink_influencer),
        )
        // Videos
        .route("/campaigns/{id}/videos", get(api::list_campaign_videos))
        .route("/videos", post(api::create_video))
        .route("/videos/{id}", put(api::update_video).delete(api::delete_video))
        .layer(middleware::from_fn(move |req, next| {
            auth::require_api_key(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
