mod config;
mod db;
mod metrics;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, RunMode};
use crate::db::{create_pool, run_migrations, MediaStore, PgStore};
use crate::services::{
    catalog::CatalogService,
    endpoint::{Endpoint, EndpointResolver},
    http::{HttpFetch, ReqwestFetcher},
    omdb::OmdbClient,
    provider_urls::ProviderUrls,
    providers::{redecanais, superflix, ContentProvider, ProviderRegistry, RedeCanais, SuperflixApi},
    scheduler::{start_endpoint_task, start_sweep_task, start_sync_task, SchedulerConfig},
    streams::StreamService,
    tmdb::{CatalogApi, TmdbClient, TmdbSettings},
    trending::{CatalogSynchronizer, RetryPolicy, SyncSettings, TrendingIndex},
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub resolver: Arc<EndpointResolver>,
    pub catalog: Arc<CatalogService>,
    pub streams: Arc<StreamService>,
    pub sync: Arc<CatalogSynchronizer>,
    pub tmdb: Arc<TmdbClient>,
    pub omdb: Arc<OmdbClient>,
    pub start_time: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinestream_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        anyhow::bail!("invalid configuration: {}", e);
    }
    let port = config.port;
    let mode = config.run_mode();

    tracing::info!("Starting CineStream Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {} ({:?})", config.node_env, mode);

    // Upstream catalog; a rejected key is fatal
    let tmdb = Arc::new(TmdbClient::new(TmdbSettings {
        api_url: config.tmdb_api_url.clone(),
        image_url: config.tmdb_image_url.clone(),
        language: config.tmdb_language.clone(),
        token: config.tmdb_key.clone(),
        timeout: config.fetch_timeout(),
        cache_ttl: config.metadata_cache_ttl(),
        cache_max_entries: config.metadata_cache_max_entries,
    })?);
    if let Err(e) = tmdb.validate_key().await {
        tracing::error!("TMDB key validation failed: {}", e);
        anyhow::bail!("TMDB key validation failed: {}", e);
    }
    tracing::info!("TMDB key validated");

    let omdb = Arc::new(OmdbClient::new(
        &config.omdb_api_url,
        config.omdb_key.clone(),
        config.fetch_timeout(),
        config.metadata_cache_ttl(),
        config.metadata_cache_max_entries,
    )?);
    if !omdb.is_enabled() {
        tracing::info!("OMDB_KEY not set, OMDB enrichment disabled");
    }

    // Initialize PostgreSQL connection pool
    let pool = create_pool(&config).await?;
    tracing::info!("PostgreSQL connected");

    // Run database migrations
    run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let store: Arc<dyn MediaStore> = Arc::new(PgStore::new(pool.clone()));
    let catalog_api: Arc<dyn CatalogApi> = tmdb.clone();

    // Endpoint discovery
    let http: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(&config.user_agent)?);
    let provider_urls = Arc::new(ProviderUrls::new(
        http.clone(),
        &config.providers_url,
        config.fetch_timeout(),
    ));
    let resolver = Arc::new(EndpointResolver::new(
        http.clone(),
        provider_urls,
        config.probe_timeout(),
        config.fetch_timeout(),
    ));

    // Providers
    let superflix_api = SuperflixApi::new(
        catalog_api.clone(),
        Arc::new(Endpoint::new(superflix::endpoint_profile())),
        &config.app_url,
    );
    let rede_canais = RedeCanais::new(
        http.clone(),
        catalog_api.clone(),
        store.clone(),
        Arc::new(Endpoint::new(redecanais::endpoint_profile())),
        config.fetch_timeout(),
    )
    .with_resolver(resolver.clone());

    let registry = Arc::new(ProviderRegistry::new());
    let providers: Vec<Arc<dyn ContentProvider>> =
        vec![Arc::new(superflix_api), Arc::new(rede_canais)];
    registry.initialize(providers)?;

    // Catalog, streams and sync
    let trending = Arc::new(TrendingIndex::new());
    let catalog = Arc::new(CatalogService::new(
        catalog_api.clone(),
        store.clone(),
        trending.clone(),
        omdb.clone(),
    ));
    let streams = Arc::new(StreamService::new(
        store.clone(),
        registry.clone(),
        config.stream_ttl(),
    ));
    let sync = Arc::new(CatalogSynchronizer::new(
        catalog_api,
        store,
        registry.clone(),
        trending,
        SyncSettings {
            pages: config.sync_pages,
            concurrency: config.sync_concurrency,
            retry: RetryPolicy {
                max_attempts: config.sync_max_attempts,
                ..RetryPolicy::default()
            },
        },
    ));

    // Background tasks
    let scheduler = SchedulerConfig {
        sync_interval_secs: config.sync_interval_secs,
        endpoint_refresh_secs: config.endpoint_refresh_secs,
        sync_on_start: mode.syncs_on_start(),
        index_providers: mode == RunMode::Seed,
        ..SchedulerConfig::default()
    };
    tokio::spawn(start_endpoint_task(
        resolver.clone(),
        registry,
        scheduler.endpoint_refresh_secs,
    ));
    tokio::spawn(start_sweep_task(
        tmdb.clone(),
        omdb.clone(),
        scheduler.cache_sweep_secs,
    ));
    tokio::spawn(start_sync_task(sync.clone(), scheduler));
    tracing::info!("Background tasks started");

    // Build application state
    let state = Arc::new(AppState {
        config,
        pool,
        resolver,
        catalog,
        streams,
        sync,
        tmdb,
        omdb,
        start_time: Instant::now(),
    });

    // Build router
    let app = Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/ready", get(routes::health::ready))
        .route("/live", get(routes::health::live))
        // Addon endpoints
        .route("/stream/:kind/:id", get(routes::stream::get_streams))
        .route(
            "/stream/embed/movie/:imdb_id",
            get(routes::stream::embed_movie),
        )
        .route(
            "/stream/embed/series/:id/:season/:episode",
            get(routes::stream::embed_series),
        )
        .route("/watch/:id", get(routes::stream::watch))
        // Catalog endpoints
        .route("/catalog/:kind", get(routes::catalog::list_catalog))
        .route("/catalog/:kind/:id", get(routes::catalog::get_detail))
        // Admin endpoints (protected by ADMIN_KEY)
        .route("/api/admin/sync", post(routes::admin::trigger_sync))
        .route(
            "/api/admin/endpoints",
            get(routes::admin::list_endpoints),
        )
        .route(
            "/api/admin/endpoints/refresh",
            post(routes::admin::refresh_provider_endpoints),
        )
        .route(
            "/api/admin/provider-urls/refresh",
            post(routes::admin::refresh_provider_urls),
        )
        .route("/api/admin/stats", get(routes::admin::get_db_stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
