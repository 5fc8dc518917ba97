//! Background tasks
//!
//! Each task runs once on startup where that makes sense, then periodically.
//! Spawn them with `tokio::spawn`.
//! - catalog sync (and provider catalog indexing in seed mode)
//! - provider endpoint revalidation
//! - metadata cache sweep

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use super::endpoint::{EndpointResolver, EndpointState};
use super::omdb::OmdbClient;
use super::providers::ProviderRegistry;
use super::tmdb::TmdbClient;
use super::trending::CatalogSynchronizer;
use crate::models::ProviderTag;

/// Configuration for the background tasks
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sync_interval_secs: u64,
    pub endpoint_refresh_secs: u64,
    pub cache_sweep_secs: u64,
    /// Run a sync pass immediately on startup
    pub sync_on_start: bool,
    /// Also scrape provider catalogs on each pass
    pub index_providers: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 6 * 3600,
            endpoint_refresh_secs: 1800,
            cache_sweep_secs: 600,
            sync_on_start: false,
            index_providers: false,
        }
    }
}

/// Endpoint state of one provider after revalidation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEndpoint {
    pub provider: ProviderTag,
    #[serde(flatten)]
    pub state: EndpointState,
}

/// Revalidate the endpoint of every provider that has one
pub async fn refresh_endpoints(
    resolver: &EndpointResolver,
    registry: &ProviderRegistry,
) -> Vec<ProviderEndpoint> {
    let mut results = Vec::new();
    for provider in registry.all() {
        if let Some(endpoint) = provider.endpoint() {
            let state = resolver.resolve(endpoint).await;
            results.push(ProviderEndpoint {
                provider: provider.tag(),
                state,
            });
        }
    }
    results
}

/// Current endpoint state of every provider, without probing
pub async fn endpoint_states(registry: &ProviderRegistry) -> Vec<ProviderEndpoint> {
    let mut results = Vec::new();
    for provider in registry.all() {
        if let Some(endpoint) = provider.endpoint() {
            results.push(ProviderEndpoint {
                provider: provider.tag(),
                state: endpoint.state().await,
            });
        }
    }
    results
}

/// Result of a cache sweep
#[derive(Debug, Default)]
pub struct SweepResult {
    pub tmdb_removed: usize,
    pub omdb_removed: usize,
}

impl SweepResult {
    pub fn total_removed(&self) -> usize {
        self.tmdb_removed + self.omdb_removed
    }
}

/// Drop expired metadata cache entries
pub async fn sweep_caches(tmdb: &TmdbClient, omdb: &OmdbClient) -> SweepResult {
    let result = SweepResult {
        tmdb_removed: tmdb.sweep().await,
        omdb_removed: omdb.sweep().await,
    };
    if result.total_removed() > 0 {
        tracing::debug!(
            tmdb = result.tmdb_removed,
            omdb = result.omdb_removed,
            "Swept expired cache entries"
        );
    }
    result
}

/// One sync pass, followed by provider indexing when enabled
pub async fn run_sync(sync: &CatalogSynchronizer, index_providers: bool) {
    match sync.run_pass().await {
        Some(report) if report.pages_failed > 0 => {
            tracing::warn!(
                pages_failed = report.pages_failed,
                attempts = report.attempts,
                "Catalog sync finished with failed pages"
            );
        }
        Some(_) => {}
        None => return,
    }

    if index_providers {
        for report in sync.index_providers().await {
            if let Some(error) = &report.error {
                tracing::error!(provider = %report.provider, error = %error, "Provider catalog indexing gave up");
            }
        }
    }
}

/// Start the catalog sync task
pub async fn start_sync_task(sync: Arc<CatalogSynchronizer>, config: SchedulerConfig) {
    tracing::info!(
        interval_secs = config.sync_interval_secs,
        on_start = config.sync_on_start,
        index_providers = config.index_providers,
        "Starting catalog sync task"
    );

    let mut interval = time::interval(Duration::from_secs(config.sync_interval_secs.max(1)));
    if !config.sync_on_start {
        // The first tick completes immediately
        interval.tick().await;
    }

    loop {
        interval.tick().await;
        run_sync(&sync, config.index_providers).await;
    }
}

/// Start the endpoint revalidation task. The first run happens immediately.
pub async fn start_endpoint_task(
    resolver: Arc<EndpointResolver>,
    registry: Arc<ProviderRegistry>,
    interval_secs: u64,
) {
    tracing::info!(interval_secs, "Starting endpoint refresh task");

    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        let endpoints = refresh_endpoints(&resolver, &registry).await;
        for endpoint in &endpoints {
            tracing::debug!(
                provider = %endpoint.provider,
                url = %endpoint.state.current_url,
                source = %endpoint.state.discovery_source,
                "Endpoint revalidated"
            );
        }
    }
}

/// Start the cache sweep task
pub async fn start_sweep_task(tmdb: Arc<TmdbClient>, omdb: Arc<OmdbClient>, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
    // Nothing to sweep at startup
    interval.tick().await;

    loop {
        interval.tick().await;
        sweep_caches(&tmdb, &omdb).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::endpoint::{DiscoverySource, Endpoint};
    use crate::services::provider_urls::ProviderUrls;
    use crate::services::providers::{superflix, ContentProvider, SuperflixApi};
    use crate::test_support::{FakeCatalog, FakeHttp, StaticProvider};

    #[tokio::test]
    async fn test_refresh_skips_providers_without_endpoint() {
        let http = Arc::new(FakeHttp::new());
        http.set_live("https://superflixapi.top");

        let registry = ProviderRegistry::new();
        let superflix: Arc<dyn ContentProvider> = Arc::new(SuperflixApi::new(
            Arc::new(FakeCatalog::new()),
            Arc::new(Endpoint::new(superflix::endpoint_profile())),
            "https://app.test",
        ));
        registry
            .initialize(vec![
                superflix,
                Arc::new(StaticProvider::new(ProviderTag::RedeCanais)),
            ])
            .unwrap();

        let overrides = Arc::new(ProviderUrls::new(
            http.clone(),
            "https://paste.test/raw",
            Duration::from_secs(1),
        ));
        let resolver = EndpointResolver::new(
            http,
            overrides,
            Duration::from_millis(100),
            Duration::from_secs(1),
        );

        let endpoints = refresh_endpoints(&resolver, &registry).await;
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].provider, ProviderTag::SuperflixApi);
        assert_eq!(endpoints[0].state.current_url, "https://superflixapi.top");
        assert_eq!(endpoints[0].state.discovery_source, DiscoverySource::Static);

        let states = endpoint_states(&registry).await;
        assert_eq!(states[0].state.current_url, "https://superflixapi.top");
    }

    #[test]
    fn test_sweep_result_total() {
        let result = SweepResult {
            tmdb_removed: 3,
            omdb_removed: 2,
        };
        assert_eq!(result.total_removed(), 5);
    }
}
