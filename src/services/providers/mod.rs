//! Content providers
//!
//! A provider turns a media item into a playable URL. Two capabilities:
//!
//! - `CatalogProvider`: bulk catalog scraping for providers that expose one
//! - `StreamProvider`: on-demand URL resolution
//!
//! Seasons and episodes are zero-indexed everywhere in this crate. Providers
//! whose upstream counts from one translate at their own boundary.

pub mod extract;
pub mod redecanais;
pub mod registry;
pub mod superflix;

use async_trait::async_trait;
use std::sync::Arc;

use super::endpoint::Endpoint;
use super::http::HttpError;
use super::tmdb::CatalogError;
use crate::db::StoreError;
use crate::models::{Audio, EpisodeGroup, MediaItem, ProviderTag, Quality, RawCatalogItem};

pub use redecanais::RedeCanais;
pub use registry::{ProviderRegistry, RegistryError};
pub use superflix::SuperflixApi;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Scrape the provider's own catalog listing
    async fn fetch_catalog(&self) -> Result<Vec<RawCatalogItem>, ProviderError> {
        Ok(Vec::new())
    }

    /// Persist scraped items. Idempotent. Returns how many were stored.
    async fn materialize_catalog(&self, _items: &[RawCatalogItem]) -> Result<usize, ProviderError> {
        Ok(0)
    }
}

#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// `Ok(None)` means the provider has no stream for this title
    async fn resolve_movie_url(
        &self,
        media: &MediaItem,
        audio: Audio,
        quality: Quality,
    ) -> Result<Option<String>, ProviderError>;

    async fn resolve_series_url(
        &self,
        media: &MediaItem,
        season: u32,
        episode: u32,
        audio: Audio,
    ) -> Result<Option<String>, ProviderError>;

    /// Episodes and their audio tracks. Empty for providers without a listing.
    async fn list_episodes(&self, _media: &MediaItem) -> Result<Vec<EpisodeGroup>, ProviderError> {
        Ok(Vec::new())
    }
}

pub trait ContentProvider: CatalogProvider + StreamProvider {
    fn tag(&self) -> ProviderTag;

    /// Human-readable name shown to addon clients
    fn label(&self) -> &'static str;

    fn endpoint(&self) -> Option<&Arc<Endpoint>> {
        None
    }
}
