//! Stream resolution
//!
//! For every registered provider a lookup either serves a fresh stored record,
//! refreshes an expired one in place, or resolves and inserts a new one.
//! Providers are asked one after another and a failing provider never keeps
//! the others from answering.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::providers::{ContentProvider, ProviderRegistry};
use crate::db::{MediaStore, StoreError};
use crate::metrics::STREAM_RESOLUTIONS;
use crate::models::{
    Audio, MediaItem, NewStream, ProviderTag, Quality, StreamKey, StreamRecord,
};

/// Result of resolving one stream key against one provider
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Stored record still valid, no provider call made
    Fresh(StreamRecord),
    /// Expired record updated in place
    Refreshed(StreamRecord),
    /// New record inserted
    Created(StreamRecord),
    /// Expired record kept because the provider could not refresh it
    Stale(StreamRecord),
    Unavailable,
}

impl Resolution {
    /// The record, if it can be played
    pub fn usable(self) -> Option<StreamRecord> {
        match self {
            Resolution::Fresh(r) | Resolution::Refreshed(r) | Resolution::Created(r) => Some(r),
            Resolution::Stale(_) | Resolution::Unavailable => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Resolution::Fresh(_) => "fresh",
            Resolution::Refreshed(_) => "refreshed",
            Resolution::Created(_) => "created",
            Resolution::Stale(_) => "stale",
            Resolution::Unavailable => "unavailable",
        }
    }
}

// ============================================================================
// Addon response
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorHints {
    pub not_web_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binge_group: Option<String>,
}

/// Stream entry as served to addon clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub name: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub behavior_hints: BehaviorHints,
}

impl StreamDescriptor {
    pub fn new(record: &StreamRecord, provider_label: &str, addon_prefix: &str) -> Self {
        let mut variant = record.audio.label().to_string();
        if let Some(quality) = record.quality.label() {
            variant.push(' ');
            variant.push_str(quality);
        }

        let title = match (record.season, record.episode) {
            (Some(s), Some(e)) => format!(
                "T{} E{} - {}",
                u64::from(s) + 1,
                u64::from(e) + 1,
                variant
            ),
            _ => variant.clone(),
        };

        Self {
            name: format!("{}\n{}", addon_prefix, provider_label),
            title,
            url: record.access_url.clone(),
            description: format!("{} | {}", provider_label, variant),
            behavior_hints: BehaviorHints {
                not_web_ready: false,
                binge_group: Some(format!(
                    "{}-{}-{}",
                    addon_prefix.to_lowercase(),
                    record.provider.override_key(),
                    record.audio.as_str().to_lowercase()
                )),
            },
        }
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct StreamService {
    store: Arc<dyn MediaStore>,
    registry: Arc<ProviderRegistry>,
    ttl: chrono::Duration,
}

impl StreamService {
    pub fn new(store: Arc<dyn MediaStore>, registry: Arc<ProviderRegistry>, ttl: std::time::Duration) -> Self {
        Self {
            store,
            registry,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Resolve one key against one provider, going through the store
    pub async fn resolve(
        &self,
        provider: &dyn ContentProvider,
        media: &MediaItem,
        key: StreamKey,
    ) -> Result<Resolution, StoreError> {
        let now = Utc::now();
        let existing = self.store.find_stream(&key).await?;

        if let Some(record) = &existing {
            if record.is_fresh(now) {
                debug!(media = %media.media_ref(), provider = %key.provider, "Serving stored stream");
                return Ok(self.count(key.provider, Resolution::Fresh(record.clone())));
            }
        }

        let resolved = match (key.season, key.episode) {
            (Some(season), Some(episode)) => {
                provider
                    .resolve_series_url(media, season, episode, key.audio)
                    .await
            }
            _ => provider.resolve_movie_url(media, key.audio, key.quality).await,
        };

        let url = match resolved {
            Ok(url) => url.filter(|u| !u.is_empty()),
            Err(e) => {
                warn!(
                    media = %media.media_ref(),
                    provider = %key.provider,
                    error = %e,
                    "Provider failed to resolve stream"
                );
                STREAM_RESOLUTIONS
                    .with_label_values(&[key.provider.as_str(), "error"])
                    .inc();
                None
            }
        };

        let expires_at = Utc::now() + self.ttl;
        let resolution = match (url, existing) {
            (Some(url), Some(record)) => {
                let updated = self.store.refresh_stream(&record, &url, expires_at).await?;
                Resolution::Refreshed(updated)
            }
            (Some(url), None) => {
                let created = self
                    .store
                    .insert_stream(&NewStream {
                        key,
                        access_url: url,
                        refresh_url: key.default_refresh_url(),
                        expires_at,
                    })
                    .await?;
                Resolution::Created(created)
            }
            (None, Some(record)) => Resolution::Stale(record),
            (None, None) => Resolution::Unavailable,
        };

        Ok(self.count(key.provider, resolution))
    }

    fn count(&self, provider: ProviderTag, resolution: Resolution) -> Resolution {
        STREAM_RESOLUTIONS
            .with_label_values(&[provider.as_str(), resolution.outcome()])
            .inc();
        resolution
    }

    /// Every usable stream of a movie across all providers
    pub async fn movie_streams(&self, media: &MediaItem) -> Result<Vec<StreamRecord>, StoreError> {
        let stored = self.store.streams_for(media.media_ref(), None, None).await?;

        let mut streams = Vec::new();
        for provider in self.registry.all() {
            let tag = provider.tag();
            let mut keys: Vec<StreamKey> = stored
                .iter()
                .filter(|r| r.provider == tag)
                .map(StreamRecord::key)
                .collect();
            if keys.is_empty() {
                keys.push(StreamKey::movie(media.id, tag, Audio::Dubbed, Quality::Unknown));
            }

            streams.extend(self.resolve_keys(provider.as_ref(), media, keys).await);
        }

        info!(media = %media.media_ref(), streams = streams.len(), "Resolved movie streams");
        Ok(streams)
    }

    /// Every usable stream of one episode across all providers.
    /// `season` and `episode` are zero-indexed.
    pub async fn series_streams(
        &self,
        media: &MediaItem,
        season: u32,
        episode: u32,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        let stored = self
            .store
            .streams_for(media.media_ref(), Some(season), Some(episode))
            .await?;

        let mut streams = Vec::new();
        for provider in self.registry.all() {
            let tag = provider.tag();
            let mut keys: Vec<StreamKey> = stored
                .iter()
                .filter(|r| r.provider == tag)
                .map(StreamRecord::key)
                .collect();

            if keys.is_empty() {
                let audios = match provider.list_episodes(media).await {
                    Ok(groups) if groups.is_empty() => vec![Audio::Dubbed],
                    Ok(groups) => groups
                        .iter()
                        .filter(|g| g.season == season && g.episode == episode)
                        .flat_map(|g| g.tracks.iter().map(|t| t.audio))
                        .collect(),
                    Err(e) => {
                        warn!(
                            media = %media.media_ref(),
                            provider = %tag,
                            error = %e,
                            "Episode listing failed"
                        );
                        Vec::new()
                    }
                };

                for audio in audios {
                    let key = StreamKey::episode(media.id, tag, season, episode, audio);
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }

            streams.extend(self.resolve_keys(provider.as_ref(), media, keys).await);
        }

        info!(
            media = %media.media_ref(),
            season,
            episode,
            streams = streams.len(),
            "Resolved episode streams"
        );
        Ok(streams)
    }

    async fn resolve_keys(
        &self,
        provider: &dyn ContentProvider,
        media: &MediaItem,
        keys: Vec<StreamKey>,
    ) -> Vec<StreamRecord> {
        let mut records = Vec::new();
        for key in keys {
            match self.resolve(provider, media, key).await {
                Ok(resolution) => records.extend(resolution.usable()),
                Err(e) => warn!(
                    media = %media.media_ref(),
                    provider = %key.provider,
                    error = %e,
                    "Failed to store stream"
                ),
            }
        }
        records
    }

    pub async fn stream_by_id(&self, id: Uuid) -> Result<Option<StreamRecord>, StoreError> {
        self.store.find_stream_by_id(id).await
    }

    /// The record itself when fresh, otherwise a refreshed copy if the
    /// provider can still produce one
    pub async fn ensure_fresh(
        &self,
        record: StreamRecord,
        media: &MediaItem,
    ) -> Result<Option<StreamRecord>, StoreError> {
        if record.is_fresh(Utc::now()) {
            return Ok(Some(record));
        }

        let Some(provider) = self.registry.get(record.provider) else {
            warn!(provider = %record.provider, "Stream of unregistered provider");
            return Ok(None);
        };

        Ok(self
            .resolve(provider.as_ref(), media, record.key())
            .await?
            .usable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EpisodeGroup, EpisodeTrack, MediaKind};
    use crate::test_support::{media_item, MemoryStore, StaticProvider};
    use std::time::Duration;

    fn service(store: Arc<MemoryStore>, providers: Vec<Arc<StaticProvider>>) -> StreamService {
        let registry = ProviderRegistry::new();
        registry
            .initialize(
                providers
                    .into_iter()
                    .map(|p| p as Arc<dyn ContentProvider>)
                    .collect(),
            )
            .unwrap();
        StreamService::new(store, Arc::new(registry), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_fresh_record_served_without_provider_call() {
        let store = Arc::new(MemoryStore::new());
        let key = StreamKey::movie(603, ProviderTag::SuperflixApi, Audio::Dubbed, Quality::Unknown);
        store.put_stream(key, "https://cdn.test/stored.m3u8", Utc::now() + chrono::Duration::minutes(30));

        let provider = Arc::new(
            StaticProvider::new(ProviderTag::SuperflixApi).with_url("https://cdn.test/new.m3u8"),
        );
        let svc = service(store, vec![provider.clone()]);

        let streams = svc
            .movie_streams(&media_item(MediaKind::Movie, 603, "Matrix"))
            .await
            .unwrap();

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].access_url, "https://cdn.test/stored.m3u8");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_record_refreshed_in_place() {
        let store = Arc::new(MemoryStore::new());
        let key = StreamKey::movie(603, ProviderTag::SuperflixApi, Audio::Dubbed, Quality::Unknown);
        let old = store.put_stream(key, "https://cdn.test/old.m3u8", Utc::now() - chrono::Duration::minutes(1));

        let provider = StaticProvider::new(ProviderTag::SuperflixApi).with_url("https://cdn.test/new.m3u8");
        let svc = service(store.clone(), Vec::new());
        let movie = media_item(MediaKind::Movie, 603, "Matrix");

        let resolution = svc.resolve(&provider, &movie, key).await.unwrap();
        let record = match resolution {
            Resolution::Refreshed(record) => record,
            other => panic!("expected refresh, got {:?}", other),
        };
        assert_eq!(record.id, old.id);
        assert_eq!(record.access_url, "https://cdn.test/new.m3u8");
        assert!(record.is_fresh(Utc::now()));
        assert_eq!(store.stream_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_record() {
        let store = Arc::new(MemoryStore::new());
        let key = StreamKey::movie(603, ProviderTag::RedeCanais, Audio::Dubbed, Quality::Unknown);
        let old = store.put_stream(key, "https://cdn.test/old.m3u8", Utc::now() - chrono::Duration::minutes(1));

        let provider = StaticProvider::new(ProviderTag::RedeCanais);
        provider.set_failing(true);
        let svc = service(store.clone(), Vec::new());

        let resolution = svc
            .resolve(&provider, &media_item(MediaKind::Movie, 603, "Matrix"), key)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Stale(old.clone()));
        assert!(resolution.usable().is_none());

        let kept = store.find_stream(&key).await.unwrap().unwrap();
        assert_eq!(kept.access_url, old.access_url);
    }

    #[tokio::test]
    async fn test_one_record_per_key() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(
            StaticProvider::new(ProviderTag::SuperflixApi).with_url("https://cdn.test/a.m3u8"),
        );
        let svc = service(store.clone(), vec![provider.clone()]);
        let movie = media_item(MediaKind::Movie, 603, "Matrix");

        let first = svc.movie_streams(&movie).await.unwrap();
        let second = svc.movie_streams(&movie).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.stream_count(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_provider_does_not_block_others() {
        let store = Arc::new(MemoryStore::new());
        let broken = Arc::new(StaticProvider::new(ProviderTag::SuperflixApi));
        broken.set_failing(true);
        let working = Arc::new(
            StaticProvider::new(ProviderTag::RedeCanais).with_url("https://cdn.test/rc.mp4"),
        );
        let svc = service(store, vec![broken.clone(), working.clone()]);

        let streams = svc
            .movie_streams(&media_item(MediaKind::Movie, 550, "Clube da Luta"))
            .await
            .unwrap();

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].provider, ProviderTag::RedeCanais);
        assert_eq!(broken.calls(), 1);
    }

    #[tokio::test]
    async fn test_series_uses_listed_audio_tracks() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(
            StaticProvider::new(ProviderTag::RedeCanais).with_url("https://cdn.test/ep.mp4"),
        );
        provider.set_episodes(vec![EpisodeGroup {
            title: "Episódio 01".to_string(),
            season: 0,
            episode: 0,
            tracks: vec![
                EpisodeTrack {
                    url: "https://rc.test/dub.html".to_string(),
                    audio: Audio::Dubbed,
                },
                EpisodeTrack {
                    url: "https://rc.test/leg.html".to_string(),
                    audio: Audio::Subtitled,
                },
            ],
        }]);
        let svc = service(store, vec![provider.clone()]);
        let series = media_item(MediaKind::Series, 1399, "Game of Thrones");

        let streams = svc.series_streams(&series, 0, 0).await.unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(
            provider.requests(),
            vec![
                (Some(0), Some(0), Audio::Dubbed),
                (Some(0), Some(0), Audio::Subtitled)
            ]
        );

        // Episode missing from the listing
        assert!(svc.series_streams(&series, 3, 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_series_without_listing_defaults_to_dubbed() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(
            StaticProvider::new(ProviderTag::SuperflixApi).with_url("https://app.test/embed"),
        );
        let svc = service(store, vec![provider.clone()]);

        let streams = svc
            .series_streams(&media_item(MediaKind::Series, 1399, "Game of Thrones"), 1, 4)
            .await
            .unwrap();

        assert_eq!(streams.len(), 1);
        assert_eq!((streams[0].season, streams[0].episode), (Some(1), Some(4)));
        assert_eq!(provider.requests(), vec![(Some(1), Some(4), Audio::Dubbed)]);
    }

    #[tokio::test]
    async fn test_ensure_fresh_refreshes_expired() {
        let store = Arc::new(MemoryStore::new());
        let key = StreamKey::movie(603, ProviderTag::SuperflixApi, Audio::Dubbed, Quality::Unknown);
        let old = store.put_stream(key, "https://cdn.test/old.m3u8", Utc::now() - chrono::Duration::minutes(1));
        let provider = Arc::new(
            StaticProvider::new(ProviderTag::SuperflixApi).with_url("https://cdn.test/new.m3u8"),
        );
        let svc = service(store, vec![provider]);

        let fresh = svc
            .ensure_fresh(old, &media_item(MediaKind::Movie, 603, "Matrix"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.access_url, "https://cdn.test/new.m3u8");
    }

    #[test]
    fn test_descriptor_labels() {
        let record = StreamRecord {
            id: Uuid::nil(),
            provider: ProviderTag::RedeCanais,
            media: crate::models::MediaRef::series(1399),
            season: Some(0),
            episode: Some(1),
            audio: Audio::Subtitled,
            quality: Quality::Hd,
            access_url: "https://cdn.test/ep.mp4".to_string(),
            refresh_url: "1399/0/1".to_string(),
            expires_at: Utc::now(),
        };

        let descriptor = StreamDescriptor::new(&record, "RedeCanais", "CineStream");
        assert_eq!(descriptor.title, "T1 E2 - Legendado 720p");
        assert_eq!(descriptor.url, "https://cdn.test/ep.mp4");
        assert_eq!(descriptor.name, "CineStream\nRedeCanais");
        assert_eq!(
            descriptor.behavior_hints.binge_group.as_deref(),
            Some("cinestream-redecanais-subtitled")
        );
    }

    #[test]
    fn test_descriptor_title_at_max_index() {
        let record = StreamRecord {
            id: Uuid::nil(),
            provider: ProviderTag::SuperflixApi,
            media: crate::models::MediaRef::series(1399),
            season: Some(u32::MAX),
            episode: Some(0),
            audio: Audio::Dubbed,
            quality: Quality::Unknown,
            access_url: "https://cdn.test/ep.mp4".to_string(),
            refresh_url: "1399/0/0".to_string(),
            expires_at: Utc::now(),
        };

        let descriptor = StreamDescriptor::new(&record, "SuperflixAPI", "CineStream");
        assert!(descriptor.title.starts_with("T4294967296 E1 - "));
    }
}
