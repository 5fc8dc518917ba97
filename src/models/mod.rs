//! Domain types shared by services, the store and the HTTP layer.

pub mod catalog;
pub mod media;
pub mod stream;

pub use catalog::{CatalogEntry, ContentType, MediaDetails, RawCatalogItem, TrendingCategory};
pub use media::{EpisodeGroup, EpisodeTrack, Genre, MediaItem, MediaKind, MediaRef};
pub use stream::{
    Audio, NewStream, ProviderTag, Quality, StreamKey, StreamRecord, MAX_EPISODE_INDEX,
};
