use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::{MediaKind, MediaRef};

/// Registered content sources. Tags are stable and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderTag {
    #[serde(rename = "SUPERFLIXAPI")]
    SuperflixApi,
    #[serde(rename = "REDECANAIS")]
    RedeCanais,
}

impl ProviderTag {
    pub const ALL: [ProviderTag; 2] = [ProviderTag::SuperflixApi, ProviderTag::RedeCanais];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::SuperflixApi => "SUPERFLIXAPI",
            ProviderTag::RedeCanais => "REDECANAIS",
        }
    }

    /// Lowercase key used by the endpoint override document
    pub fn override_key(&self) -> String {
        self.as_str().to_lowercase()
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio track of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Audio {
    Dubbed,
    Subtitled,
}

impl Audio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audio::Dubbed => "DUBBED",
            Audio::Subtitled => "SUBTITLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DUBBED" => Some(Audio::Dubbed),
            "SUBTITLED" => Some(Audio::Subtitled),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Audio::Dubbed => "Dublado",
            Audio::Subtitled => "Legendado",
        }
    }
}

/// Quality tier of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quality {
    Unknown,
    Sd,
    Hd,
    Fhd,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Unknown => "UNKNOWN",
            Quality::Sd => "SD",
            Quality::Hd => "HD",
            Quality::Fhd => "FHD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UNKNOWN" => Some(Quality::Unknown),
            "SD" => Some(Quality::Sd),
            "HD" => Some(Quality::Hd),
            "FHD" => Some(Quality::Fhd),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<&'static str> {
        match self {
            Quality::Unknown => None,
            Quality::Sd => Some("480p"),
            Quality::Hd => Some("720p"),
            Quality::Fhd => Some("1080p"),
        }
    }
}

/// Largest zero-indexed season or episode. Keeps both the stored index
/// and its one-indexed form inside a Postgres INTEGER.
pub const MAX_EPISODE_INDEX: u32 = i32::MAX as u32 - 1;

/// Identity of a stream record. At most one record exists per key.
///
/// `season` and `episode` are zero-indexed and only set for series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub media: MediaRef,
    pub provider: ProviderTag,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub audio: Audio,
    pub quality: Quality,
}

impl StreamKey {
    pub fn movie(id: i64, provider: ProviderTag, audio: Audio, quality: Quality) -> Self {
        Self {
            media: MediaRef::movie(id),
            provider,
            season: None,
            episode: None,
            audio,
            quality,
        }
    }

    pub fn episode(
        id: i64,
        provider: ProviderTag,
        season: u32,
        episode: u32,
        audio: Audio,
    ) -> Self {
        Self {
            media: MediaRef::series(id),
            provider,
            season: Some(season),
            episode: Some(episode),
            audio,
            quality: Quality::Unknown,
        }
    }

    /// Default refresh reference stored alongside a new record
    pub fn default_refresh_url(&self) -> String {
        match self.media.kind {
            MediaKind::Movie => self.media.id.to_string(),
            MediaKind::Series => format!(
                "{}/{}/{}",
                self.media.id,
                self.season.unwrap_or(0),
                self.episode.unwrap_or(0)
            ),
        }
    }
}

/// Persisted, TTL-bound playback URL
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub id: Uuid,
    pub provider: ProviderTag,
    pub media: MediaRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    pub audio: Audio,
    pub quality: Quality,
    pub access_url: String,
    pub refresh_url: String,
    pub expires_at: DateTime<Utc>,
}

impl StreamRecord {
    pub fn key(&self) -> StreamKey {
        StreamKey {
            media: self.media,
            provider: self.provider,
            season: self.season,
            episode: self.episode,
            audio: self.audio,
            quality: self.quality,
        }
    }

    /// A record is usable iff it has a URL and `now < expires_at`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.access_url.is_empty() && now < self.expires_at
    }
}

/// Stream record to insert
#[derive(Debug, Clone)]
pub struct NewStream {
    pub key: StreamKey,
    pub access_url: String,
    pub refresh_url: String,
    pub expires_at: DateTime<Utc>,
}
