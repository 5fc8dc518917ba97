use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Movie or series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    /// Parse the path segment used by the addon routes
    pub fn from_segment(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "movie" | "movies" => Some(Self::Movie),
            "series" | "tv" => Some(Self::Series),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Series => write!(f, "series"),
        }
    }
}

/// Reference to a media item by kind and upstream catalog id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub id: i64,
}

impl MediaRef {
    pub fn movie(id: i64) -> Self {
        Self {
            kind: MediaKind::Movie,
            id,
        }
    }

    pub fn series(id: i64) -> Self {
        Self {
            kind: MediaKind::Series,
            id,
        }
    }
}

impl std::fmt::Display for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Genre as published by the upstream catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

impl Genre {
    /// Name used when only the upstream genre id is known
    pub fn placeholder(id: i64) -> Self {
        Self {
            id,
            name: format!("Genre {}", id),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name == format!("Genre {}", self.id)
    }
}

/// Movie or series with its genres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub kind: MediaKind,
    pub id: i64,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub poster: String,
    pub rating: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<NaiveDate>,
    pub genres: Vec<Genre>,
}

impl MediaItem {
    pub fn media_ref(&self) -> MediaRef {
        MediaRef {
            kind: self.kind,
            id: self.id,
        }
    }

    pub fn has_genre(&self, name: &str) -> bool {
        self.genres.iter().any(|g| g.name.eq_ignore_ascii_case(name))
    }
}

/// One playable variant of an episode on a provider's site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeTrack {
    pub url: String,
    pub audio: super::Audio,
}

/// An episode as listed by a provider. Season and episode are zero-indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeGroup {
    pub title: String,
    pub season: u32,
    pub episode: u32,
    pub tracks: Vec<EpisodeTrack>,
}
