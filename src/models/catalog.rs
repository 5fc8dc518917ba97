use serde::{Deserialize, Serialize};

use super::media::{Genre, MediaKind};

/// Content type as understood by the upstream catalog API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Tv,
}

impl ContentType {
    pub fn path(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Tv => "tv",
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            ContentType::Movie => MediaKind::Movie,
            ContentType::Tv => MediaKind::Series,
        }
    }
}

impl From<MediaKind> for ContentType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Movie => ContentType::Movie,
            MediaKind::Series => ContentType::Tv,
        }
    }
}

/// Upstream listing category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendingCategory {
    All,
    Popular,
    TopRated,
    Theater,
}

impl TrendingCategory {
    /// Categories fetched per page during a sync pass
    pub const MOVIE_SYNC: [TrendingCategory; 3] = [
        TrendingCategory::Popular,
        TrendingCategory::TopRated,
        TrendingCategory::Theater,
    ];
    pub const SERIES_SYNC: [TrendingCategory; 2] =
        [TrendingCategory::Popular, TrendingCategory::TopRated];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "ALL" => Some(TrendingCategory::All),
            "POPULAR" => Some(TrendingCategory::Popular),
            "TOP_RATED" => Some(TrendingCategory::TopRated),
            "THEATER" => Some(TrendingCategory::Theater),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrendingCategory::All => "Todos",
            TrendingCategory::Popular => "Em alta",
            TrendingCategory::TopRated => "Mais votados",
            TrendingCategory::Theater => "Nos cinemas",
        }
    }
}

impl std::fmt::Display for TrendingCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendingCategory::All => write!(f, "ALL"),
            TrendingCategory::Popular => write!(f, "POPULAR"),
            TrendingCategory::TopRated => write!(f, "TOP_RATED"),
            TrendingCategory::Theater => write!(f, "THEATER"),
        }
    }
}

/// Normalized entry from an upstream listing or search page.
/// Image paths are already absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    pub overview: String,
    pub backdrop: Option<String>,
    pub poster: Option<String>,
    pub rating: f64,
    pub popularity: f64,
    pub release_date: Option<String>,
    pub genre_ids: Vec<i64>,
}

/// Upstream detail record for one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDetails {
    pub id: i64,
    pub title: String,
    pub overview: String,
    pub backdrop: Option<String>,
    pub poster: Option<String>,
    pub rating: f64,
    pub release_date: Option<String>,
    pub genres: Vec<Genre>,
}

/// Item scraped from a provider's own catalog listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCatalogItem {
    pub kind: MediaKind,
    pub title: String,
    pub page_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}
