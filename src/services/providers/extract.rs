//! Playable-URL extraction from provider pages
//!
//! Tried in order, first hit wins: `<video>`/`<source>` elements, `.m3u8`
//! links, `.mp4` links, `file:` assignments, `sources:` arrays. When a page
//! has none of these its first iframe is followed, one level deep.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::services::http::{HttpError, HttpFetch};

lazy_static! {
    static ref MEDIA_SELECTOR: Selector = Selector::parse("video[src], source[src]").unwrap();
    static ref IFRAME_SELECTOR: Selector = Selector::parse("iframe[src]").unwrap();
    static ref M3U8_URL: Regex =
        Regex::new(r#"(?i)(?:https?:)?//[^"'\s<>()]+?\.m3u8(?:\?[^"'\s<>()]*)?"#).unwrap();
    static ref MP4_URL: Regex =
        Regex::new(r#"(?i)(?:https?:)?//[^"'\s<>()]+?\.mp4(?:\?[^"'\s<>()]*)?"#).unwrap();
    static ref FILE_ASSIGNMENT: Regex =
        Regex::new(r#"\bfile\s*:\s*["']([^"']+)["']"#).unwrap();
    static ref SOURCES_ARRAY: Regex = Regex::new(
        r#"\bsources\s*:\s*\[\s*(?:\{[^}]*?\b(?:file|src)\s*:\s*)?["']([^"']+)["']"#
    )
    .unwrap();
}

/// Find a playable URL in page markup
pub fn extract_media_url(html: &str) -> Option<String> {
    let html = html.replace("\\/", "/");

    media_element(&html)
        .or_else(|| M3U8_URL.find(&html).map(|m| m.as_str().to_string()))
        .or_else(|| MP4_URL.find(&html).map(|m| m.as_str().to_string()))
        .or_else(|| capture(&FILE_ASSIGNMENT, &html))
        .or_else(|| capture(&SOURCES_ARRAY, &html))
        .map(|url| absolutize_scheme(&url))
}

/// `src` of the first iframe, if any
pub fn find_iframe(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&IFRAME_SELECTOR)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("about:"))
        .map(String::from)
}

/// Fetch a page and extract a playable URL, following one iframe if needed
pub async fn scrape_media_url(
    http: &dyn HttpFetch,
    page_url: &str,
    referer: Option<&str>,
    timeout: Duration,
) -> Result<Option<String>, HttpError> {
    let html = http.get_text(page_url, referer, timeout).await?;
    if let Some(url) = extract_media_url(&html) {
        return Ok(Some(url));
    }

    let Some(src) = find_iframe(&html) else {
        debug!(url = %page_url, "No media or iframe found");
        return Ok(None);
    };
    let Some(frame_url) = join_url(page_url, &src) else {
        debug!(url = %page_url, src = %src, "Unusable iframe src");
        return Ok(None);
    };

    debug!(url = %page_url, frame = %frame_url, "Following iframe");
    let frame = http.get_text(&frame_url, Some(page_url), timeout).await?;
    Ok(extract_media_url(&frame))
}

/// Resolve `href` against `base`
pub fn join_url(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    let joined = base.join(href).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

fn media_element(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&MEDIA_SELECTOR)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .find(|src| src.starts_with("http") || src.starts_with("//"))
        .map(String::from)
}

fn capture(pattern: &Regex, html: &str) -> Option<String> {
    pattern
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|url| url.starts_with("http") || url.starts_with("//"))
        .map(String::from)
}

fn absolutize_scheme(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}
