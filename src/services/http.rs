//! Outbound HTTP seam used by endpoint discovery and scraping providers

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Failure of a single outbound request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HttpError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error("Failed to read body: {0}")]
    Body(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpError::Timeout
        } else if e.is_builder() {
            HttpError::InvalidUrl(e.to_string())
        } else if let Some(status) = e.status() {
            HttpError::Status(status.as_u16())
        } else if e.is_body() || e.is_decode() {
            HttpError::Body(e.to_string())
        } else {
            HttpError::Connect(e.to_string())
        }
    }
}

/// Minimal HTTP surface needed to probe hosts and fetch pages
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// HEAD request, returning the final status after redirects
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, HttpError>;

    /// GET request returning the body of a 2xx response
    async fn get_text(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, HttpError>;

    /// A host is live iff a HEAD answers 200..400 within the timeout
    async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.head(url, timeout).await {
            Ok(status) => (200..400).contains(&status),
            Err(e) => {
                debug!(url = %url, error = %e, "Probe failed");
                false
            }
        }
    }
}

/// `HttpFetch` backed by a shared reqwest client
pub struct ReqwestFetcher {
    http: Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str) -> Result<Self, HttpError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| HttpError::Connect(e.to_string()))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, HttpError> {
        let response = self.http.head(url).timeout(timeout).send().await?;
        Ok(response.status().as_u16())
    }

    async fn get_text(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, HttpError> {
        let mut request = self.http.get(url).timeout(timeout);
        if let Some(referer) = referer {
            request = request.header(reqwest::header::REFERER, referer);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_accepts_redirect_range() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new("test-agent").unwrap();
        let timeout = Duration::from_secs(2);

        assert!(fetcher.probe(&server.uri(), timeout).await);
        assert!(!fetcher.probe(&format!("{}/gone", server.uri()), timeout).await);
    }

    #[tokio::test]
    async fn test_probe_unreachable_host() {
        let fetcher = ReqwestFetcher::new("test-agent").unwrap();
        assert!(
            !fetcher
                .probe("http://127.0.0.1:9", Duration::from_millis(300))
                .await
        );
    }

    #[tokio::test]
    async fn test_get_text_sends_referer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("referer", "https://origin.test/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new("test-agent").unwrap();
        let body = fetcher
            .get_text(
                &format!("{}/page", server.uri()),
                Some("https://origin.test/"),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_get_text_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new("test-agent").unwrap();
        let err = fetcher
            .get_text(&server.uri(), None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err, HttpError::Status(503));
    }
}
