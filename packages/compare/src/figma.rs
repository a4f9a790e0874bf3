//! Figma image export client.
//!
//! References are exported through the Figma `images` endpoint, which
//! returns short-lived hosted URLs rather than image bytes. One batched
//! request covers every node in the run; the hosted URLs are then
//! downloaded individually. Every failure mode short of a bug degrades
//! to a missing reference instead of aborting the run.

use crate::{CompareError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const FIGMA_API_BASE: &str = "https://api.figma.com";

/// Total attempts for a rate-limited request before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First backoff delay after a 429; doubles on each retry.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Export scale requested from Figma. Designs render at 2x so captures
/// of retina-sized stories line up.
pub const DEFAULT_EXPORT_SCALE: f64 = 2.0;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for the Figma export client.
#[derive(Debug, Clone)]
pub struct FigmaOptions {
    /// Personal access token. None puts the whole run in capture-only mode.
    pub token: Option<String>,

    /// API base URL, overridable for tests.
    pub api_base: String,

    /// Total attempts for a rate-limited request.
    pub max_retries: u32,

    /// First backoff delay; doubles on each retry.
    pub retry_base_delay: Duration,

    /// Export scale passed to the images endpoint.
    pub export_scale: f64,

    /// Timeout applied to every HTTP request.
    pub timeout: Duration,
}

impl Default for FigmaOptions {
    fn default() -> Self {
        Self {
            token: None,
            api_base: FIGMA_API_BASE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            export_scale: DEFAULT_EXPORT_SCALE,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Source of reference images, keyed by Figma node id. A `None` value
/// means the reference is unavailable and the mapping should be skipped.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_all(
        &self,
        file_id: &str,
        node_ids: &[String],
    ) -> HashMap<String, Option<Vec<u8>>>;
}

/// Client for the Figma images API.
pub struct FigmaClient {
    options: FigmaOptions,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    err: Option<String>,

    #[serde(default)]
    images: HashMap<String, Option<String>>,
}

impl FigmaClient {
    /// Create a client against the public Figma API.
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_options(FigmaOptions {
            token,
            ..Default::default()
        })
    }

    /// Create a client with custom options.
    pub fn with_options(options: FigmaOptions) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()?;

        Ok(Self {
            options,
            http_client,
        })
    }

    /// Fetch reference images for all node ids in one batched export.
    ///
    /// Never fails the run: a missing token, a node without a hosted URL,
    /// a failed download, or a failed batch all map to `None` entries.
    pub async fn fetch_all(
        &self,
        file_id: &str,
        node_ids: &[String],
    ) -> HashMap<String, Option<Vec<u8>>> {
        let mut images: HashMap<String, Option<Vec<u8>>> =
            node_ids.iter().map(|id| (id.clone(), None)).collect();

        let Some(token) = self.options.token.clone() else {
            warn!("⚠️ FIGMA_ACCESS_TOKEN not set, skipping Figma image fetch");
            return images;
        };

        if node_ids.is_empty() {
            return images;
        }

        let urls = match self.fetch_batch(&token, file_id, node_ids).await {
            Ok(urls) => urls,
            Err(e) => {
                error!("Figma image export failed: {}", e);
                return images;
            }
        };

        for node_id in node_ids {
            let Some(hosted) = urls.get(node_id).and_then(|u| u.clone()) else {
                warn!("No Figma image URL returned for node {}", node_id);
                continue;
            };

            match self.download(&hosted).await {
                Ok(bytes) => {
                    images.insert(node_id.clone(), Some(bytes));
                }
                Err(e) => {
                    warn!("Failed to download Figma image for node {}: {}", node_id, e);
                }
            }
        }

        images
    }

    /// One images-endpoint request covering every node id.
    async fn fetch_batch(
        &self,
        token: &str,
        file_id: &str,
        node_ids: &[String],
    ) -> Result<HashMap<String, Option<String>>> {
        let url = self.images_url(file_id, node_ids)?;
        debug!("Requesting Figma image export: {}", url);

        let response = self.get_with_retry(url, token).await?;
        if !response.status().is_success() {
            return Err(CompareError::Api(format!(
                "image export returned {}",
                response.status()
            )));
        }

        let body: ImagesResponse = response.json().await?;
        if let Some(err) = body.err {
            return Err(CompareError::Api(err));
        }

        Ok(body.images)
    }

    /// GET with exponential backoff on 429. Any other status is returned
    /// to the caller as-is.
    async fn get_with_retry(&self, url: Url, token: &str) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        let mut delay = self.options.retry_base_delay;

        loop {
            attempt += 1;

            let response = self
                .http_client
                .get(url.clone())
                .header("X-Figma-Token", token)
                .send()
                .await?;

            if response.status() != reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            if attempt >= self.options.max_retries {
                return Err(CompareError::Api(format!(
                    "rate limited, retry budget of {} attempts exhausted",
                    self.options.max_retries
                )));
            }

            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Figma API rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    /// Download one hosted image. These URLs are pre-signed, no token.
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(CompareError::Api(format!(
                "image download returned {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn images_url(&self, file_id: &str, node_ids: &[String]) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/v1/images/{}",
            self.options.api_base.trim_end_matches('/'),
            file_id
        ))
        .map_err(|e| CompareError::Api(format!("invalid Figma API URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("ids", &node_ids.join(","))
            .append_pair("format", "png")
            .append_pair("scale", &self.options.export_scale.to_string());

        Ok(url)
    }
}

#[async_trait]
impl ReferenceSource for FigmaClient {
    async fn fetch_all(
        &self,
        file_id: &str,
        node_ids: &[String],
    ) -> HashMap<String, Option<Vec<u8>>> {
        FigmaClient::fetch_all(self, file_id, node_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_options(server: &MockServer, token: &str) -> FigmaOptions {
        FigmaOptions {
            token: Some(token.to_string()),
            api_base: server.uri(),
            retry_base_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn png_body() -> Vec<u8> {
        vec![0x89, b'P', b'N', b'G', 1, 2, 3]
    }

    fn export_body(server: &MockServer) -> serde_json::Value {
        serde_json::json!({
            "err": null,
            "images": {
                "1:2": format!("{}/render/1.png", server.uri()),
                "3:4": null
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_all_without_token_returns_all_none() {
        let client = FigmaClient::new(None).unwrap();
        let node_ids = vec!["1:2".to_string(), "3:4".to_string()];

        let images = client.fetch_all("file-1", &node_ids).await;

        assert_eq!(images.len(), 2);
        assert_eq!(images["1:2"], None);
        assert_eq!(images["3:4"], None);
    }

    #[tokio::test]
    async fn test_fetch_all_batches_and_downloads() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/images/file-1"))
            .and(query_param("ids", "1:2,3:4"))
            .and(query_param("format", "png"))
            .and(query_param("scale", "2"))
            .and(header("X-Figma-Token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(export_body(&server)))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/render/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_body()))
            .mount(&server)
            .await;

        let client = FigmaClient::with_options(test_options(&server, "tok")).unwrap();
        let node_ids = vec!["1:2".to_string(), "3:4".to_string()];

        let images = client.fetch_all("file-1", &node_ids).await;

        assert_eq!(images["1:2"].as_deref(), Some(png_body().as_slice()));
        // Node without a hosted URL degrades to a missing reference.
        assert_eq!(images["3:4"], None);
    }

    #[tokio::test]
    async fn test_download_failure_degrades_to_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/images/file-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(export_body(&server)))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/render/1.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = FigmaClient::with_options(test_options(&server, "tok")).unwrap();
        let node_ids = vec!["1:2".to_string()];

        let images = client.fetch_all("file-1", &node_ids).await;
        assert_eq!(images["1:2"], None);
    }

    #[tokio::test]
    async fn test_rate_limited_export_retries_with_backoff() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/images/file-1"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/images/file-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(export_body(&server)))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/render/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_body()))
            .mount(&server)
            .await;

        let client = FigmaClient::with_options(test_options(&server, "tok")).unwrap();
        let node_ids = vec!["1:2".to_string()];

        let started = Instant::now();
        let images = client.fetch_all("file-1", &node_ids).await;

        assert_eq!(images["1:2"].as_deref(), Some(png_body().as_slice()));
        // Two 429s mean two sleeps: base, then doubled.
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_degrades_batch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/images/file-1"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = FigmaClient::with_options(test_options(&server, "tok")).unwrap();
        let node_ids = vec!["1:2".to_string()];

        let images = client.fetch_all("file-1", &node_ids).await;
        assert_eq!(images["1:2"], None);
    }

    #[tokio::test]
    async fn test_api_error_body_degrades_batch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/images/file-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "err": "file not found",
                "images": {}
            })))
            .mount(&server)
            .await;

        let client = FigmaClient::with_options(test_options(&server, "tok")).unwrap();
        let node_ids = vec!["1:2".to_string()];

        let images = client.fetch_all("file-1", &node_ids).await;
        assert_eq!(images["1:2"], None);
    }

    #[tokio::test]
    async fn test_empty_node_list_skips_request() {
        let server = MockServer::start().await;

        let client = FigmaClient::with_options(test_options(&server, "tok")).unwrap();
        let images = client.fetch_all("file-1", &[]).await;

        assert!(images.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_images_url_shape() {
        let client = FigmaClient::new(Some("tok".to_string())).unwrap();
        let node_ids = vec!["1:2".to_string(), "3:4".to_string()];

        let url = client.images_url("file-1", &node_ids).unwrap();

        assert_eq!(url.path(), "/v1/images/file-1");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["ids"], "1:2,3:4");
        assert_eq!(pairs["format"], "png");
        assert_eq!(pairs["scale"], "2");
    }
}
