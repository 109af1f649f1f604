//! HTTP client for the upstream inference server

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use std::time::Duration;
use url::Url;

use super::error::ProxyError;
use super::request::TagsResponse;
use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};

/// Hop-by-hop headers that should not be forwarded in either direction.
///
/// `content-length` is recomputed by the client for the forwarded body.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "proxy-connection",
    "te",
    "upgrade",
    "content-length",
];

/// Copy a header map without its hop-by-hop headers
pub fn filter_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Client for the upstream `/api/generate` and `/api/tags` endpoints
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let base_url = config.url()?;

        // No client-wide timeout: it would also cut off long streamed bodies.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RelayError::Proxy(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an API path against the base URL, keeping any base path prefix
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }

    /// Forward a generation body upstream.
    ///
    /// Returns the upstream response once its status is known to be a
    /// success; the body has not been read yet. Buffered requests are
    /// bounded by the configured timeout, streamed ones only by connect.
    pub async fn generate(
        &self,
        headers: &HeaderMap,
        body: Bytes,
        stream: bool,
    ) -> std::result::Result<reqwest::Response, ProxyError> {
        let url = self.endpoint("api/generate");
        tracing::debug!(%url, stream, body_len = body.len(), "Forwarding generation upstream");

        let mut request = self
            .client
            .post(url)
            .headers(filter_hop_by_hop(headers))
            .body(body);
        if !stream {
            request = request.timeout(self.timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProxyError::from_reqwest(&e))?;

        Self::check_status(response).await
    }

    /// List the model names the upstream has available
    pub async fn tags(&self) -> std::result::Result<Vec<String>, ProxyError> {
        let url = self.endpoint("api/tags");
        tracing::debug!(%url, "Checking upstream model list");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProxyError::from_reqwest(&e))?;

        let response = Self::check_status(response).await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProxyError::InvalidUpstreamBody(format!("Failed to decode model list: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> std::result::Result<reqwest::Response, ProxyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = response.text().await.unwrap_or_default();
        Err(ProxyError::from_upstream_status(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn client_for(base_url: &str) -> UpstreamClient {
        UpstreamClient::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            ..UpstreamConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_base_url_is_parsed_from_config() {
        let client = client_for("http://gpu-box:11434");
        assert_eq!(client.base_url().as_str(), "http://gpu-box:11434/");
    }

    #[test]
    fn test_hop_by_hop_headers_defined() {
        assert!(HOP_BY_HOP_HEADERS.contains(&"host"));
        assert!(HOP_BY_HOP_HEADERS.contains(&"connection"));
        assert!(HOP_BY_HOP_HEADERS.contains(&"keep-alive"));
        assert!(HOP_BY_HOP_HEADERS.contains(&"transfer-encoding"));
        assert!(HOP_BY_HOP_HEADERS.contains(&"proxy-connection"));
        assert!(HOP_BY_HOP_HEADERS.contains(&"te"));
        assert!(HOP_BY_HOP_HEADERS.contains(&"upgrade"));
    }

    #[test]
    fn test_filter_hop_by_hop_keeps_end_to_end_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("relay.local"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));

        let filtered = filter_hop_by_hop(&headers);

        assert!(filtered.get("host").is_none());
        assert!(filtered.get("connection").is_none());
        assert_eq!(filtered["content-type"], "application/json");
        assert_eq!(filtered["authorization"], "Bearer t");
    }

    #[test]
    fn test_filter_hop_by_hop_keeps_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));

        let filtered = filter_hop_by_hop(&headers);
        let values: Vec<_> = filtered.get_all("x-tag").iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_endpoint_without_base_path() {
        let client = client_for("http://localhost:11434");
        assert_eq!(
            client.endpoint("api/generate").as_str(),
            "http://localhost:11434/api/generate"
        );

        let client = client_for("http://localhost:11434/");
        assert_eq!(
            client.endpoint("/api/tags").as_str(),
            "http://localhost:11434/api/tags"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path_prefix() {
        let client = client_for("https://gpu.example.com/ollama/");
        assert_eq!(
            client.endpoint("api/generate").as_str(),
            "https://gpu.example.com/ollama/api/generate"
        );
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        let result = UpstreamClient::new(&UpstreamConfig {
            base_url: "file:///tmp/ollama".to_string(),
            ..UpstreamConfig::default()
        });
        assert!(result.is_err());
    }
}
