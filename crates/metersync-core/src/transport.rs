//! Transport abstraction and the reqwest-backed HTTP transport.
//!
//! The executor never talks HTTP directly; it goes through [`Transport`] so
//! hosts can inject caching or recording layers. A transport that serves a
//! response from cache reports it via [`TransportResponse::from_cache`], and
//! the executor skips cost-pacing waits for such responses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::Value;

use crate::error::SyncError;

/// Header used by caching layers to mark served-from-cache responses.
const CACHE_STATUS_HEADER: &str = "x-cache";

/// Response produced by one transport call.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Raw response body bytes.
    pub body: Vec<u8>,
    /// Whether the response was served from a cache rather than the API.
    /// Cached responses consumed no cost points.
    pub from_cache: bool,
}

/// Performs one GraphQL round-trip.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request with the given document and variables.
    async fn send(&self, document: &str, variables: &Value)
        -> Result<TransportResponse, SyncError>;
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    endpoint: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl HttpTransportBuilder {
    /// Create a builder for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            endpoint: endpoint.into(),
            headers,
            timeout: Duration::from_secs(30),
        }
    }

    /// Add a header applied to every request.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a bearer token header.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        if let Ok(header) = HeaderValue::from_str(&value) {
            self.headers.insert(reqwest::header::AUTHORIZATION, header);
        }
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<HttpTransport, SyncError> {
        let http = reqwest::Client::builder()
            .default_headers(self.headers)
            .timeout(self.timeout)
            .build()?;
        Ok(HttpTransport {
            endpoint: self.endpoint,
            http,
        })
    }
}

/// HTTP transport posting standard GraphQL JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with default configuration.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SyncError> {
        HttpTransportBuilder::new(endpoint).build()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        document: &str,
        variables: &Value,
    ) -> Result<TransportResponse, SyncError> {
        let body = serde_json::json!({
            "query": document,
            "variables": variables,
        });

        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        let from_cache = response
            .headers()
            .get(CACHE_STATUS_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("hit"));
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status,
                body: truncate_body(&bytes),
            });
        }

        Ok(TransportResponse {
            body: bytes.to_vec(),
            from_cache,
        })
    }
}

fn truncate_body(bytes: &[u8]) -> String {
    const MAX_LEN: usize = 4096;
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if body.len() > MAX_LEN {
        body.truncate(MAX_LEN);
        body.push('…');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_caps_length() {
        let long = vec![b'a'; 5000];
        let body = truncate_body(&long);
        assert!(body.len() <= 4096 + '…'.len_utf8());
        assert!(body.ends_with('…'));
    }

    #[test]
    fn truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body(b"{\"data\":null}"), "{\"data\":null}");
    }
}
