//! HTTP transport seam.
//!
//! The client never talks to `reqwest` directly; every request goes through a
//! [`Transport`]. [`ReqwestTransport`] is the default. Substitute your own to
//! add proxies, recording, or a scripted fake in tests.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::{HordeError, Result};

/// HTTP method. The horde API only needs these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A single outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status code and raw body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues HTTP requests on behalf of [`HordeClient`](crate::HordeClient).
///
/// Implementations are shared between concurrent job pipelines and must be
/// safe for concurrent use. Non-success statuses are returned as responses,
/// not errors; only failures to complete the exchange are errors.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            timeout,
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        }
        .timeout(self.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| HordeError::Transport {
            context: format!(
                "Cannot reach {} {} \u{2014} is the horde reachable?",
                request.method.as_str(),
                request.url
            ),
            source: Box::new(e),
        })?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| HordeError::Transport {
            context: format!("Failed to read response body from {}", request.url),
            source: Box::new(e),
        })?;

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let req = TransportRequest::post("https://example.test/a", serde_json::json!({"k": 1}))
            .header("apikey", "secret");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.header_value("APIKEY"), Some("secret"));
        assert_eq!(req.header_value("missing"), None);

        let req = TransportRequest::get("https://example.test/b");
        assert_eq!(req.method.as_str(), "GET");
        assert!(req.body.is_none());
    }

    #[test]
    fn test_response_success_range() {
        assert!(TransportResponse::new(200, Vec::new()).is_success());
        assert!(TransportResponse::new(202, Vec::new()).is_success());
        assert!(!TransportResponse::new(302, Vec::new()).is_success());
        assert!(!TransportResponse::new(404, Vec::new()).is_success());
    }

    #[test]
    fn test_reqwest_transport_timeout() {
        let transport = ReqwestTransport::new(Duration::from_secs(7));
        assert_eq!(transport.timeout(), Duration::from_secs(7));
    }
}
