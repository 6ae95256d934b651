// Transport adapter: one JSON request in, one JSON response out.
// No caching and no retries; a failed attempt is reported straight back.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{ClientConfig, ClientError};

pub const SEARCH_PATH: &str = "/chat/attractions";
pub const ITINERARY_PATH: &str = "/itinerary";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Unreachable(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Invalid response (status {status}): {reason}")]
    InvalidResponse { status: u16, reason: String },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Could not encode request body: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn payload<T: Serialize>(self, body: &T) -> Result<Self, TransportError> {
        let body = serde_json::to_value(body).map_err(|e| TransportError::Encode(e.to_string()))?;
        Ok(self.json(body))
    }
}

// A structurally valid response. A non-2xx status is still a response: the
// body decides whether it is an application-level failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;

    // Base address used in user-facing connectivity hints
    fn base_url(&self) -> &str;
}

pub struct HttpTransport {
    client: Client,
    base_url: Url,
    display_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::InitError(format!("failed to create HTTP client: {}", e)))?;
        Self::with_client(config, client)
    }

    pub fn with_client(config: &ClientConfig, client: Client) -> Result<Self, ClientError> {
        let base_url = config.validate()?;

        Ok(Self {
            client,
            base_url,
            display_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    // Appends to the base path, so a base like `http://host/api` keeps its prefix
    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidEndpoint(format!("{}: base cannot take a path", path)))?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_decode() {
        TransportError::InvalidResponse {
            status: e.status().map(|s| s.as_u16()).unwrap_or_default(),
            reason: e.to_string(),
        }
    } else {
        TransportError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let url = self.endpoint(&request.path)?;
        debug!(method = ?request.method, %url, "sending request");

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .header(CONTENT_TYPE, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();

        let bytes = response.bytes().await.map_err(classify)?;

        // Error statuses carry meaning on their own; their body is optional
        let body = match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => body,
            Err(_) if !(200..300).contains(&status) => Value::Null,
            Err(e) => {
                return Err(TransportError::InvalidResponse {
                    status,
                    reason: e.to_string(),
                })
            }
        };

        debug!(status, "received response");
        Ok(Response { status, body })
    }

    fn base_url(&self) -> &str {
        &self.display_url
    }
}
