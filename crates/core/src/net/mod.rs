//! Network client abstraction.
//!
//! Each source worker owns its own [`NetworkClient`], created through a
//! [`ClientFactory`], so cookies and tokens never leak between sources.

mod cookies;
mod http;

pub use cookies::SessionJar;
pub use http::{HttpClient, HttpClientFactory};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::StoredSession;

/// Errors from network operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to build client: {0}")]
    ClientBuild(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout
        } else if e.is_connect() {
            NetworkError::ConnectionFailed(e.to_string())
        } else {
            NetworkError::Request(e.to_string())
        }
    }
}

/// A single outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Form body; when set the request is a POST.
    pub post_data: Option<Vec<(String, String)>>,
    /// Extra query string parameters.
    pub query: Vec<(String, String)>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, data: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            post_data: Some(data),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

/// Response of a [`FetchRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// HTTP primitives a source worker needs.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Perform a request. Non-2xx statuses are returned, not raised.
    async fn open(&self, request: FetchRequest) -> Result<FetchResponse, NetworkError>;

    /// Submit a login form.
    ///
    /// Succeeds when the response status is a success and the body does not
    /// contain `failure_marker`.
    async fn login(
        &self,
        url: &str,
        fields: Vec<(String, String)>,
        failure_marker: Option<&str>,
    ) -> Result<bool, NetworkError> {
        let response = self.open(FetchRequest::post(url, fields)).await?;
        if !response.is_success() {
            return Ok(false);
        }
        Ok(match failure_marker {
            Some(marker) if !marker.is_empty() => !response.body.contains(marker),
            _ => true,
        })
    }

    /// `Cookie` header value for requests to `url`, if any cookies match.
    fn cookie_header(&self, url: &str) -> Option<String>;

    /// Token negotiated for API-key style auth.
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: Option<String>);

    /// Snapshot of the session for persistence.
    fn export_session(&self) -> StoredSession;

    /// Restore a previously persisted session.
    fn import_session(&self, session: &StoredSession);
}

/// Creates one isolated client per source run.
pub trait ClientFactory: Send + Sync {
    fn create(&self, source_id: &str) -> Result<Arc<dyn NetworkClient>, NetworkError>;
}
