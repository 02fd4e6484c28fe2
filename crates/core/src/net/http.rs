//! reqwest-backed network client.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Url};
use tracing::debug;

use crate::session::StoredSession;

use super::{ClientFactory, FetchRequest, FetchResponse, NetworkClient, NetworkError, SessionJar};

/// HTTP client for a single source run.
pub struct HttpClient {
    client: Client,
    jar: Arc<SessionJar>,
    token: RwLock<Option<String>>,
}

impl HttpClient {
    /// Create a client with its own cookie jar.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, NetworkError> {
        let jar = Arc::new(SessionJar::new());
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| NetworkError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            jar,
            token: RwLock::new(None),
        })
    }
}

#[async_trait]
impl NetworkClient for HttpClient {
    async fn open(&self, request: FetchRequest) -> Result<FetchResponse, NetworkError> {
        debug!(
            url = %request.url,
            post = request.post_data.is_some(),
            "Opening"
        );

        let mut builder = match &request.post_data {
            Some(data) => self.client.post(&request.url).form(data),
            None => self.client.get(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let has_auth = request
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !has_auth {
            if let Some(token) = self.token() {
                builder = builder.header(AUTHORIZATION, token);
            }
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(FetchResponse {
            status,
            body,
            headers,
        })
    }

    fn cookie_header(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        self.jar.header_matching(parsed.host_str()?)
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn export_session(&self) -> StoredSession {
        StoredSession {
            cookies: self.jar.export(),
            token: self.token(),
            saved_at: Utc::now(),
        }
    }

    fn import_session(&self, session: &StoredSession) {
        self.jar.import(&session.cookies);
        if session.token.is_some() {
            self.set_token(session.token.clone());
        }
    }
}

/// Builds a fresh [`HttpClient`] for every source run.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
    user_agent: String,
}

impl HttpClientFactory {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, source_id: &str) -> Result<Arc<dyn NetworkClient>, NetworkError> {
        debug!(source = source_id, "Creating HTTP client");
        let client = HttpClient::new(self.timeout, &self.user_agent)?;
        Ok(Arc::new(client))
    }
}
