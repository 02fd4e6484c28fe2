//! Mock network client for testing.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::net::{
    ClientFactory, FetchRequest, FetchResponse, NetworkClient, NetworkError, SessionJar,
};
use crate::session::StoredSession;

/// Scripted behavior shared by the factory and all of its clients.
#[derive(Debug, Default)]
struct Script {
    responses: HashMap<String, FetchResponse>,
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    panics: HashSet<String>,
    requests: Vec<FetchRequest>,
}

/// Mock implementation of the ClientFactory trait.
///
/// Responses are scripted per URL (the request URL without extra query
/// parameters). Unscripted URLs answer `404`. Every request made by any
/// client of the factory is recorded.
///
/// # Example
///
/// ```rust,ignore
/// let clients = MockClientFactory::new();
/// clients
///     .respond("https://t.example/search?q=Dune", FetchResponse::new(200, page))
///     .await;
/// clients.delay("https://slow.example/search?q=Dune", Duration::from_secs(30)).await;
///
/// // ... run a search ...
///
/// assert_eq!(clients.request_count("https://t.example/search?q=Dune").await, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockClientFactory {
    script: Arc<RwLock<Script>>,
    clients: Arc<Mutex<Vec<Arc<MockClient>>>>,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests to `url` with `response`.
    pub async fn respond(&self, url: &str, response: FetchResponse) {
        self.script
            .write()
            .await
            .responses
            .insert(url.to_string(), response);
    }

    /// Hold requests to `url` for `delay` before answering.
    pub async fn delay(&self, url: &str, delay: Duration) {
        self.script.write().await.delays.insert(url.to_string(), delay);
    }

    /// Fail requests to `url` with a connection error.
    pub async fn fail(&self, url: &str) {
        self.script.write().await.failures.insert(url.to_string());
    }

    /// Panic inside the client when `url` is requested.
    pub async fn panic_on(&self, url: &str) {
        self.script.write().await.panics.insert(url.to_string());
    }

    /// All recorded requests, in order.
    pub async fn requests(&self) -> Vec<FetchRequest> {
        self.script.read().await.requests.clone()
    }

    pub async fn request_count(&self, url: &str) -> usize {
        self.script
            .read()
            .await
            .requests
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub async fn total_requests(&self) -> usize {
        self.script.read().await.requests.len()
    }

    /// Number of clients created so far.
    pub async fn created_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The most recently created client.
    pub async fn last_client(&self) -> Option<Arc<MockClient>> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl ClientFactory for MockClientFactory {
    fn create(&self, _source_id: &str) -> Result<Arc<dyn NetworkClient>, NetworkError> {
        let client = Arc::new(MockClient {
            script: Arc::clone(&self.script),
            jar: SessionJar::new(),
            token: std::sync::RwLock::new(None),
        });
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&client));
        Ok(client)
    }
}

/// Client created by [`MockClientFactory`].
///
/// Keeps its own cookie jar: `Set-Cookie` headers of scripted responses are
/// stored the way a real client would.
#[derive(Debug)]
pub struct MockClient {
    script: Arc<RwLock<Script>>,
    jar: SessionJar,
    token: std::sync::RwLock<Option<String>>,
}

#[async_trait]
impl NetworkClient for MockClient {
    async fn open(&self, request: FetchRequest) -> Result<FetchResponse, NetworkError> {
        let url = request.url.clone();
        let (response, delay, fail, panic) = {
            let mut script = self.script.write().await;
            script.requests.push(request);
            (
                script.responses.get(&url).cloned(),
                script.delays.get(&url).copied(),
                script.failures.contains(&url),
                script.panics.contains(&url),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if panic {
            panic!("mock client asked to panic on {}", url);
        }
        if fail {
            return Err(NetworkError::ConnectionFailed(url));
        }

        let response = response.unwrap_or_else(|| FetchResponse::new(404, "Not Found"));
        if let Some(set_cookie) = response.headers.get("set-cookie") {
            if let Ok(origin) = Url::parse(&url) {
                self.jar.store_set_cookie(set_cookie, &origin);
            }
        }
        Ok(response)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_url_is_not_found() {
        let factory = MockClientFactory::new();
        let client = factory.create("a").unwrap();
        let response = client.open(FetchRequest::get("https://x.example/")).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(factory.total_requests().await, 1);
        assert_eq!(factory.created_clients().await, 1);
    }

    #[tokio::test]
    async fn test_set_cookie_is_stored() {
        let factory = MockClientFactory::new();
        factory
            .respond(
                "https://x.example/login",
                FetchResponse::new(200, "").with_header("Set-Cookie", "sid=1; Path=/"),
            )
            .await;
        let client = factory.create("a").unwrap();
        client
            .open(FetchRequest::get("https://x.example/login"))
            .await
            .unwrap();
        assert_eq!(
            client.cookie_header("https://x.example/"),
            Some("sid=1".to_string())
        );
    }

    #[tokio::test]
    async fn test_failure_is_connection_error() {
        let factory = MockClientFactory::new();
        factory.fail("https://down.example/").await;
        let client = factory.create("a").unwrap();
        let result = client.open(FetchRequest::get("https://down.example/")).await;
        assert!(matches!(result, Err(NetworkError::ConnectionFailed(_))));
    }
}
