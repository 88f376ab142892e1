//! Page fetching
//!
//! This module handles:
//! - The `Fetcher` seam the engine drives (HTTP here; a rendering browser
//!   plugs in by implementing the same trait)
//! - Building one HTTP client per session slot, with cookies, user agent
//!   and optional proxy
//! - Rebuilding a slot's client when its session is rotated
//! - Mapping transport errors and HTTP statuses to failure kinds

use crate::config::{ProxyConfig, UserAgentConfig};
use crate::crawler::session::SessionHint;
use crate::crawler::task::FailureKind;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Content returned by a successful fetch
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL after redirects, used to resolve relative links
    pub url: Url,
    pub html: String,
}

/// Per-fetch options
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub session: SessionHint,
}

/// Fetch failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Network,
    Timeout,
    Blocked,
    Gone,
}

impl From<FetchErrorKind> for FailureKind {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::Network => FailureKind::Network,
            FetchErrorKind::Timeout => FailureKind::Timeout,
            FetchErrorKind::Blocked => FailureKind::Blocked,
            FetchErrorKind::Gone => FailureKind::Gone,
        }
    }
}

/// A failed fetch
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Something that can turn a URL into page content
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url` in the session named by `options.session`
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<RenderedPage, FetchError>;
}

/// Maps an HTTP status to a failure kind
///
/// # Returns
///
/// * `None` - Success status, the body should be used
/// * `Some(kind)` - The response is a failure of that kind
///
/// | Status | Kind |
/// |--------|------|
/// | 2xx | - |
/// | 403, 429, 503 | Blocked |
/// | 404, 410 | Gone |
/// | anything else | Network |
pub fn classify_status(status: StatusCode) -> Option<FetchErrorKind> {
    if status.is_success() {
        return None;
    }

    Some(match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            FetchErrorKind::Blocked
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchErrorKind::Gone,
        _ => FetchErrorKind::Network,
    })
}

/// reqwest-backed fetcher with one client (cookie jar) per session slot
pub struct HttpFetcher {
    user_agent: String,
    proxy: Option<reqwest::Proxy>,
    clients: Mutex<HashMap<usize, (u64, Client)>>,
}

impl HttpFetcher {
    /// Creates a fetcher from the user agent and proxy configuration
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the proxy URL is rejected or a client
    /// cannot be built.
    pub fn new(
        user_agent: &UserAgentConfig,
        proxy_config: &ProxyConfig,
    ) -> Result<Self, reqwest::Error> {
        let proxy = match (proxy_config.enabled, &proxy_config.url) {
            (true, Some(url)) => {
                let mut proxy = reqwest::Proxy::all(url)?;
                if let Some(username) = &proxy_config.username {
                    let password = proxy_config.password.as_deref().unwrap_or("");
                    proxy = proxy.basic_auth(username, password);
                }
                Some(proxy)
            }
            _ => None,
        };

        let fetcher = Self {
            user_agent: user_agent.header_value(),
            proxy,
            clients: Mutex::new(HashMap::new()),
        };

        // Surface TLS/proxy misconfiguration at startup
        fetcher.build_client()?;
        Ok(fetcher)
    }

    fn build_client(&self) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::limited(10))
            .cookie_store(true)
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.clone());
        }

        builder.build()
    }

    /// Returns the client for a session, rebuilding it after a rotation
    fn client_for(&self, session: SessionHint) -> Result<Client, FetchError> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((generation, client)) = clients.get(&session.slot) {
            if *generation == session.generation {
                return Ok(client.clone());
            }
        }

        let client = self
            .build_client()
            .map_err(|e| FetchError::new(FetchErrorKind::Network, e.to_string()))?;
        tracing::debug!(
            slot = session.slot,
            generation = session.generation,
            "Built HTTP client for session"
        );
        clients.insert(session.slot, (session.generation, client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<RenderedPage, FetchError> {
        let client = self.client_for(options.session)?;

        let response = client
            .get(url.clone())
            .timeout(options.timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if let Some(kind) = classify_status(status) {
            return Err(FetchError::new(kind, format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(map_reqwest_error)?;

        Ok(RenderedPage {
            url: final_url,
            html,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::new(FetchErrorKind::Timeout, "Request timeout")
    } else if e.is_connect() {
        FetchError::new(FetchErrorKind::Network, format!("Connection failed: {}", e))
    } else {
        FetchError::new(FetchErrorKind::Network, e.to_string())
    }
}
