//! Outbound delivery seam for rendered notifications.

use std::time::Duration;

use async_trait::async_trait;

use crate::storage::model::HttpMethod;

/// Performs the outbound HTTP request for a rendered notification. Split
/// out from [`super::Dispatcher`] so tests can substitute a recording
/// double instead of making real network calls.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, method: HttpMethod, url: &str, body: &str) -> Result<u16, String>;
}

/// `reqwest`-backed transport used in production.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Panics
    /// Panics if the underlying TLS backend can't be initialized, which
    /// only happens on a broken build environment.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build notification HTTP client");
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    async fn send(&self, method: HttpMethod, url: &str, body: &str) -> Result<u16, String> {
        let request = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url).header("Content-Type", "text/plain").body(body.to_string()),
        };
        let response = request.send().await.map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }
}

/// Discards every notification; used where a `Dispatcher` is required but
/// the test under way doesn't care about delivery (e.g. status-engine
/// transition tests).
pub struct NullTransport;

#[async_trait]
impl NotificationTransport for NullTransport {
    async fn send(&self, _method: HttpMethod, _url: &str, _body: &str) -> Result<u16, String> {
        Ok(200)
    }
}
