//! HTTPS client for the legacy provider

use async_trait::async_trait;
use reqwest::header::{COOKIE, REFERER};
use tracing::debug;

use super::{JsonpEnvelope, LegacyCounts, LegacyProvider};
use crate::config::LegacyConfig;
use crate::error::LegacyError;

/// Talks to the busuanzi endpoint with the fixed callback and tracking cookie.
///
/// Every request carries the configured timeout, independent of any retry
/// accounting done by callers.
pub struct HttpLegacyProvider {
    client: reqwest::Client,
    url: String,
    cookie: String,
    envelope: JsonpEnvelope,
}

impl HttpLegacyProvider {
    /// Build a provider client from configuration
    pub fn new(config: &LegacyConfig) -> Result<Self, LegacyError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| LegacyError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}?jsonpCallback={}", config.endpoint, config.callback),
            cookie: config.cookie.clone(),
            envelope: JsonpEnvelope::new(&config.callback),
        })
    }

    /// Full request URL including the callback parameter
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get(&self, referer: &str) -> Result<reqwest::Response, LegacyError> {
        self.client
            .get(&self.url)
            .header(REFERER, referer)
            .header(COOKIE, &self.cookie)
            .send()
            .await
            .map_err(|e| LegacyError::Transport(e.to_string()))
    }
}

#[async_trait]
impl LegacyProvider for HttpLegacyProvider {
    async fn lookup(&self, referer: &str) -> Result<LegacyCounts, LegacyError> {
        let response = self.get(referer).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LegacyError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LegacyError::Transport(e.to_string()))?;
        let counts = self.envelope.unwrap(&body)?;
        debug!(referer = %referer, ?counts, "Legacy lookup succeeded");
        Ok(counts)
    }

    async fn notify(&self, referer: &str) -> Result<(), LegacyError> {
        let response = self.get(referer).await?;
        debug!(referer = %referer, status = response.status().as_u16(), "Legacy hit sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url() {
        let provider = HttpLegacyProvider::new(&LegacyConfig::default()).unwrap();
        assert_eq!(
            provider.url(),
            "https://busuanzi.ibruce.info/busuanzi?jsonpCallback=BusuanziCallback_777487655111"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let config = LegacyConfig {
            endpoint: "http://127.0.0.1:9/busuanzi".to_string(),
            timeout_ms: 200,
            ..Default::default()
        };
        let provider = HttpLegacyProvider::new(&config).unwrap();
        assert!(matches!(
            provider.lookup("https://example.com/").await,
            Err(LegacyError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever answering
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let config = LegacyConfig {
            endpoint: format!("http://{}/busuanzi", addr),
            timeout_ms: 300,
            ..Default::default()
        };
        let provider = HttpLegacyProvider::new(&config).unwrap();

        let started = std::time::Instant::now();
        let result = provider.lookup("https://example.com/").await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(LegacyError::Transport(_))));
        assert!(elapsed >= std::time::Duration::from_millis(250));
        assert!(elapsed < std::time::Duration::from_secs(2));
    }
}
