//! Page fetcher: one GET with rotating UA, adaptive rate limiting, proxy
//! rotation and classified errors. 429s and 5xx responses are retried
//! through the proxy pool before surfacing.

use crate::core::errors::FetchError;
use crate::core::settings::ScrapingSettings;
use crate::scraping::agent_pool;
use crate::scraping::proxy::{sanitized_proxy, ProxyRotator};
use crate::scraping::rate_limit::RateLimiter;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub body: String,
    pub status: u16,
    pub used_proxy: Option<String>,
}

/// Per-project fetcher. Shares one plain client; proxied attempts build a
/// dedicated client because reqwest fixes the proxy at construction.
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    rotator: Option<Arc<ProxyRotator>>,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(client: Client, settings: &ScrapingSettings) -> Self {
        let rotator = if settings.rotate_proxies {
            ProxyRotator::from_urls(&settings.proxies).map(Arc::new)
        } else {
            None
        };
        Self {
            client,
            limiter: Arc::new(RateLimiter::new(&settings.rate_limiting, settings.delay_ms)),
            rotator,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    pub fn rotator(&self) -> Option<Arc<ProxyRotator>> {
        self.rotator.clone()
    }

    /// Fetch one URL. With rotation enabled, up to `proxies + 1` attempts,
    /// each through a fresh proxy; otherwise a single attempt.
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let attempts = match &self.rotator {
            Some(r) => r.len().await + 1,
            None => 1,
        };

        let mut last_err = FetchError::Network("no fetch attempt made".into());
        for attempt in 0..attempts {
            self.limiter.acquire().await;

            let proxy_url = match &self.rotator {
                Some(r) => r.next().await,
                None => None,
            };

            match self.attempt(url, proxy_url.as_deref()).await {
                Ok(outcome) => {
                    self.limiter.record_success().await;
                    if let (Some(r), Some(p)) = (&self.rotator, &proxy_url) {
                        r.record_success(p).await;
                    }
                    return Ok(outcome);
                }
                Err(FetchError::RateLimited { retry_after }) => {
                    debug!("429 from {} (attempt {})", url, attempt + 1);
                    if let Some(sleep) = self.limiter.record_rate_limited(retry_after).await {
                        tokio::time::sleep(sleep).await;
                    }
                    last_err = FetchError::RateLimited { retry_after };
                }
                Err(FetchError::HttpStatus(code)) if (500..600).contains(&code) => {
                    self.limiter.record_error().await;
                    last_err = FetchError::HttpStatus(code);
                }
                Err(FetchError::AuthBlocked(code)) => {
                    // Credentials won't appear on retry.
                    self.limiter.record_error().await;
                    return Err(FetchError::AuthBlocked(code));
                }
                Err(FetchError::HttpStatus(code)) => {
                    self.limiter.record_error().await;
                    return Err(FetchError::HttpStatus(code));
                }
                Err(e) => {
                    self.limiter.record_error().await;
                    if let (Some(r), Some(p)) = (&self.rotator, &proxy_url) {
                        warn!("proxy {} failed: {}", sanitized_proxy(p), e);
                        r.record_failure(p).await;
                    }
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn attempt(
        &self,
        url: &str,
        proxy_url: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let timeout_ms = self.timeout.as_millis() as u64;

        let response = match proxy_url {
            Some(p) => {
                let proxy = reqwest::Proxy::all(p)
                    .map_err(|e| FetchError::Network(format!("invalid proxy url: {e}")))?;
                let client = Client::builder()
                    .proxy(proxy)
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| FetchError::Network(format!("proxy client build: {e}")))?;
                self.send(&client, url).await?
            }
            None => self.send(&self.client, url).await?,
        };

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(FetchError::RateLimited { retry_after });
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FetchError::AuthBlocked(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let code = status.as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout_ms))?;

        Ok(FetchOutcome {
            body,
            status: code,
            used_proxy: proxy_url.map(|p| p.to_string()),
        })
    }

    async fn send(&self, client: &Client, url: &str) -> Result<reqwest::Response, FetchError> {
        let timeout_ms = self.timeout.as_millis() as u64;
        client
            .get(url)
            .header("User-Agent", agent_pool::random_user_agent())
            .header("Accept", agent_pool::ACCEPT_HEADER)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::ScrapingSettings;

    #[test]
    fn rotation_disabled_without_proxies() {
        let settings = ScrapingSettings::default();
        let fetcher = Fetcher::new(Client::new(), &settings);
        assert!(fetcher.rotator().is_none());
    }

    #[test]
    fn rotation_enabled_with_proxy_list() {
        let settings = ScrapingSettings {
            rotate_proxies: true,
            proxies: vec!["http://proxy0.example:8080".into()],
            ..Default::default()
        };
        let fetcher = Fetcher::new(Client::new(), &settings);
        assert!(fetcher.rotator().is_some());
    }

    #[tokio::test]
    async fn unreachable_host_reports_network_error() {
        let settings = ScrapingSettings {
            delay_ms: 0,
            rate_limiting: crate::core::settings::RateLimitSettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let fetcher = Fetcher::new(Client::new(), &settings)
            .with_timeout(Duration::from_millis(800));
        // Reserved TEST-NET-1 address — nothing listens there.
        let err = fetcher.fetch("http://192.0.2.1:9/page").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Network(_) | FetchError::Timeout(_)
        ));
    }
}
