use crate::error::{RequestError, Result};
use crate::item::WorkItem;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a single GET produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub latency: Duration,
}

/// Executes one request for a work item. Implementations own transport
/// concerns (TLS, pooling, DNS); callers only see a status or an error.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, item: &WorkItem) -> std::result::Result<Response, RequestError>;

    /// Called once the retry loop is done with `item`, successful or not.
    fn release(&self, _item: &WorkItem) {}
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout: Duration,
    /// `None` leaves the idle pool unbounded.
    pub pool_max_idle_per_host: Option<usize>,
    pub insecure: bool,
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            pool_max_idle_per_host: None,
            insecure: false,
            user_agent: "fanout/0.1".to_string(),
        }
    }
}

/// [`HttpClient`] backed by reqwest. Direct requests share one connection
/// pool; proxied requests get a client bound to that proxy, kept until the
/// item is released so retries reuse it.
pub struct ReqwestClient {
    client: Client,
    settings: ClientSettings,
    proxied: Mutex<HashMap<String, Client>>,
}

impl ReqwestClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let client = Self::builder(&settings).build()?;
        Ok(Self {
            client,
            settings,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    /// Number of proxy-bound clients currently held.
    pub fn cached_proxies(&self) -> usize {
        self.proxied.lock().len()
    }

    fn builder(settings: &ClientSettings) -> reqwest::ClientBuilder {
        let mut builder = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .danger_accept_invalid_certs(settings.insecure);
        if let Some(max_idle) = settings.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(max_idle);
        }
        builder
    }

    fn proxied(&self, proxy: &str) -> std::result::Result<Client, RequestError> {
        if let Some(client) = self.proxied.lock().get(proxy) {
            return Ok(client.clone());
        }
        let client = self.build_proxied(proxy)?;
        self.proxied.lock().insert(proxy.to_string(), client.clone());
        Ok(client)
    }

    fn build_proxied(&self, proxy: &str) -> std::result::Result<Client, RequestError> {
        let proxy_url = if proxy.contains("://") {
            proxy.to_string()
        } else {
            format!("http://{}", proxy)
        };
        let proxy = reqwest::Proxy::all(&proxy_url)
            .map_err(|e| RequestError::Transport(format!("invalid proxy {}: {}", proxy_url, e)))?;
        Self::builder(&self.settings)
            .proxy(proxy)
            .build()
            .map_err(|e| RequestError::Transport(e.to_string()))
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, item: &WorkItem) -> std::result::Result<Response, RequestError> {
        let client = match item.proxy() {
            Some(proxy) => self.proxied(proxy)?,
            None => self.client.clone(),
        };

        let start = Instant::now();
        let res = client.get(item.url().clone()).send().await?;
        let latency = start.elapsed();

        Ok(Response {
            status: res.status().as_u16(),
            latency,
        })
    }

    fn release(&self, item: &WorkItem) {
        if let Some(proxy) = item.proxy() {
            self.proxied.lock().remove(proxy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn proxied_client_is_reused_until_released() {
        let client = ReqwestClient::new(ClientSettings {
            timeout: Duration::from_secs(2),
            ..ClientSettings::default()
        })
        .unwrap();
        let url = Url::parse("http://example.invalid/ip").unwrap();
        let item = WorkItem::via_proxy(0, url.clone(), "127.0.0.1:1");
        let direct = WorkItem::new(1, url);

        assert!(client.get(&item).await.is_err());
        assert!(client.get(&item).await.is_err());
        assert_eq!(client.cached_proxies(), 1);

        client.release(&direct);
        assert_eq!(client.cached_proxies(), 1);
        client.release(&item);
        assert_eq!(client.cached_proxies(), 0);
    }
}
