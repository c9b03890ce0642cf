//! Egress strategies
//!
//! An egress strategy is one way of issuing the outbound GET: directly, via a
//! URL-prefix relay, or through a proxy. The fetcher tries them in order.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use reqwest::{redirect::Policy, Client, Proxy};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{FetchConfig, RelayKind};

/// Errors from a single egress attempt
#[derive(Debug, Error)]
pub enum EgressError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid egress configuration: {0}")]
    Config(String),
}

/// Response of one egress attempt, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressResponse {
    pub status: u16,
    /// URL of the fetched page; for relays, the target URL
    pub final_url: String,
    pub body: String,
}

/// One method of issuing the outbound request
#[async_trait]
pub trait EgressStrategy: Send + Sync {
    /// Name recorded in fetch attempts
    fn name(&self) -> &str;

    /// Upper bound for one attempt through this strategy
    fn timeout(&self) -> Duration;

    async fn get(&self, url: &str) -> Result<EgressResponse, EgressError>;
}

/// Builds an HTTP client for one egress strategy
///
/// # Arguments
///
/// * `timeout` - Total request timeout
/// * `proxy` - Optional proxy URL all traffic is routed through
pub fn build_http_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy_url) = proxy {
        builder = builder.proxy(Proxy::all(proxy_url)?);
    }

    builder.build()
}

fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    headers
}

async fn read_response(
    response: reqwest::Response,
    final_url: Option<&str>,
) -> Result<EgressResponse, EgressError> {
    let status = response.status().as_u16();
    let final_url = final_url
        .map(str::to_string)
        .unwrap_or_else(|| response.url().to_string());
    let body = response.text().await?;
    Ok(EgressResponse {
        status,
        final_url,
        body,
    })
}

/// Direct GET with a rotated user agent and browser headers
pub struct DirectEgress {
    client: Client,
    user_agents: Vec<String>,
    timeout: Duration,
}

impl DirectEgress {
    pub fn new(user_agents: Vec<String>, timeout: Duration) -> Result<Self, EgressError> {
        if user_agents.is_empty() {
            return Err(EgressError::Config("no user agents configured".to_string()));
        }
        Ok(Self {
            client: build_http_client(timeout, None)?,
            user_agents,
            timeout,
        })
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[async_trait]
impl EgressStrategy for DirectEgress {
    fn name(&self) -> &str {
        "direct"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get(&self, url: &str) -> Result<EgressResponse, EgressError> {
        let headers = browser_headers(self.pick_user_agent());
        let response = self.client.get(url).headers(headers).send().await?;
        read_response(response, None).await
    }
}

/// Relay that fetches `endpoint + percent_encode(target)`
pub struct PrefixRelay {
    name: String,
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl PrefixRelay {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EgressError> {
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client: build_http_client(timeout, None)?,
            timeout,
        })
    }

    /// The relay URL requested for a target
    pub fn relay_url(&self, target: &str) -> String {
        let encoded: String = ::url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("{}{}", self.endpoint, encoded)
    }
}

#[async_trait]
impl EgressStrategy for PrefixRelay {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get(&self, url: &str) -> Result<EgressResponse, EgressError> {
        let response = self.client.get(self.relay_url(url)).send().await?;
        read_response(response, Some(url)).await
    }
}

/// GET routed through an HTTP or SOCKS5 proxy
pub struct ProxyEgress {
    name: String,
    client: Client,
    timeout: Duration,
}

impl ProxyEgress {
    pub fn new(
        name: impl Into<String>,
        proxy_url: &str,
        timeout: Duration,
    ) -> Result<Self, EgressError> {
        Ok(Self {
            name: name.into(),
            client: build_http_client(timeout, Some(proxy_url))?,
            timeout,
        })
    }

    /// Strategy name used for a pool proxy
    pub fn pool_name(proxy_url: &str) -> String {
        format!("proxy:{}", proxy_url)
    }
}

#[async_trait]
impl EgressStrategy for ProxyEgress {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get(&self, url: &str) -> Result<EgressResponse, EgressError> {
        let response = self.client.get(url).send().await?;
        read_response(response, None).await
    }
}

/// Builds the ordered relay chain from configuration
pub fn relays_from_config(
    config: &FetchConfig,
) -> Result<Vec<Arc<dyn EgressStrategy>>, EgressError> {
    let timeout = Duration::from_secs(config.relay_timeout_secs);

    config
        .relays
        .iter()
        .map(|relay| -> Result<_, EgressError> {
            let strategy: Arc<dyn EgressStrategy> = match relay.kind {
                RelayKind::Prefix => {
                    Arc::new(PrefixRelay::new(&relay.name, &relay.endpoint, timeout)?)
                }
                RelayKind::Proxy => {
                    Arc::new(ProxyEgress::new(&relay.name, &relay.endpoint, timeout)?)
                }
            };
            Ok(strategy)
        })
        .collect()
}
