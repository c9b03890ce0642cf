//! Page fetcher with egress fallback
//!
//! A fetch tries the direct strategy first. On a non-2xx status, a network
//! error or a timeout it retries the same URL through the fallback chain (an
//! optional pool proxy, then the configured relays) and stops at the first
//! success.
//!
//! Outcome classification:
//! - any 2xx response: success
//! - no success and at least one 403/429: blocked
//! - anything else: failed

use crate::config::FetchConfig;
use crate::crawler::egress::{relays_from_config, DirectEgress, EgressError, EgressStrategy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// HTTP statuses that mean the target refused us
const BLOCKED_STATUSES: [u16; 2] = [403, 429];

/// Final classification of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A strategy returned a 2xx response
    Success {
        /// Final URL after redirects
        final_url: String,
        status_code: u16,
        body: String,
        /// Name of the strategy that succeeded
        strategy: String,
    },

    /// Access was denied and no strategy got through
    Blocked {
        status_code: Option<u16>,
        strategy: String,
    },

    /// Every strategy failed for another reason
    Failed { error: String },

    /// The cancellation token fired before a strategy succeeded
    Cancelled,
}

/// One strategy's attempt at a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: String,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl Attempt {
    pub fn is_success(&self) -> bool {
        self.status_code.is_some_and(is_success_status)
    }
}

/// Everything that happened while fetching one URL
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub url: String,
    pub outcome: FetchOutcome,
    pub attempts: Vec<Attempt>,
    pub elapsed: Duration,
}

impl FetchReport {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// The attempt made through a named strategy, if any
    pub fn attempt_by(&self, strategy: &str) -> Option<&Attempt> {
        self.attempts.iter().find(|a| a.strategy == strategy)
    }
}

fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Fetches pages through an ordered chain of egress strategies
#[derive(Clone)]
pub struct Fetcher {
    direct: Arc<dyn EgressStrategy>,
    relays: Vec<Arc<dyn EgressStrategy>>,
    fallback_timeout: Duration,
}

impl Fetcher {
    pub fn new(direct: Arc<dyn EgressStrategy>, relays: Vec<Arc<dyn EgressStrategy>>) -> Self {
        let fallback_timeout = relays
            .iter()
            .map(|r| r.timeout())
            .min()
            .unwrap_or_else(|| direct.timeout());
        Self {
            direct,
            relays,
            fallback_timeout,
        }
    }

    /// Builds the direct strategy and relay chain from configuration
    pub fn from_config(config: &FetchConfig) -> Result<Self, EgressError> {
        let direct = DirectEgress::new(
            config.user_agents.clone(),
            Duration::from_secs(config.direct_timeout_secs),
        )?;
        let relays = relays_from_config(config)?;

        Ok(Self {
            direct: Arc::new(direct),
            relays,
            fallback_timeout: Duration::from_secs(config.relay_timeout_secs),
        })
    }

    /// Timeout applied to fallback strategies such as pool proxies
    pub fn fallback_timeout(&self) -> Duration {
        self.fallback_timeout
    }

    /// Fetches a URL through the direct strategy and the relay chain
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FetchReport {
        self.fetch_via(url, None, cancel).await
    }

    /// Fetches a URL, trying `proxy` first among the fallbacks
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to fetch
    /// * `proxy` - Optional pool proxy strategy
    /// * `cancel` - Aborts the in-flight attempt and skips the rest
    pub async fn fetch_via(
        &self,
        url: &str,
        proxy: Option<Arc<dyn EgressStrategy>>,
        cancel: &CancellationToken,
    ) -> FetchReport {
        let started = Instant::now();
        let mut chain: Vec<Arc<dyn EgressStrategy>> = Vec::with_capacity(self.relays.len() + 2);
        chain.push(Arc::clone(&self.direct));
        chain.extend(proxy);
        chain.extend(self.relays.iter().cloned());

        let mut attempts = Vec::with_capacity(chain.len());
        let mut blocked: Option<(u16, String)> = None;

        for strategy in chain {
            if cancel.is_cancelled() {
                return report(url, FetchOutcome::Cancelled, attempts, started);
            }

            let attempt_started = Instant::now();
            let timeout = strategy.timeout();
            let result = tokio::select! {
                _ = cancel.cancelled() => None,
                r = tokio::time::timeout(timeout, strategy.get(url)) => Some(r),
            };
            let elapsed = attempt_started.elapsed();

            let result = match result {
                Some(r) => r,
                None => {
                    attempts.push(Attempt {
                        strategy: strategy.name().to_string(),
                        status_code: None,
                        error: Some("cancelled".to_string()),
                        elapsed,
                    });
                    return report(url, FetchOutcome::Cancelled, attempts, started);
                }
            };

            match result {
                Ok(Ok(response)) if is_success_status(response.status) => {
                    tracing::debug!(
                        "Fetched {} via {} ({}) in {:?}",
                        url,
                        strategy.name(),
                        response.status,
                        elapsed
                    );
                    attempts.push(Attempt {
                        strategy: strategy.name().to_string(),
                        status_code: Some(response.status),
                        error: None,
                        elapsed,
                    });
                    let outcome = FetchOutcome::Success {
                        final_url: response.final_url,
                        status_code: response.status,
                        body: response.body,
                        strategy: strategy.name().to_string(),
                    };
                    return report(url, outcome, attempts, started);
                }
                Ok(Ok(response)) => {
                    tracing::debug!("{} returned {} via {}", url, response.status, strategy.name());
                    if BLOCKED_STATUSES.contains(&response.status) {
                        blocked = Some((response.status, strategy.name().to_string()));
                    }
                    attempts.push(Attempt {
                        strategy: strategy.name().to_string(),
                        status_code: Some(response.status),
                        error: Some(format!("HTTP {}", response.status)),
                        elapsed,
                    });
                }
                Ok(Err(e)) => {
                    tracing::debug!("{} failed via {}: {}", url, strategy.name(), e);
                    attempts.push(Attempt {
                        strategy: strategy.name().to_string(),
                        status_code: None,
                        error: Some(e.to_string()),
                        elapsed,
                    });
                }
                Err(_) => {
                    let e = EgressError::Timeout(timeout);
                    tracing::debug!("{} failed via {}: {}", url, strategy.name(), e);
                    attempts.push(Attempt {
                        strategy: strategy.name().to_string(),
                        status_code: None,
                        error: Some(e.to_string()),
                        elapsed,
                    });
                }
            }
        }

        let outcome = match blocked {
            Some((status_code, strategy)) => FetchOutcome::Blocked {
                status_code: Some(status_code),
                strategy,
            },
            None => FetchOutcome::Failed {
                error: summarize_attempts(&attempts),
            },
        };
        report(url, outcome, attempts, started)
    }
}

fn report(
    url: &str,
    outcome: FetchOutcome,
    attempts: Vec<Attempt>,
    started: Instant,
) -> FetchReport {
    FetchReport {
        url: url.to_string(),
        outcome,
        attempts,
        elapsed: started.elapsed(),
    }
}

fn summarize_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no egress strategy available".to_string();
    }
    attempts
        .iter()
        .map(|a| {
            format!(
                "{}: {}",
                a.strategy,
                a.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}
