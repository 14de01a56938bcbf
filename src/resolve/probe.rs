//! Optional HEAD probe for link targets the crawl never fetched
//!
//! Documentation often links to URLs outside the crawled set that redirect
//! into it (old slugs, renamed sections). Probing such a target once with a
//! HEAD request reveals its redirects so the resolver can follow them.

use crate::config::{ResolverConfig, UserAgentConfig};
use crate::crawler::{build_http_client, follow_redirects, RateLimiter};
use crate::storage::RedirectEdge;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Discovers redirects of a URL without fetching its body
#[async_trait]
pub trait LinkProbe: Send + Sync {
    /// Redirect hops observed from `url`; empty when it does not redirect
    /// or the probe failed
    async fn probe(&self, url: &str) -> Vec<RedirectEdge>;
}

/// HEAD-request probe with a per-run cache
#[derive(Debug)]
pub struct HttpLinkProbe {
    client: Client,
    cache: Mutex<HashMap<String, Vec<RedirectEdge>>>,
}

impl HttpLinkProbe {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        user_agent: &UserAgentConfig,
        resolver: &ResolverConfig,
    ) -> Result<Self, reqwest::Error> {
        let client =
            build_http_client(user_agent, Duration::from_secs(resolver.probe_timeout_secs))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl LinkProbe for HttpLinkProbe {
    async fn probe(&self, url: &str) -> Vec<RedirectEdge> {
        if let Some(cached) = self.cache.lock().await.get(url) {
            return cached.clone();
        }

        let edges = match follow_redirects(&self.client, Method::HEAD, url).await {
            Ok(walk) => walk.edges,
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                Vec::new()
            }
        };

        self.cache
            .lock()
            .await
            .insert(url.to_string(), edges.clone());
        edges
    }
}

/// Probes each target once, politely spaced by `limiter`
///
/// Stops early when `cancel` fires.
pub async fn probe_targets(
    probe: &dyn LinkProbe,
    limiter: &RateLimiter,
    cancel: &CancellationToken,
    acquire_timeout: Duration,
    targets: &[String],
) -> Vec<RedirectEdge> {
    let mut edges = Vec::new();

    for target in targets {
        if limiter.acquire(cancel, acquire_timeout).await.is_err() {
            break;
        }
        edges.extend(probe.probe(target).await);
    }

    info!(
        "Probed {} unresolved targets, found {} redirect hops",
        targets.len(),
        edges.len()
    );
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LinkProbe for CountingProbe {
        async fn probe(&self, url: &str) -> Vec<RedirectEdge> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec![RedirectEdge::new(url, format!("{}-new", url))]
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_targets_collects_edges() {
        let probe = CountingProbe {
            calls: AtomicUsize::new(0),
        };
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let cancel = CancellationToken::new();
        let targets = vec![
            "https://docs.example.com/a".to_string(),
            "https://docs.example.com/b".to_string(),
        ];

        let edges =
            probe_targets(&probe, &limiter, &cancel, Duration::from_secs(5), &targets).await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[1].target, "https://docs.example.com/b-new");
    }

    #[tokio::test]
    async fn test_cancelled_probe_stops() {
        let probe = CountingProbe {
            calls: AtomicUsize::new(0),
        };
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let edges = probe_targets(
            &probe,
            &limiter,
            &cancel,
            Duration::from_secs(5),
            &["https://docs.example.com/a".to_string()],
        )
        .await;

        assert!(edges.is_empty());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
