//! Versioned precache.
//!
//! Install fills the current cache from the manifest in one all-or-nothing
//! write; activate deletes every cache left behind by an older version so at
//! most one generation is live.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::WorkerConfig;
use crate::error::{SwError, SwResult};
use crate::http::{Request, Response};
use crate::platform::{CacheStore, Network, WindowClients};

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL, without fragment.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Bytes,

    /// When the entry was stored.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Pair a request with the response that answered it.
    pub fn new(request: &Request, response: Response) -> Self {
        Self {
            url: request.cache_key(),
            method: request.method.clone(),
            status: response.status,
            headers: response.headers,
            body: response.body,
            cached_at: Utc::now(),
        }
    }
}

async fn fetch_for_cache(network: &dyn Network, url: Url) -> SwResult<CacheEntry> {
    let request = Request::get(url);
    let response = network.fetch(request.clone()).await?;

    if !response.ok() {
        return Err(SwError::HttpStatus {
            url: request.url.to_string(),
            status: response.status,
        });
    }

    debug!(url = %request.url, status = response.status, "precached");
    Ok(CacheEntry::new(&request, response))
}

/// Handle the install event. Returns the number of cached entries.
pub async fn on_install(
    config: &WorkerConfig,
    caches: &dyn CacheStore,
    network: &dyn Network,
) -> SwResult<usize> {
    let cache_name = config.cache_name();
    caches.open(&cache_name).await?;

    let urls = config.precache_urls()?;
    let entries = try_join_all(urls.into_iter().map(|url| fetch_for_cache(network, url))).await?;

    let count = entries.len();
    caches.put_all(&cache_name, entries).await?;

    info!(cache = %cache_name, entries = count, "Precache populated");
    Ok(count)
}

/// Handle the activate event. Returns the names of deleted caches.
pub async fn on_activate(
    config: &WorkerConfig,
    caches: &dyn CacheStore,
    clients: &dyn WindowClients,
) -> SwResult<Vec<String>> {
    let current = config.cache_name();
    let mut deleted = Vec::new();

    for name in caches.keys().await? {
        if name == current {
            continue;
        }
        if caches.delete(&name).await? {
            info!(cache = %name, "Deleted stale cache");
            deleted.push(name);
        }
    }

    clients.claim().await?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCacheStorage, MemoryClients, MemoryNetwork};

    fn config(version: u32) -> WorkerConfig {
        WorkerConfig {
            origin: "https://ezevent.test".to_string(),
            cache_version: version,
            ..Default::default()
        }
    }

    fn serving_manifest(config: &WorkerConfig) -> MemoryNetwork {
        let network = MemoryNetwork::new();
        for url in config.precache_urls().unwrap() {
            network.route(url.as_str(), 200, format!("asset {}", url.path()));
        }
        network
    }

    #[tokio::test]
    async fn test_install_populates_current_cache() {
        let config = config(1);
        let caches = MemoryCacheStorage::new();
        let network = serving_manifest(&config);

        let count = on_install(&config, &caches, &network).await.unwrap();

        assert_eq!(count, config.precache.len());
        let request = Request::get(config.resolve("/index.html").unwrap());
        let entry = caches
            .match_request("ezevent-cache-v1", &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.body, Bytes::from("asset /index.html"));
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let config = config(1);
        let caches = MemoryCacheStorage::new();
        let network = serving_manifest(&config);
        network.fail(config.resolve("/manifest.json").unwrap().as_str());

        let result = on_install(&config, &caches, &network).await;

        assert!(matches!(result, Err(SwError::Network { .. })));
        assert_eq!(caches.entry_count("ezevent-cache-v1").await, 0);
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let config = config(1);
        let caches = MemoryCacheStorage::new();
        let network = serving_manifest(&config);
        network.route(config.resolve("/").unwrap().as_str(), 404, "missing");

        let result = on_install(&config, &caches, &network).await;

        assert!(matches!(result, Err(SwError::HttpStatus { status: 404, .. })));
        assert_eq!(caches.entry_count("ezevent-cache-v1").await, 0);
    }

    #[tokio::test]
    async fn test_activate_leaves_only_current_cache() {
        let caches = MemoryCacheStorage::new();
        let clients = MemoryClients::new();

        for version in 1..=3 {
            let config = config(version);
            let network = serving_manifest(&config);
            caches.open("unrelated-cache").await.unwrap();

            on_install(&config, &caches, &network).await.unwrap();
            on_activate(&config, &caches, &clients).await.unwrap();

            assert_eq!(caches.keys().await.unwrap(), vec![config.cache_name()]);
        }
        assert!(clients.claimed());
    }

    #[tokio::test]
    async fn test_activate_reports_deleted_caches() {
        let config = config(2);
        let caches = MemoryCacheStorage::new();
        let clients = MemoryClients::new();
        caches.open("ezevent-cache-v1").await.unwrap();
        caches.open("ezevent-cache-v2").await.unwrap();

        let deleted = on_activate(&config, &caches, &clients).await.unwrap();

        assert_eq!(deleted, vec!["ezevent-cache-v1".to_string()]);
    }
}
