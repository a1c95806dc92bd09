//! Cache-first fetch interception.

use tracing::{trace, warn};

use crate::config::WorkerConfig;
use crate::error::SwResult;
use crate::http::{Request, Response};
use crate::platform::{CacheStore, Network};

/// Handle a fetch event.
///
/// A cache hit is returned without touching the network. A miss is sent to
/// the network exactly once and the result is passed through as is; misses
/// are not written back to the cache.
pub async fn on_fetch(
    config: &WorkerConfig,
    caches: &dyn CacheStore,
    network: &dyn Network,
    request: Request,
) -> SwResult<Response> {
    match caches.match_request(&config.cache_name(), &request).await {
        Ok(Some(entry)) => {
            trace!(url = %request.url, "Cache hit");
            return Ok(Response::from_cache(&entry));
        }
        Ok(None) => {}
        Err(e) => {
            warn!(url = %request.url, error = %e, "Cache lookup failed, going to network");
        }
    }

    trace!(url = %request.url, method = %request.method, "Cache miss");
    network.fetch(request).await
}
