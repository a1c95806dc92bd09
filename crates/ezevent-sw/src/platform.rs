//! Capabilities the worker needs from its host.
//!
//! Handlers never reach for ambient globals: each one receives the
//! capabilities it uses as trait objects, which keeps them testable without a
//! browser runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::cache::CacheEntry;
use crate::error::SwResult;
use crate::http::{Request, Response};
use crate::payload::{NotificationOptions, NotificationPayload};
use crate::subscription::{PushSubscription, SubscriptionOptions};

/// Named caches of request/response pairs (`caches`).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a cache, creating it if absent.
    async fn open(&self, name: &str) -> SwResult<()>;

    /// Names of all existing caches.
    async fn keys(&self) -> SwResult<Vec<String>>;

    /// Delete a cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> SwResult<bool>;

    /// Store all entries at once; either every entry lands or none does.
    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> SwResult<()>;

    /// Look up a stored response for a request.
    async fn match_request(&self, name: &str, request: &Request) -> SwResult<Option<CacheEntry>>;
}

/// Live network access (`fetch`).
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: Request) -> SwResult<Response>;
}

/// System notification display (`registration.showNotification`).
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn show(&self, title: &str, options: &NotificationOptions) -> SwResult<()>;

    /// Close the one displayed notification this payload describes. Other
    /// notifications stacked under the same tag stay open.
    async fn close(&self, notification: &NotificationPayload) -> SwResult<()>;
}

/// Window clients of the application (`clients`).
#[async_trait]
pub trait WindowClients: Send + Sync {
    async fn match_all(&self, options: ClientMatchOptions) -> SwResult<Vec<ClientInfo>>;

    async fn focus(&self, id: &str) -> SwResult<ClientInfo>;

    /// Open a new window. `None` when the platform refuses.
    async fn open_window(&self, url: &Url) -> SwResult<Option<ClientInfo>>;

    /// Take control of all open pages.
    async fn claim(&self) -> SwResult<()>;
}

/// Push service subscription management (`registration.pushManager`).
#[async_trait]
pub trait PushManager: Send + Sync {
    async fn subscribe(&self, options: &SubscriptionOptions) -> SwResult<PushSubscription>;
}

/// Source of the session's bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// One of each capability.
#[derive(Clone)]
pub struct Platform {
    pub caches: Arc<dyn CacheStore>,
    pub network: Arc<dyn Network>,
    pub notifications: Arc<dyn NotificationService>,
    pub clients: Arc<dyn WindowClients>,
    pub push: Arc<dyn PushManager>,
    pub tokens: Arc<dyn TokenSource>,
}

// ==================== Clients ====================

/// A client (page) visible to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    #[serde(default)]
    pub client_type: ClientType,

    /// Whether focused.
    #[serde(default)]
    pub focused: bool,
}

impl ClientInfo {
    /// A window client.
    pub fn window(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            client_type: ClientType::Window,
            focused: false,
        }
    }

    /// Only window clients can be focused.
    pub fn focusable(&self) -> bool {
        self.client_type == ClientType::Window
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// Options for `clients.matchAll()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientMatchOptions {
    /// Also return clients the worker does not control yet.
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

impl ClientMatchOptions {
    /// Every window, controlled or not.
    pub fn all_windows() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        }
    }
}
