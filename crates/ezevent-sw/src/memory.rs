//! In-memory platform.
//!
//! Capability implementations that keep everything in process. Tests drive
//! handlers through them, and the replay harness uses them for everything
//! except the network.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;
use url::Url;

use crate::cache::CacheEntry;
use crate::error::{SwError, SwResult};
use crate::http::{Request, Response};
use crate::payload::{NotificationOptions, NotificationPayload};
use crate::platform::{
    CacheStore, ClientInfo, ClientMatchOptions, ClientType, Network, NotificationService, Platform,
    PushManager, TokenSource, WindowClients,
};
use crate::subscription::{PushSubscription, SubscriptionKeys, SubscriptionOptions};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ==================== Cache ====================

/// A cache instance.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cached entries by request key.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        if !request.is_cacheable_method() {
            return None;
        }
        self.entries.get(&request.cache_key())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache storage (caches global).
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in a cache; zero when it does not exist.
    pub async fn entry_count(&self, name: &str) -> usize {
        self.caches.read().await.get(name).map_or(0, Cache::len)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStorage {
    async fn open(&self, name: &str) -> SwResult<()> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn keys(&self) -> SwResult<Vec<String>> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> SwResult<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> SwResult<()> {
        let mut caches = self.caches.write().await;
        let cache = caches.entry(name.to_string()).or_default();
        for entry in entries {
            cache.entries.insert(entry.url.clone(), entry);
        }
        Ok(())
    }

    async fn match_request(&self, name: &str, request: &Request) -> SwResult<Option<CacheEntry>> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .and_then(|cache| cache.match_request(request))
            .cloned())
    }
}

// ==================== Network ====================

/// Canned network: routed URLs answer with a fixed response, failing URLs
/// error, anything else is a 404. Every request is recorded.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    routes: Mutex<HashMap<String, (u16, Bytes)>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<Request>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `status` and `body`.
    pub fn route(&self, url: &str, status: u16, body: impl Into<Bytes>) {
        lock(&self.failing).remove(url);
        lock(&self.routes).insert(url.to_string(), (status, body.into()));
    }

    /// Make requests to `url` fail at the transport level.
    pub fn fail(&self, url: &str) {
        lock(&self.failing).insert(url.to_string());
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn fetch(&self, request: Request) -> SwResult<Response> {
        let key = request.url.to_string();
        lock(&self.requests).push(request);

        if lock(&self.failing).contains(&key) {
            return Err(SwError::network(key, "simulated network failure"));
        }

        let response = match lock(&self.routes).get(&key) {
            Some((status, body)) => Response::new(key.as_str(), *status, body.clone()),
            None => Response::new(key.as_str(), 404, Bytes::new()),
        };
        Ok(response)
    }
}

// ==================== Notifications ====================

/// A notification as it was handed to the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownNotification {
    pub title: String,
    pub options: NotificationOptions,
}

/// Records shown and closed notifications; optionally denies permission.
#[derive(Debug, Default)]
pub struct RecordingNotifications {
    shown: RwLock<Vec<ShownNotification>>,
    closed: RwLock<Vec<String>>,
    denied: bool,
}

impl RecordingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service whose permission has been revoked.
    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::default()
        }
    }

    pub async fn shown(&self) -> Vec<ShownNotification> {
        self.shown.read().await.clone()
    }

    /// Tags of every close request, in order.
    pub async fn closed(&self) -> Vec<String> {
        self.closed.read().await.clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifications {
    async fn show(&self, title: &str, options: &NotificationOptions) -> SwResult<()> {
        if self.denied {
            return Err(SwError::Notification("permission denied".into()));
        }

        let mut shown = self.shown.write().await;
        // same tag replaces when renotify is set
        if options.renotify {
            shown.retain(|n| n.options.tag != options.tag);
        }
        shown.push(ShownNotification {
            title: title.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    async fn close(&self, notification: &NotificationPayload) -> SwResult<()> {
        let mut shown = self.shown.write().await;
        if let Some(index) = shown
            .iter()
            .position(|n| n.title == notification.title && n.options == notification.options)
        {
            shown.remove(index);
        }
        self.closed
            .write()
            .await
            .push(notification.options.tag.clone());
        Ok(())
    }
}

// ==================== Clients ====================

/// Window clients kept in open order.
///
/// Clients that exist before `claim` are uncontrolled until it runs; clients
/// added afterwards are controlled from the start.
#[derive(Debug, Default)]
pub struct MemoryClients {
    clients: RwLock<Vec<ClientInfo>>,
    controlled: Mutex<HashSet<String>>,
    next_id: AtomicU64,
    refuse_open: bool,
    claimed: AtomicBool,
    focus_count: AtomicUsize,
    opened: Mutex<Vec<Url>>,
}

impl MemoryClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients whose `open_window` is always refused.
    pub fn refusing_open() -> Self {
        Self {
            refuse_open: true,
            ..Self::default()
        }
    }

    fn next_id(&self) -> String {
        format!("client-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn admit(&self, client: ClientInfo) {
        if self.claimed() {
            lock(&self.controlled).insert(client.id.clone());
        }
        self.clients.write().await.push(client);
    }

    /// Register an already open window.
    pub async fn add(&self, url: Url) -> ClientInfo {
        let client = ClientInfo::window(self.next_id(), url);
        self.admit(client.clone()).await;
        client
    }

    /// Register a client of any type.
    pub async fn add_client(&self, client: ClientInfo) {
        self.admit(client).await;
    }

    pub fn is_controlled(&self, id: &str) -> bool {
        lock(&self.controlled).contains(id)
    }

    pub fn claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::SeqCst)
    }

    /// URLs of windows opened through `open_window`.
    pub fn opened(&self) -> Vec<Url> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl WindowClients for MemoryClients {
    async fn match_all(&self, options: ClientMatchOptions) -> SwResult<Vec<ClientInfo>> {
        Ok(self
            .clients
            .read()
            .await
            .iter()
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .filter(|c| options.include_uncontrolled || self.is_controlled(&c.id))
            .cloned()
            .collect())
    }

    async fn focus(&self, id: &str) -> SwResult<ClientInfo> {
        let mut clients = self.clients.write().await;
        let client = clients
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SwError::Clients(format!("no client {id}")))?;

        if !client.focusable() {
            return Err(SwError::Clients("Can only focus window clients".into()));
        }
        client.focused = true;
        self.focus_count.fetch_add(1, Ordering::SeqCst);
        Ok(client.clone())
    }

    async fn open_window(&self, url: &Url) -> SwResult<Option<ClientInfo>> {
        if self.refuse_open {
            return Ok(None);
        }

        let mut client = ClientInfo::window(self.next_id(), url.clone());
        client.focused = true;
        self.admit(client.clone()).await;
        lock(&self.opened).push(url.clone());
        Ok(Some(client))
    }

    async fn claim(&self) -> SwResult<()> {
        let clients = self.clients.read().await;
        lock(&self.controlled).extend(clients.iter().map(|c| c.id.clone()));
        self.claimed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ==================== Push ====================

/// Mints subscriptions under a base endpoint with random key material.
#[derive(Debug)]
pub struct LocalPushManager {
    base_endpoint: Option<String>,
    counter: AtomicU64,
    requests: Mutex<Vec<SubscriptionOptions>>,
}

impl LocalPushManager {
    pub fn new(base_endpoint: impl Into<String>) -> Self {
        Self {
            base_endpoint: Some(base_endpoint.into()),
            counter: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A push service that rejects every subscription request.
    pub fn rejecting() -> Self {
        Self {
            base_endpoint: None,
            counter: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Options of every accepted request.
    pub fn requests(&self) -> Vec<SubscriptionOptions> {
        lock(&self.requests).clone()
    }
}

fn random_key(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill(&mut buf[..]);
    URL_SAFE_NO_PAD.encode(buf)
}

#[async_trait]
impl PushManager for LocalPushManager {
    async fn subscribe(&self, options: &SubscriptionOptions) -> SwResult<PushSubscription> {
        let base = self
            .base_endpoint
            .as_deref()
            .ok_or_else(|| SwError::Subscription("push service rejected subscription".into()))?;

        if options.application_server_key.is_none() {
            return Err(SwError::Subscription(
                "applicationServerKey is required".into(),
            ));
        }
        lock(&self.requests).push(options.clone());

        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(PushSubscription {
            endpoint: format!("{}/{}-{}", base.trim_end_matches('/'), n, random_key(8)),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: random_key(65),
                auth: random_key(16),
            },
            options: Some(options.clone()),
        })
    }
}

// ==================== Tokens ====================

/// A fixed bearer token, or none.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

// ==================== Platform ====================

/// All in-memory capabilities, kept typed so tests can inspect them.
#[derive(Clone)]
pub struct MemoryPlatform {
    pub caches: Arc<MemoryCacheStorage>,
    pub network: Arc<MemoryNetwork>,
    pub notifications: Arc<RecordingNotifications>,
    pub clients: Arc<MemoryClients>,
    pub push: Arc<LocalPushManager>,
    pub tokens: Arc<StaticToken>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self {
            caches: Arc::new(MemoryCacheStorage::new()),
            network: Arc::new(MemoryNetwork::new()),
            notifications: Arc::new(RecordingNotifications::new()),
            clients: Arc::new(MemoryClients::new()),
            push: Arc::new(LocalPushManager::new("https://push.invalid/ezevent")),
            tokens: Arc::new(StaticToken::default()),
        }
    }

    /// Type-erased view for the worker.
    pub fn platform(&self) -> Platform {
        Platform {
            caches: self.caches.clone(),
            network: self.network.clone(),
            notifications: self.notifications.clone(),
            clients: self.clients.clone(),
            push: self.push.clone(),
            tokens: self.tokens.clone(),
        }
    }

    /// Same platform with another network.
    pub fn platform_with_network(&self, network: Arc<dyn Network>) -> Platform {
        Platform {
            network,
            ..self.platform()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> CacheEntry {
        let request = Request::get(Url::parse(url).unwrap());
        CacheEntry::new(&request, Response::new(url, 200, "x"))
    }

    #[tokio::test]
    async fn test_cache_storage_open_delete() {
        let storage = MemoryCacheStorage::new();
        assert!(storage.keys().await.unwrap().is_empty());

        storage.open("v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["v1".to_string()]);

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_match_scoped_by_name() {
        let storage = MemoryCacheStorage::new();
        storage
            .put_all("v1", vec![entry("https://ezevent.test/a.js")])
            .await
            .unwrap();

        let request = Request::get(Url::parse("https://ezevent.test/a.js").unwrap());
        assert!(storage.match_request("v1", &request).await.unwrap().is_some());
        assert!(storage.match_request("v2", &request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_renotify_replaces_same_tag() {
        let service = RecordingNotifications::new();
        let mut options = NotificationOptions {
            tag: "event-1".into(),
            ..Default::default()
        };

        service.show("first", &options).await.unwrap();
        service.show("stacked", &options).await.unwrap();
        assert_eq!(service.shown().await.len(), 2);

        options.renotify = true;
        service.show("replacement", &options).await.unwrap();
        let shown = service.shown().await;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "replacement");
    }

    #[tokio::test]
    async fn test_worker_client_not_focusable() {
        let clients = MemoryClients::new();
        let mut worker = ClientInfo::window("w", Url::parse("https://ezevent.test/").unwrap());
        worker.client_type = ClientType::Worker;
        clients.add_client(worker).await;

        assert!(matches!(clients.focus("w").await, Err(SwError::Clients(_))));
        assert!(clients
            .match_all(ClientMatchOptions::all_windows())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_match_all_respects_control() {
        let clients = MemoryClients::new();
        let before = clients.add(Url::parse("https://ezevent.test/a").unwrap()).await;

        let controlled_only = ClientMatchOptions {
            include_uncontrolled: false,
            client_type: ClientType::Window,
        };
        assert!(clients.match_all(controlled_only).await.unwrap().is_empty());
        assert_eq!(
            clients
                .match_all(ClientMatchOptions::all_windows())
                .await
                .unwrap(),
            vec![before.clone()]
        );

        clients.claim().await.unwrap();
        let after = clients.add(Url::parse("https://ezevent.test/b").unwrap()).await;

        let ids: Vec<String> = clients
            .match_all(controlled_only)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![before.id, after.id]);
    }

    #[tokio::test]
    async fn test_close_removes_one_stacked_notification() {
        let service = RecordingNotifications::new();
        let first = NotificationPayload {
            title: "first".into(),
            ..Default::default()
        };
        let second = NotificationPayload {
            title: "second".into(),
            ..Default::default()
        };
        service.show(&first.title, &first.options).await.unwrap();
        service.show(&second.title, &second.options).await.unwrap();

        service.close(&first).await.unwrap();

        let shown = service.shown().await;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "second");
        assert_eq!(service.closed().await, vec!["default".to_string()]);
    }

    #[tokio::test]
    async fn test_local_push_manager_mints_distinct_subscriptions() {
        let push = LocalPushManager::new("https://push.test/");
        let options = SubscriptionOptions::with_key("BKEY");

        let a = push.subscribe(&options).await.unwrap();
        let b = push.subscribe(&options).await.unwrap();

        assert_ne!(a.endpoint, b.endpoint);
        assert!(a.endpoint.starts_with("https://push.test/1-"));
        assert_eq!(push.requests().len(), 2);
    }
}
