//! # EZEvent Service Worker
//!
//! The background worker of the EZEvent web app, with the browser runtime
//! replaced by explicit capabilities.
//!
//! ## Features
//!
//! - **Precache**: versioned cache filled at install, stale versions dropped at activate
//! - **Fetch Interception**: cache-first, network fallback
//! - **Push**: JSON or text payloads normalized over a default template
//! - **Notification routing**: click targets, window reuse, close telemetry
//! - **Subscription renewal**: resubscribe and sync the backend
//!
//! ## Architecture
//!
//! ```text
//! WorkerHost (keep-alive, lifecycle state)
//!     │
//!     └── ServiceWorker::handle(WorkerEvent)
//!             ├── install / activate ──→ CacheStore, Network, WindowClients
//!             ├── fetch ───────────────→ CacheStore, Network
//!             ├── push ────────────────→ NotificationService
//!             ├── notificationclick ───→ NotificationService, WindowClients
//!             ├── notificationclose ───→ Network
//!             └── pushsubscriptionchange → PushManager, TokenSource, Network
//! ```

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod fetch;
pub mod host;
pub mod http;
pub mod lifecycle;
pub mod memory;
pub mod payload;
pub mod platform;
pub mod subscription;
pub mod worker;

pub use cache::CacheEntry;
pub use config::{EndpointConfig, WorkerConfig};
pub use dispatch::{resolve_target, ClickTarget, Navigation, NotificationClick, NotificationClose};
pub use error::{SwError, SwResult};
pub use events::{EventOutcome, PushData, WorkerEvent, WorkerMessage};
pub use host::{HostEvent, KeepAlive, WorkerHost};
pub use http::{Request, Response};
pub use lifecycle::{WorkerId, WorkerState};
pub use payload::{
    normalize, NotificationAction, NotificationData, NotificationOptions, NotificationPayload,
};
pub use platform::{
    CacheStore, ClientInfo, ClientMatchOptions, ClientType, Network, NotificationService,
    Platform, PushManager, TokenSource, WindowClients,
};
pub use subscription::{PushSubscription, SubscriptionKeys, SubscriptionOptions};
pub use worker::ServiceWorker;
