//! Host adapter: runs handlers as tasks and keeps them alive until they settle.
//!
//! Every dispatched event becomes a pending task. The host does not consider
//! itself idle, and `shutdown` does not return, until all of them finish;
//! that is the lifetime extension a browser grants through `waitUntil`.
//!
//! Events are spawned in arrival order. Run the host on a current-thread
//! runtime to get the cooperative scheduling the handlers are written for:
//! tasks then interleave only at await points.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{SwError, SwResult};
use crate::events::{EventOutcome, WorkerEvent};
use crate::http::{Request, Response};
use crate::lifecycle::{Registration, WorkerId, WorkerState};
use crate::worker::ServiceWorker;

/// Notifications from the host to its embedder.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Worker state changed.
    StateChange {
        worker_id: WorkerId,
        new_state: WorkerState,
    },
    /// A handler finished.
    Settled { event: &'static str, ok: bool },
}

/// Handle on a dispatched event's pending work.
#[derive(Debug)]
pub struct KeepAlive {
    event: &'static str,
    rx: oneshot::Receiver<SwResult<EventOutcome>>,
}

impl KeepAlive {
    pub fn event(&self) -> &'static str {
        self.event
    }

    /// Wait for the handler to settle.
    pub async fn settled(self) -> SwResult<EventOutcome> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(SwError::State(format!("{} handler was dropped", self.event))))
    }
}

struct HostInner {
    worker: ServiceWorker,
    registration: RwLock<Registration>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
}

impl HostInner {
    async fn set_state(&self, state: WorkerState) -> SwResult<()> {
        let worker_id = {
            let mut registration = self.registration.write().await;
            registration.transition(state)?;
            registration.id
        };

        debug!(state = ?state, "Worker state changed");
        let _ = self.event_tx.send(HostEvent::StateChange {
            worker_id,
            new_state: state,
        });
        Ok(())
    }

    async fn state(&self) -> WorkerState {
        self.registration.read().await.state
    }

    async fn run(&self, event: WorkerEvent) -> SwResult<EventOutcome> {
        let controlling = self.state().await == WorkerState::Activated;

        match event {
            WorkerEvent::Install => self.install().await,
            WorkerEvent::Activate => self.activate().await,
            WorkerEvent::Fetch { request } if !controlling => {
                // pages are not controlled yet, straight to the network
                self.worker
                    .platform()
                    .network
                    .fetch(request)
                    .await
                    .map(EventOutcome::Responded)
            }
            other => {
                let outcome = self.worker.handle(other).await?;
                if outcome == EventOutcome::SkipWaiting {
                    self.skip_waiting().await?;
                }
                Ok(outcome)
            }
        }
    }

    async fn install(&self) -> SwResult<EventOutcome> {
        self.set_state(WorkerState::Installing).await?;

        match self.worker.handle(WorkerEvent::Install).await {
            Ok(outcome) => {
                self.set_state(WorkerState::Installed).await?;
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "Install failed, worker is redundant");
                self.set_state(WorkerState::Redundant).await?;
                Err(e)
            }
        }
    }

    async fn activate(&self) -> SwResult<EventOutcome> {
        if self.state().await != WorkerState::Installed {
            return Err(SwError::State("no waiting worker to activate".into()));
        }
        self.set_state(WorkerState::Activating).await?;

        let result = self.worker.handle(WorkerEvent::Activate).await;
        if let Err(ref e) = result {
            warn!(error = %e, "Activate handler failed, activating anyway");
        }

        self.set_state(WorkerState::Activated).await?;
        info!(cache = %self.worker.config().cache_name(), "Worker activated");
        result
    }

    async fn skip_waiting(&self) -> SwResult<()> {
        if self.state().await == WorkerState::Installed {
            info!("Skipping waiting");
            self.activate().await?;
        } else {
            debug!("Skip waiting requested with no waiting worker");
        }
        Ok(())
    }
}

/// Runs one worker: lifecycle state plus pending handler tasks.
pub struct WorkerHost {
    inner: Arc<HostInner>,
    pending: Mutex<JoinSet<()>>,
}

impl WorkerHost {
    /// Create a host and the receiver for its events.
    pub fn new(worker: ServiceWorker) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                inner: Arc::new(HostInner {
                    worker,
                    registration: RwLock::new(Registration::new()),
                    event_tx,
                }),
                pending: Mutex::new(JoinSet::new()),
            },
            event_rx,
        )
    }

    /// Current worker state.
    pub async fn state(&self) -> WorkerState {
        self.inner.state().await
    }

    /// Start handling an event; the returned handle resolves when it settles.
    pub async fn dispatch(&self, event: WorkerEvent) -> KeepAlive {
        let (tx, rx) = oneshot::channel();
        let kind = event.kind();
        let inner = Arc::clone(&self.inner);

        self.pending.lock().await.spawn(async move {
            let result = inner.run(event).await;
            match result {
                Ok(ref outcome) => debug!(event = kind, ?outcome, "Handler settled"),
                Err(ref e) => warn!(
                    event = kind,
                    category = e.category(),
                    error = %e,
                    "Handler failed"
                ),
            }
            let _ = inner.event_tx.send(HostEvent::Settled {
                event: kind,
                ok: result.is_ok(),
            });
            let _ = tx.send(result);
        });

        KeepAlive { event: kind, rx }
    }

    /// Install the worker and wait for the result.
    pub async fn install(&self) -> SwResult<EventOutcome> {
        self.dispatch(WorkerEvent::Install).await.settled().await
    }

    /// Activate the waiting worker and wait for the result.
    pub async fn activate(&self) -> SwResult<EventOutcome> {
        self.dispatch(WorkerEvent::Activate).await.settled().await
    }

    /// Dispatch a fetch and wait for its response.
    pub async fn fetch(&self, request: Request) -> SwResult<Response> {
        match self.dispatch(WorkerEvent::Fetch { request }).await.settled().await? {
            EventOutcome::Responded(response) => Ok(response),
            other => Err(SwError::State(format!("fetch produced {:?}", other))),
        }
    }

    /// Wait until no handler is pending, including ones spawned meanwhile.
    pub async fn wait_idle(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.pending.lock().await);
            if set.is_empty() {
                break;
            }
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Handler task panicked");
                }
            }
        }
    }

    /// Let pending work finish, then stop.
    pub async fn shutdown(self) {
        self.wait_idle().await;
        info!(state = ?self.state().await, "Worker host stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::memory::MemoryPlatform;
    use serde_json::json;

    fn config() -> WorkerConfig {
        WorkerConfig {
            origin: "https://ezevent.test".to_string(),
            ..Default::default()
        }
    }

    fn host(mem: &MemoryPlatform) -> (WorkerHost, mpsc::UnboundedReceiver<HostEvent>) {
        let config = config();
        for url in config.precache_urls().unwrap() {
            mem.network.route(url.as_str(), 200, "shell");
        }
        WorkerHost::new(ServiceWorker::new(config, mem.platform()))
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let mem = MemoryPlatform::new();
        let (host, mut events) = host(&mem);

        host.install().await.unwrap();
        assert_eq!(host.state().await, WorkerState::Installed);

        host.activate().await.unwrap();
        assert_eq!(host.state().await, WorkerState::Activated);
        assert!(mem.clients.claimed());

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let HostEvent::StateChange { new_state, .. } = event {
                states.push(new_state);
            }
        }
        assert_eq!(
            states,
            vec![
                WorkerState::Installing,
                WorkerState::Installed,
                WorkerState::Activating,
                WorkerState::Activated
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_install_makes_worker_redundant() {
        let mem = MemoryPlatform::new();
        let (host, _events) = host(&mem);
        mem.network.fail("https://ezevent.test/manifest.json");

        assert!(host.install().await.is_err());
        assert_eq!(host.state().await, WorkerState::Redundant);
        assert!(host.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_skip_waiting_activates() {
        let mem = MemoryPlatform::new();
        let (host, _events) = host(&mem);
        host.install().await.unwrap();

        let outcome = host
            .dispatch(WorkerEvent::Message {
                data: json!({"type": "SKIP_WAITING"}),
            })
            .await
            .settled()
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::SkipWaiting);
        assert_eq!(host.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_fetch_before_activation_bypasses_cache() {
        let mem = MemoryPlatform::new();
        let (host, _events) = host(&mem);
        host.install().await.unwrap();
        mem.network.clear_requests();

        let url = config().resolve("/index.html").unwrap();
        let response = host.fetch(Request::get(url.clone())).await.unwrap();
        assert!(!response.from_cache);
        assert_eq!(mem.network.requests().len(), 1);

        host.activate().await.unwrap();
        let response = host.fetch(Request::get(url)).await.unwrap();
        assert!(response.from_cache);
        assert_eq!(mem.network.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_covers_every_pending_handler() {
        let mem = MemoryPlatform::new();
        let (host, _events) = host(&mem);
        host.install().await.unwrap();
        host.activate().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..5 {
            let data = format!(r#"{{"title":"Update {i}","tag":"t{i}"}}"#);
            handles.push(
                host.dispatch(WorkerEvent::Push {
                    data: Some(data.as_str().into()),
                })
                .await,
            );
        }
        host.wait_idle().await;

        assert_eq!(mem.notifications.shown().await.len(), 5);
        for handle in handles {
            assert!(matches!(handle.settled().await, Ok(EventOutcome::Shown { .. })));
        }
    }

    #[tokio::test]
    async fn test_failed_resubscription_is_settled_not_fatal() {
        let mem = MemoryPlatform::new();
        let (host, mut events) = host(&mem);

        let result = host
            .dispatch(WorkerEvent::PushSubscriptionChange {
                old_subscription: None,
                new_subscription: None,
            })
            .await
            .settled()
            .await;
        host.shutdown().await;

        assert!(matches!(result, Err(SwError::Subscription(_))));
        let mut settled = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let HostEvent::Settled { event, ok } = event {
                settled.push((event, ok));
            }
        }
        assert_eq!(settled, vec![("pushsubscriptionchange", false)]);
    }
}
