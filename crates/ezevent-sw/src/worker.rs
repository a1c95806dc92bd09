//! Event dispatch: one handler per event variant.

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::{on_activate, on_install};
use crate::config::WorkerConfig;
use crate::dispatch::{on_notification_click, on_notification_close};
use crate::error::SwResult;
use crate::events::{EventOutcome, WorkerEvent, WorkerMessage};
use crate::fetch::on_fetch;
use crate::payload::on_push;
use crate::platform::Platform;
use crate::subscription::on_subscription_change;

/// The worker's handler set, bound to a config and a platform.
#[derive(Clone)]
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    platform: Platform,
}

impl ServiceWorker {
    pub fn new(config: WorkerConfig, platform: Platform) -> Self {
        Self {
            config: Arc::new(config),
            platform,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Handle one event to completion.
    #[instrument(skip_all, fields(event = event.kind()))]
    pub async fn handle(&self, event: WorkerEvent) -> SwResult<EventOutcome> {
        let config = self.config.as_ref();
        let p = &self.platform;

        match event {
            WorkerEvent::Install => {
                let entries = on_install(config, p.caches.as_ref(), p.network.as_ref()).await?;
                Ok(EventOutcome::Installed {
                    cache: config.cache_name(),
                    entries,
                })
            }
            WorkerEvent::Activate => {
                let deleted = on_activate(config, p.caches.as_ref(), p.clients.as_ref()).await?;
                Ok(EventOutcome::Activated { deleted })
            }
            WorkerEvent::Fetch { request } => {
                on_fetch(config, p.caches.as_ref(), p.network.as_ref(), request)
                    .await
                    .map(EventOutcome::Responded)
            }
            WorkerEvent::Push { data } => {
                let data = data.as_ref().map(|d| d.as_bytes());
                let tag = on_push(config, p.notifications.as_ref(), data).await?;
                Ok(EventOutcome::Shown { tag })
            }
            WorkerEvent::NotificationClick(click) => {
                on_notification_click(config, p.notifications.as_ref(), p.clients.as_ref(), &click)
                    .await
                    .map(EventOutcome::Navigated)
            }
            WorkerEvent::NotificationClose(close) => {
                let tracked = on_notification_close(config, p.network.as_ref(), &close).await;
                Ok(EventOutcome::Closed { tracked })
            }
            WorkerEvent::Message { data } => match WorkerMessage::parse(&data) {
                WorkerMessage::SkipWaiting => Ok(EventOutcome::SkipWaiting),
                WorkerMessage::Unknown => {
                    debug!(message = %data, "Ignoring unknown message");
                    Ok(EventOutcome::Ignored)
                }
            },
            WorkerEvent::Sync { tag } => {
                debug!(tag = %tag, "No background sync work registered");
                Ok(EventOutcome::Ignored)
            }
            WorkerEvent::PushSubscriptionChange {
                old_subscription,
                new_subscription,
            } => {
                if let Some(ref offered) = new_subscription {
                    debug!(
                        endpoint = %offered.endpoint,
                        "Platform offered a subscription, requesting our own"
                    );
                }
                let renewed = on_subscription_change(
                    config,
                    p.push.as_ref(),
                    p.network.as_ref(),
                    p.tokens.as_ref(),
                    old_subscription.as_ref(),
                )
                .await?;
                Ok(EventOutcome::Resubscribed {
                    endpoint: renewed.endpoint,
                })
            }
        }
    }
}
