//! Notification click and close handling.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::SwResult;
use crate::http::Request;
use crate::payload::{NotificationData, NotificationPayload};
use crate::platform::{ClientMatchOptions, Network, NotificationService, WindowClients};

/// Path of the event detail page.
pub fn event_detail_path(event_id: &str) -> String {
    format!("/events/{event_id}")
}

/// Path of an event's chat room.
pub fn chat_room_path(room_id: &str) -> String {
    format!("/events/chat/{room_id}")
}

/// A click on a displayed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationClick {
    pub notification: NotificationPayload,
    /// Action button id; absent or empty for a click on the body.
    #[serde(default)]
    pub action: Option<String>,
}

/// A notification dismissed without a click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationClose {
    pub notification: NotificationPayload,
}

/// Where a click leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Dismiss,
    Navigate(String),
}

/// What the click handler did with the window set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "navigation", rename_all = "snake_case")]
pub enum Navigation {
    Dismissed,
    Focused { client_id: String, url: String },
    Opened { client_id: String, url: String },
    Blocked { url: String },
}

/// Pick the click target; the first matching rule wins.
pub fn resolve_target(action: Option<&str>, data: &NotificationData) -> ClickTarget {
    match action.filter(|a| !a.is_empty()) {
        Some("dismiss") => ClickTarget::Dismiss,
        Some("reply") => match data.room_id() {
            Some(room) => ClickTarget::Navigate(chat_room_path(&room)),
            None => ClickTarget::Navigate("/".to_string()),
        },
        None | Some("view") => {
            let target = data
                .url()
                .or_else(|| data.event_id().map(|id| event_detail_path(&id)))
                .or_else(|| data.room_id().map(|id| chat_room_path(&id)))
                .unwrap_or_else(|| "/".to_string());
            ClickTarget::Navigate(target)
        }
        Some(_) => ClickTarget::Navigate("/".to_string()),
    }
}

/// Handle a notification click.
///
/// The notification is closed before anything else. An open window whose
/// URL contains the target is focused; otherwise a new one is opened.
pub async fn on_notification_click(
    config: &WorkerConfig,
    notifications: &dyn NotificationService,
    clients: &dyn WindowClients,
    click: &NotificationClick,
) -> SwResult<Navigation> {
    let options = &click.notification.options;
    if let Err(e) = notifications.close(&click.notification).await {
        warn!(tag = %options.tag, error = %e, "Failed to close clicked notification");
    }

    let target = match resolve_target(click.action.as_deref(), &options.data) {
        ClickTarget::Dismiss => {
            debug!(tag = %options.tag, "Notification dismissed");
            return Ok(Navigation::Dismissed);
        }
        ClickTarget::Navigate(target) => target,
    };

    let windows = clients.match_all(ClientMatchOptions::all_windows()).await?;
    let existing = windows
        .iter()
        .find(|c| c.url.as_str().contains(target.as_str()) && c.focusable());

    if let Some(client) = existing {
        match clients.focus(&client.id).await {
            Ok(focused) => {
                info!(client = %focused.id, url = %target, "Focused existing window");
                return Ok(Navigation::Focused {
                    client_id: focused.id,
                    url: target,
                });
            }
            Err(e) => {
                warn!(client = %client.id, error = %e, "Focus failed, opening a new window");
            }
        }
    }

    let url = config.resolve(&target)?;
    match clients.open_window(&url).await? {
        Some(opened) => {
            info!(client = %opened.id, url = %url, "Opened window");
            Ok(Navigation::Opened {
                client_id: opened.id,
                url: url.to_string(),
            })
        }
        None => {
            warn!(url = %url, "Opening a window is not allowed here");
            Ok(Navigation::Blocked { url: url.to_string() })
        }
    }
}

/// Handle a notification close. Returns whether a close report was sent.
///
/// Reporting is best-effort: failures are logged and never surface.
pub async fn on_notification_close(
    config: &WorkerConfig,
    network: &dyn Network,
    close: &NotificationClose,
) -> bool {
    let data = &close.notification.options.data;
    if !data.track_close() {
        return false;
    }

    let body = json!({
        "notificationId": data.notification_id(),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });

    let request = match config
        .resolve(&config.endpoints.analytics_close)
        .and_then(|url| Request::post_json(url, &body))
    {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Failed to build close report");
            return true;
        }
    };

    match network.fetch(request).await {
        Ok(response) if response.ok() => debug!("Close report sent"),
        Ok(response) => warn!(status = response.status, "Close report rejected"),
        Err(e) => warn!(error = %e, "Failed to send close report"),
    }
    true
}
