//! Push payload normalization.
//!
//! A push message is either a JSON object carrying any subset of the
//! notification fields, or opaque text. JSON objects are merged over the
//! configured template one top-level key at a time, so a partial `data`
//! object replaces the template's `data` wholesale, and a key whose value has
//! the wrong type keeps the template's value. JSON that is not an object
//! leaves the template untouched; anything that is not JSON becomes the
//! notification body.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::error::{SwError, SwResult};
use crate::platform::NotificationService;

/// A button shown on the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NotificationAction {
    pub fn new(action: &str, title: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
            icon: None,
        }
    }
}

/// Opaque data attached to a notification and read back on click/close.
///
/// `null` deserializes to an empty map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NotificationData(Map<String, Value>);

impl<'de> Deserialize<'de> for NotificationData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<Map<String, Value>>::deserialize(deserializer)
            .map(|map| Self(map.unwrap_or_default()))
    }
}

impl NotificationData {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build from a JSON value; anything but an object yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::default()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Non-empty string or number field, as a string.
    fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Explicit navigation target.
    pub fn url(&self) -> Option<String> {
        self.text("url")
    }

    pub fn event_id(&self) -> Option<String> {
        self.text("eventId")
    }

    pub fn room_id(&self) -> Option<String> {
        self.text("roomId")
    }

    /// Telemetry identifier, passed through untouched.
    pub fn notification_id(&self) -> Value {
        self.0.get("notificationId").cloned().unwrap_or(Value::Null)
    }

    /// Whether closing the notification should be reported.
    pub fn track_close(&self) -> bool {
        matches!(self.0.get("trackClose"), Some(Value::Bool(true)))
    }
}

/// Everything about a notification except its title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
    pub require_interaction: bool,
    pub silent: bool,
    #[serde(deserialize_with = "vibrate_pattern")]
    pub vibrate: Vec<u32>,
    pub tag: String,
    pub renotify: bool,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            body: String::new(),
            icon: None,
            badge: None,
            data: NotificationData::default(),
            actions: Vec::new(),
            require_interaction: false,
            silent: false,
            vibrate: vec![200, 100, 200],
            tag: "default".to_string(),
            renotify: false,
        }
    }
}

/// A vibration pattern is either one duration or a list of them.
fn vibrate_pattern<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Pattern {
        Single(u32),
        Sequence(Vec<u32>),
    }

    Ok(match Pattern::deserialize(deserializer)? {
        Pattern::Single(ms) => vec![ms],
        Pattern::Sequence(pattern) => pattern,
    })
}

/// A complete notification: title plus display options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPayload {
    pub title: String,
    #[serde(flatten)]
    pub options: NotificationOptions,
}

impl Default for NotificationPayload {
    fn default() -> Self {
        let mut data = Map::new();
        data.insert("url".to_string(), Value::String("/".to_string()));

        Self {
            title: "EZEvent".to_string(),
            options: NotificationOptions {
                body: "You have a new notification".to_string(),
                icon: Some("/icons/icon-192x192.png".to_string()),
                badge: Some("/icons/badge-72x72.png".to_string()),
                data: NotificationData(data),
                actions: vec![
                    NotificationAction::new("view", "View"),
                    NotificationAction::new("dismiss", "Dismiss"),
                ],
                ..NotificationOptions::default()
            },
        }
    }
}

/// Turn raw push data into a complete notification.
pub fn normalize(template: &NotificationPayload, data: Option<&[u8]>) -> NotificationPayload {
    let raw = match data {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            debug!("push without data, using default notification");
            return template.clone();
        }
    };

    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(inbound)) => merge_fields(template, inbound),
        Ok(other) => {
            debug!(payload = %other, "push JSON is not an object, using default notification");
            template.clone()
        }
        Err(e) => {
            debug!(error = %e, "push payload is not JSON, using it as body");
            text_fallback(template, raw)
        }
    }
}

/// Overlay each inbound key on the template. A key whose value does not
/// decode keeps the template's value.
fn merge_fields(
    template: &NotificationPayload,
    inbound: Map<String, Value>,
) -> NotificationPayload {
    let mut merged = match serde_json::to_value(template) {
        Ok(Value::Object(fields)) => fields,
        _ => return template.clone(),
    };

    for (key, value) in inbound {
        let previous = merged.insert(key.clone(), value);
        let decoded = serde_json::from_value::<NotificationPayload>(Value::Object(merged.clone()));
        if let Err(e) = decoded {
            warn!(field = %key, error = %e, "ignoring push field with unexpected type");
            match previous {
                Some(previous) => merged.insert(key, previous),
                None => merged.remove(&key),
            };
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_else(|e| {
        warn!(error = %e, "merged push payload did not decode, using default notification");
        template.clone()
    })
}

fn text_fallback(template: &NotificationPayload, raw: &[u8]) -> NotificationPayload {
    let text = String::from_utf8_lossy(raw);
    let mut payload = template.clone();
    if !text.is_empty() {
        payload.options.body = text.into_owned();
    }
    payload
}

/// Handle a push event: normalize the payload and display it.
///
/// Returns the tag of the displayed notification.
pub async fn on_push(
    config: &WorkerConfig,
    notifications: &dyn NotificationService,
    data: Option<&[u8]>,
) -> SwResult<String> {
    let NotificationPayload { title, options } = normalize(&config.notification, data);

    notifications
        .show(&title, &options)
        .await
        .map_err(|e| match e {
            SwError::Notification(_) => e,
            other => SwError::Notification(other.to_string()),
        })?;

    debug!(title = %title, tag = %options.tag, "notification shown");
    Ok(options.tag)
}
