//! Events delivered to the worker and what handling them produced.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::dispatch::{Navigation, NotificationClick, NotificationClose};
use crate::http::{Request, Response};
use crate::subscription::PushSubscription;

/// Raw push message data.
///
/// On the wire it is carried as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushData(pub Vec<u8>);

impl PushData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for PushData {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl Serialize for PushData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

impl<'de> Deserialize<'de> for PushData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|text| Self(text.into_bytes()))
    }
}

/// Every event the worker handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch {
        request: Request,
    },
    Push {
        #[serde(default)]
        data: Option<PushData>,
    },
    #[serde(rename = "notificationclick")]
    NotificationClick(NotificationClick),
    #[serde(rename = "notificationclose")]
    NotificationClose(NotificationClose),
    Message {
        #[serde(default)]
        data: Value,
    },
    Sync {
        tag: String,
    },
    #[serde(rename = "pushsubscriptionchange", rename_all = "camelCase")]
    PushSubscriptionChange {
        #[serde(default)]
        old_subscription: Option<PushSubscription>,
        #[serde(default)]
        new_subscription: Option<PushSubscription>,
    },
}

impl WorkerEvent {
    /// Event name as the platform spells it.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch { .. } => "fetch",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick(_) => "notificationclick",
            WorkerEvent::NotificationClose(_) => "notificationclose",
            WorkerEvent::Message { .. } => "message",
            WorkerEvent::Sync { .. } => "sync",
            WorkerEvent::PushSubscriptionChange { .. } => "pushsubscriptionchange",
        }
    }
}

/// Control messages posted to the worker by its pages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting worker without waiting for its pages to close.
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

impl WorkerMessage {
    pub fn parse(data: &Value) -> Self {
        serde_json::from_value(data.clone()).unwrap_or(WorkerMessage::Unknown)
    }
}

/// The result of handling one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    Installed { cache: String, entries: usize },
    Activated { deleted: Vec<String> },
    Responded(Response),
    Shown { tag: String },
    Navigated(Navigation),
    Closed { tracked: bool },
    SkipWaiting,
    Resubscribed { endpoint: String },
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_push_event() {
        let event: WorkerEvent =
            serde_json::from_value(json!({"type": "push", "data": "Hello"})).unwrap();
        assert_eq!(
            event,
            WorkerEvent::Push {
                data: Some(PushData::from("Hello"))
            }
        );
        assert_eq!(event.kind(), "push");
    }

    #[test]
    fn test_parse_click_event() {
        let event: WorkerEvent = serde_json::from_value(json!({
            "type": "notificationclick",
            "action": "view",
            "notification": {"title": "t", "data": {"eventId": "5"}}
        }))
        .unwrap();

        let WorkerEvent::NotificationClick(click) = event else {
            panic!("expected click");
        };
        assert_eq!(click.action.as_deref(), Some("view"));
        assert_eq!(click.notification.options.data.event_id().as_deref(), Some("5"));
        assert_eq!(click.notification.options.tag, "default");
    }

    #[test]
    fn test_parse_subscription_change() {
        let event: WorkerEvent = serde_json::from_value(json!({
            "type": "pushsubscriptionchange",
            "oldSubscription": {
                "endpoint": "https://push.test/1",
                "keys": {"p256dh": "p", "auth": "a"}
            }
        }))
        .unwrap();

        assert!(matches!(
            event,
            WorkerEvent::PushSubscriptionChange {
                old_subscription: Some(_),
                new_subscription: None
            }
        ));
    }

    #[test]
    fn test_skip_waiting_message() {
        assert_eq!(
            WorkerMessage::parse(&json!({"type": "SKIP_WAITING"})),
            WorkerMessage::SkipWaiting
        );
        assert_eq!(
            WorkerMessage::parse(&json!({"type": "PING"})),
            WorkerMessage::Unknown
        );
        assert_eq!(WorkerMessage::parse(&json!("SKIP_WAITING")), WorkerMessage::Unknown);
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let value = serde_json::to_value(EventOutcome::Shown {
            tag: "default".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"outcome": "shown", "tag": "default"}));
    }
}
