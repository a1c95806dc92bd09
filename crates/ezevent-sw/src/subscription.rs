//! Push subscription renewal.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::error::{SwError, SwResult};
use crate::http::Request;
use crate::platform::{Network, PushManager, TokenSource};

fn user_visible() -> bool {
    true
}

/// Parameters a subscription was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOptions {
    #[serde(default = "user_visible")]
    pub user_visible_only: bool,
    #[serde(default)]
    pub application_server_key: Option<String>,
}

impl SubscriptionOptions {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            user_visible_only: true,
            application_server_key: Some(key.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A push service subscription.
///
/// Serializes to the same shape as `PushSubscription.toJSON()`; the creation
/// options are accepted on input but never sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<u64>,
    pub keys: SubscriptionKeys,
    #[serde(default, skip_serializing)]
    pub options: Option<SubscriptionOptions>,
}

/// Handle `pushsubscriptionchange`: subscribe again with the old key and
/// hand the new subscription to the backend.
///
/// Nothing is retried; a failure at either step is returned to the caller.
pub async fn on_subscription_change(
    config: &WorkerConfig,
    push: &dyn PushManager,
    network: &dyn Network,
    tokens: &dyn TokenSource,
    old: Option<&PushSubscription>,
) -> SwResult<PushSubscription> {
    let options = match old.and_then(|s| s.options.clone()) {
        Some(options) => options,
        None => match config.vapid_public_key {
            Some(ref key) => {
                debug!("No previous subscription options, using configured key");
                SubscriptionOptions::with_key(key.clone())
            }
            None => {
                return Err(SwError::Subscription(
                    "no application server key available".into(),
                ))
            }
        },
    };

    let subscription = push.subscribe(&options).await?;
    info!(endpoint = %subscription.endpoint, "Push subscription renewed");

    let token = tokens
        .bearer_token()
        .await
        .ok_or(SwError::MissingCredential)?;
    let url = config.resolve(&config.endpoints.subscribe)?;
    let request = Request::post_json(url, &json!({ "subscription": subscription }))?.bearer(&token);

    let response = network.fetch(request.clone()).await?;
    if !response.ok() {
        return Err(SwError::HttpStatus {
            url: request.url.to_string(),
            status: response.status,
        });
    }

    debug!(endpoint = %subscription.endpoint, "Backend has the new subscription");
    Ok(subscription)
}
