//! Worker configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{SwError, SwResult};
use crate::payload::NotificationPayload;

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the worker is registered on; relative paths resolve against it
    pub origin: String,

    /// Cache name prefix
    pub cache_prefix: String,

    /// Cache version, bumped on every deployment
    pub cache_version: u32,

    /// Paths fetched into the cache at install time
    pub precache: Vec<String>,

    /// Backend endpoints
    pub endpoints: EndpointConfig,

    /// Default notification template
    pub notification: NotificationPayload,

    /// Application server key used when no previous subscription is available
    pub vapid_public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Close-tracking analytics endpoint
    pub analytics_close: String,

    /// Push subscription sync endpoint
    pub subscribe: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5173".to_string(),
            cache_prefix: "ezevent-cache".to_string(),
            cache_version: 1,
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192x192.png".to_string(),
                "/icons/badge-72x72.png".to_string(),
            ],
            endpoints: EndpointConfig::default(),
            notification: NotificationPayload::default(),
            vapid_public_key: None,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            analytics_close: "/api/analytics/notification-closed".to_string(),
            subscribe: "/api/notifications/subscribe".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Load and validate a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> SwResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SwError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> SwResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SwError::Config(format!("parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Name of the one cache that is current for this version.
    pub fn cache_name(&self) -> String {
        format!("{}-v{}", self.cache_prefix, self.cache_version)
    }

    /// Parsed origin URL.
    pub fn origin_url(&self) -> SwResult<Url> {
        Url::parse(&self.origin).map_err(|e| SwError::invalid_url(&self.origin, e))
    }

    /// Resolve an absolute URL or a path relative to the origin.
    pub fn resolve(&self, path: &str) -> SwResult<Url> {
        match Url::parse(path) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .origin_url()?
                .join(path)
                .map_err(|e| SwError::invalid_url(path, e)),
            Err(e) => Err(SwError::invalid_url(path, e)),
        }
    }

    /// Absolute URLs of the precache manifest, in manifest order.
    pub fn precache_urls(&self) -> SwResult<Vec<Url>> {
        self.precache.iter().map(|p| self.resolve(p)).collect()
    }

    /// Check the invariants the handlers rely on.
    pub fn validate(&self) -> SwResult<()> {
        if self.cache_prefix.trim().is_empty() {
            return Err(SwError::Config("cache_prefix must not be empty".into()));
        }
        if self.precache.is_empty() {
            return Err(SwError::Config("precache manifest must not be empty".into()));
        }

        self.origin_url()?;
        self.precache_urls()?;
        self.resolve(&self.endpoints.analytics_close)?;
        self.resolve(&self.endpoints.subscribe)?;

        // icons shown in notifications have to be available offline
        let options = &self.notification.options;
        for asset in [&options.icon, &options.badge].into_iter().flatten() {
            if !self.precache.iter().any(|p| p == asset) {
                return Err(SwError::Config(format!(
                    "notification asset {} is not in the precache manifest",
                    asset
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_name(), "ezevent-cache-v1");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = WorkerConfig::from_json(r#"{"cache_version": 7}"#).unwrap();
        assert_eq!(config.cache_name(), "ezevent-cache-v7");
        assert_eq!(config.precache.len(), 5);
        assert_eq!(config.endpoints.subscribe, "/api/notifications/subscribe");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = WorkerConfig {
            origin: "https://ezevent.test".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve("/events/42").unwrap().as_str(),
            "https://ezevent.test/events/42"
        );
        assert_eq!(
            config.resolve("https://cdn.test/a.png").unwrap().as_str(),
            "https://cdn.test/a.png"
        );
    }

    #[test]
    fn test_empty_manifest_rejected() {
        let result = WorkerConfig::from_json(r#"{"precache": []}"#);
        assert!(matches!(result, Err(SwError::Config(_))));
    }

    #[test]
    fn test_icon_missing_from_manifest_rejected() {
        let result = WorkerConfig::from_json(r#"{"precache": ["/", "/index.html"]}"#);
        assert!(matches!(result, Err(SwError::Config(msg)) if msg.contains("icon-192x192")));
    }

    #[test]
    fn test_bad_origin_rejected() {
        let result = WorkerConfig::from_json(r#"{"origin": "not a url"}"#);
        assert!(matches!(result, Err(SwError::InvalidUrl { .. })));
    }
}
