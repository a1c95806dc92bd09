//! Request and response values exchanged with the cache and the network.

use bytes::Bytes;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CacheEntry;
use crate::error::{SwError, SwResult};

fn default_method() -> String {
    "GET".to_string()
}

/// An outgoing or intercepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Request method, upper case.
    #[serde(default = "default_method")]
    pub method: String,

    /// Absolute request URL.
    pub url: Url,

    /// Request headers, lower-case names.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request body.
    #[serde(skip)]
    pub body: Option<Bytes>,

    /// Is navigation request.
    #[serde(default)]
    pub is_navigation: bool,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: default_method(),
            url,
            headers: HashMap::new(),
            body: None,
            is_navigation: false,
        }
    }

    /// Create a POST request carrying a JSON body.
    pub fn post_json(url: Url, body: &serde_json::Value) -> SwResult<Self> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| SwError::network(url.as_str(), format!("encode body: {e}")))?;

        Ok(Self {
            method: "POST".to_string(),
            url,
            headers: HashMap::new(),
            body: Some(Bytes::from(encoded)),
            is_navigation: false,
        }
        .header("content-type", "application/json"))
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Add an `Authorization: Bearer` header.
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    /// Key used for cache matching: the URL without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }

    /// Whether a stored response may answer this request.
    pub fn is_cacheable_method(&self) -> bool {
        matches!(self.method.as_str(), "GET" | "HEAD")
    }
}

/// A response from the cache or the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Final response URL.
    pub url: String,

    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    #[serde(skip)]
    pub body: Bytes,

    /// Whether from cache.
    pub from_cache: bool,
}

impl Response {
    /// Create a network response.
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            status_text: String::new(),
            headers: HashMap::new(),
            body: body.into(),
            from_cache: false,
        }
    }

    /// Create a response from cache entry.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        Self {
            url: entry.url.clone(),
            status: entry.status,
            status_text: "OK".to_string(),
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            from_cache: true,
        }
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_drops_fragment() {
        let url = Url::parse("https://ezevent.test/events/1?tab=info#top").unwrap();
        let request = Request::get(url);
        assert_eq!(request.cache_key(), "https://ezevent.test/events/1?tab=info");
    }

    #[test]
    fn test_post_json_sets_content_type() {
        let url = Url::parse("https://ezevent.test/api/x").unwrap();
        let request = Request::post_json(url, &json!({"a": 1}))
            .unwrap()
            .bearer("abc");

        assert_eq!(request.method, "POST");
        assert!(!request.is_cacheable_method());
        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer abc")
        );
        assert_eq!(request.body.as_deref(), Some(&b"{\"a\":1}"[..]));
    }

    #[test]
    fn test_request_deserialize_defaults_to_get() {
        let request: Request =
            serde_json::from_value(json!({"url": "https://ezevent.test/"})).unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_response_ok_range() {
        assert!(Response::new("/", 204, Bytes::new()).ok());
        assert!(!Response::new("/", 404, Bytes::new()).ok());
    }
}
