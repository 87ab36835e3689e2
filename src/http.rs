//! Request and response values exchanged between the worker, the cache
//! storage and the network.

use std::fmt;

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// How a request treats cross-origin responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Cross-origin responses are readable (CORS).
    #[default]
    Cors,
    /// Cross-origin responses are opaque.
    NoCors,
    /// Only same-origin requests are allowed.
    SameOrigin,
    /// Top-level navigation.
    Navigate,
}

/// A request intercepted by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Absolute request URL.
    pub url: Url,
    /// HTTP method.
    pub method: Method,
    /// Request mode.
    pub mode: RequestMode,
}

impl Request {
    /// Creates a `GET` request in `cors` mode.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            mode: RequestMode::Cors,
        }
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the identity this request is cached under.
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Identity of a request inside a cache store: method plus URL without its
/// fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    /// Upper-case HTTP method.
    pub method: String,
    /// Absolute URL, fragment removed.
    pub url: String,
}

impl RequestKey {
    /// Builds the key for `method` and `url`.
    #[must_use]
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.into(),
        }
    }

    /// Only `GET` requests can be stored in or answered from a cache store.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET.as_str()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Classification of a response, as seen by the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Readable cross-origin response.
    Cors,
    /// Cross-origin response whose status and body are hidden.
    Opaque,
    /// Network error placeholder.
    Error,
}

/// A response returned to the page or held in a cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code (0 for opaque responses).
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// Response classification.
    pub kind: ResponseType,
    /// Header name/value pairs in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a `basic` response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            status_text,
            kind: ResponseType::Basic,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Creates an opaque response: status 0, no headers, empty body.
    #[must_use]
    pub const fn opaque() -> Self {
        Self {
            status: 0,
            status_text: String::new(),
            kind: ResponseType::Opaque,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Sets the response type.
    #[must_use]
    pub const fn with_type(mut self, kind: ResponseType) -> Self {
        self.kind = kind;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first value of the named header (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the status is in the 200–299 range.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.status >= 200 && self.status <= 299
    }

    /// Returns true for opaque cross-origin responses.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseType::Opaque
    }

    /// Whether a fetched response may be written back into the cache.
    ///
    /// Only a plain `200` that is not opaque qualifies.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && !self.is_opaque()
    }
}
