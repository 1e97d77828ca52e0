//! Cache Entry

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::http_date::format_http_date;
use crate::headers::Headers;
use crate::request::{Method, Request};
use crate::response::Response;

/// Freshness state of a cached entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Within max-age / Expires
    Fresh,
    /// Expired but revalidatable through Last-Modified
    Stale,
}

/// Response snapshot held by a cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub status_text: String,
    pub url: Url,
    pub headers: Headers,
    /// Not persisted in the metadata file; lives in the sibling `.data` file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    /// Body is still being read from the network
    #[serde(default)]
    pub waiting_for_body: bool,
}

impl StoredResponse {
    pub(crate) fn from_response(response: &Response) -> Self {
        Self {
            status: response.status,
            status_text: response.status_text.clone(),
            url: response.url.clone(),
            headers: response.headers.clone(),
            body: Some(response.body.clone()),
            waiting_for_body: false,
        }
    }

    /// Rebuild a `Response` served from cache
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            status_text: self.status_text.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone().unwrap_or_default(),
            from_cache: true,
        }
    }
}

/// One cached HTTP exchange for a URL + request signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub url: String,
    pub request_method: Method,
    pub request_headers: Headers,
    /// Request header values named by `Vary`, keyed by lower-case name
    pub vary_headers: BTreeMap<String, Option<String>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub must_revalidate: bool,
    pub stale_while_revalidate: bool,
    pub cache_update_time: DateTime<Utc>,
    pub state: CacheState,
    pub response: Option<StoredResponse>,
}

impl CachedResponse {
    pub(crate) fn new(key: &str, request: &Request, now: DateTime<Utc>) -> Self {
        Self {
            url: key.to_string(),
            request_method: request.method,
            request_headers: request.headers.clone(),
            vary_headers: BTreeMap::new(),
            expires_at: None,
            etag: None,
            last_modified: None,
            must_revalidate: false,
            stale_while_revalidate: false,
            cache_update_time: now,
            state: CacheState::Fresh,
            response: None,
        }
    }

    /// Same method and same values for every stored vary header
    pub fn matches(&self, request: &Request) -> bool {
        self.request_method == request.method
            && self
                .vary_headers
                .iter()
                .all(|(name, value)| request.headers.get(name) == value.as_deref())
    }

    /// Expiry is strictly in the past
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires < now)
    }

    /// Expiry has not passed yet
    pub fn has_valid_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires >= now)
    }

    pub fn is_waiting_for_body(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.waiting_for_body)
    }

    /// Cached body, if the response has been fully read
    pub fn body(&self) -> Option<&[u8]> {
        self.response.as_ref().and_then(|r| r.body.as_deref())
    }

    /// Usable without contacting the server
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.state == CacheState::Fresh && self.has_valid_expiry(now)
    }

    /// Carries a validator a conditional request can use
    pub fn is_revalidatable(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }

    /// Copy of `request` carrying this entry's validator
    ///
    /// The ETag wins; `If-Modified-Since` is only sent without one.
    pub fn conditional_request(&self, request: &Request) -> Request {
        let mut conditional = request.clone();
        match (&self.etag, self.last_modified) {
            (Some(etag), _) => conditional.headers.set("If-None-Match", etag),
            (None, Some(last_modified)) => conditional.headers.set("If-Modified-Since", &format_http_date(last_modified)),
            (None, None) => {}
        }
        conditional
    }
}

/// Cache key for a URL: the serialization without its fragment
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}
