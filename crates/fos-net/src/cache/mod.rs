//! HTTP Response Cache
//!
//! Per-context cache of response metadata with freshness and validation
//! state. Entries whose expiry has passed survive as `Stale` when they carry
//! `Last-Modified`, so a conditional request can revalidate them instead of
//! refetching the body.

mod directives;
mod entry;
pub mod http_date;
mod persist;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

pub use directives::{CacheControl, parse_vary, request_bypasses_cache};
pub use entry::{CacheState, CachedResponse, StoredResponse, cache_key};

use crate::clock::{Clock, SystemClock};
use crate::request::Request;
use crate::response::Response;

/// Headers refreshed on a stored response by a `304 Not Modified`
const REVALIDATION_HEADERS: &[&str] = &[
    "cache-control",
    "expires",
    "etag",
    "last-modified",
    "age",
    "date",
    "vary",
];

/// Options for `ResponseCache::clear`
#[derive(Debug, Clone, Default)]
pub struct ClearOptions {
    /// Only entries for this URL
    pub url: Option<url::Url>,
    /// Only entries last updated before this time
    pub to_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct CacheStore {
    entries: HashMap<String, Vec<CachedResponse>>,
}

impl CacheStore {
    fn position(&self, key: &str, request: &Request) -> Option<usize> {
        self.entries.get(key)?.iter().position(|e| e.matches(request))
    }

    fn remove_at(&mut self, key: &str, index: usize) {
        if let Some(group) = self.entries.get_mut(key) {
            if index < group.len() {
                group.remove(index);
            }
            if group.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    fn upsert(&mut self, key: &str, index: Option<usize>, entry: CachedResponse) {
        let group = self.entries.entry(key.to_string()).or_default();
        match index {
            Some(i) if i < group.len() => group[i] = entry,
            _ => group.push(entry),
        }
    }
}

/// Response cache shared by every frame of a browsing context
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<Mutex<CacheStore>>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(Mutex::new(CacheStore::default())),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock(&self) -> MutexGuard<'_, CacheStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a reusable entry for `request`
    pub fn get(&self, request: &Request) -> Option<CachedResponse> {
        if request_bypasses_cache(request.headers.get("Cache-Control")) {
            return None;
        }

        let key = cache_key(&request.url);
        let now = self.now();
        let mut store = self.lock();
        let index = store.position(&key, request)?;

        let entry = store.entries.get_mut(&key)?.get_mut(index)?;
        if entry.is_expired(now) {
            if entry.last_modified.is_some() {
                entry.state = CacheState::Stale;
            } else if entry.etag.is_none() {
                tracing::debug!("Cache entry expired: {}", key);
                store.remove_at(&key, index);
                return None;
            }
        }

        if entry.is_waiting_for_body() {
            return None;
        }

        Some(entry.clone())
    }

    /// Store `response` for `request`, returning the entry when cacheable
    pub fn add(&self, request: &Request, response: &Response) -> Option<CachedResponse> {
        self.write(request, response, false)
    }

    /// Store response headers while the body is still being read
    ///
    /// The entry is invisible to `get` until `complete_body` is called.
    pub fn add_pending(&self, request: &Request, response: &Response) -> Option<CachedResponse> {
        self.write(request, response, true)
    }

    /// Attach the body to an entry created by `add_pending`
    pub fn complete_body(&self, request: &Request, body: &[u8]) -> bool {
        let key = cache_key(&request.url);
        let mut store = self.lock();
        let Some(index) = store.position(&key, request) else {
            return false;
        };
        let Some(stored) = store
            .entries
            .get_mut(&key)
            .and_then(|group| group.get_mut(index))
            .and_then(|entry| entry.response.as_mut())
        else {
            return false;
        };
        stored.body = Some(body.to_vec());
        stored.waiting_for_body = false;
        true
    }

    /// Drop an entry created by `add_pending` whose body never arrived
    ///
    /// Completed entries are left alone.
    pub fn remove_pending(&self, request: &Request) -> bool {
        let key = cache_key(&request.url);
        let mut store = self.lock();
        let Some(index) = store.position(&key, request) else {
            return false;
        };
        let pending = store
            .entries
            .get(&key)
            .and_then(|group| group.get(index))
            .is_some_and(CachedResponse::is_waiting_for_body);
        if pending {
            tracing::debug!("Dropping unfinished cache entry: {}", key);
            store.remove_at(&key, index);
        }
        pending
    }

    fn write(&self, request: &Request, response: &Response, pending: bool) -> Option<CachedResponse> {
        let cache_control = response.headers.get("Cache-Control").map(CacheControl::parse);
        if cache_control.as_ref().is_some_and(CacheControl::forbids_storage) {
            return None;
        }

        let vary = response.headers.get("Vary").map(parse_vary).unwrap_or_default();
        if vary.iter().any(|name| name == "*") {
            return None;
        }

        let key = cache_key(&request.url);
        let now = self.now();
        let mut store = self.lock();
        let index = store.position(&key, request);
        let mut entry = match index {
            Some(i) => store.entries[&key][i].clone(),
            None => CachedResponse::new(&key, request, now),
        };

        if response.status == 304 {
            let Some(stored) = entry.response.as_mut() else {
                return None;
            };
            for name in REVALIDATION_HEADERS {
                if let Some(value) = response.headers.get(name) {
                    stored.headers.set(name, value);
                }
            }
        } else {
            let mut stored = StoredResponse::from_response(response);
            if pending {
                stored.body = None;
                stored.waiting_for_body = true;
            }
            entry.response = Some(stored);
            entry.request_method = request.method;
            entry.request_headers = request.headers.clone();
            entry.expires_at = None;
            entry.etag = None;
            entry.last_modified = None;
            entry.must_revalidate = false;
            entry.stale_while_revalidate = false;
        }

        let mut max_age_set = false;
        if let Some(cc) = &cache_control {
            if let Some(max_age) = cc.max_age {
                let age = response
                    .headers
                    .get("Age")
                    .and_then(|a| a.trim().parse::<i64>().ok())
                    .unwrap_or(0);
                entry.expires_at = Duration::try_seconds(max_age.saturating_sub(age))
                    .and_then(|lifetime| now.checked_add_signed(lifetime));
                max_age_set = true;
            }
            entry.must_revalidate = cc.must_revalidate;
            entry.stale_while_revalidate = cc.stale_while_revalidate;
        }

        if !vary.is_empty() {
            entry.vary_headers = vary
                .into_iter()
                .map(|name| {
                    let value = request.headers.get(&name).map(str::to_string);
                    (name, value)
                })
                .collect();
        }

        if !max_age_set {
            if let Some(expires) = response.headers.get("Expires") {
                entry.expires_at = http_date::parse_http_date(expires);
            }
        }

        if let Some(etag) = response.headers.get("ETag") {
            entry.etag = Some(etag.to_string());
        }

        if let Some(last_modified) = response.headers.get("Last-Modified") {
            entry.last_modified = http_date::parse_http_date(last_modified);
        }

        entry.cache_update_time = now;

        if entry.etag.is_none() && !entry.has_valid_expiry(now) {
            if let Some(i) = index {
                store.remove_at(&key, i);
            }
            tracing::debug!("Response not cacheable: {}", key);
            return None;
        }

        entry.state = CacheState::Fresh;
        store.upsert(&key, index, entry.clone());
        Some(entry)
    }

    /// Remove expired entries that cannot be revalidated through Last-Modified
    pub fn clear_expired(&self, url: Option<&url::Url>) {
        let now = self.now();
        let mut store = self.lock();
        let keep = |entry: &CachedResponse| !(entry.is_expired(now) && entry.last_modified.is_none());

        match url {
            Some(url) => {
                let key = cache_key(url);
                if let Some(group) = store.entries.get_mut(&key) {
                    group.retain(&keep);
                    if group.is_empty() {
                        store.entries.remove(&key);
                    }
                }
            }
            None => {
                store.entries.retain(|_, group| {
                    group.retain(&keep);
                    !group.is_empty()
                });
            }
        }
    }

    /// Flush everything, one URL, or entries older than `to_time`
    pub fn clear(&self, options: ClearOptions) {
        let mut store = self.lock();
        let key = options.url.as_ref().map(cache_key);

        match (key, options.to_time) {
            (None, None) => store.entries.clear(),
            (Some(key), None) => {
                store.entries.remove(&key);
            }
            (key, Some(to_time)) => {
                store.entries.retain(|k, group| {
                    if key.as_ref().is_none_or(|key| key == k) {
                        group.retain(|entry| entry.cache_update_time >= to_time);
                    }
                    !group.is_empty()
                });
            }
        }
    }

    /// Snapshot of the entries stored under `url`
    pub fn entries(&self, url: &url::Url) -> Vec<CachedResponse> {
        self.lock().entries.get(&cache_key(url)).cloned().unwrap_or_default()
    }

    /// Number of stored entries across all URLs
    pub fn len(&self) -> usize {
        self.lock().entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
