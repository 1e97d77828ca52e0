//! Cookie Handling
//!
//! Cookie container with domain/path matching, shared by every frame of a
//! browsing context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use url::Url;

use crate::cache::http_date::parse_http_date;

/// Cookie attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain (for matching)
    pub domain: String,
    /// Path (for matching)
    pub path: String,
    /// Expiry time (None = session cookie)
    pub expires: Option<DateTime<Utc>>,
    /// Secure flag (HTTPS only)
    pub secure: bool,
    /// HttpOnly flag (no JS access)
    pub http_only: bool,
    /// SameSite attribute
    pub same_site: SameSite,
    /// Domain attribute was absent; only the exact host matches
    pub host_only: bool,
}

/// SameSite attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// Cookie sent with all requests
    None,
    /// Cookie not sent with cross-origin requests
    #[default]
    Lax,
    /// Cookie only sent with same-site requests
    Strict,
}

impl Cookie {
    /// Create a simple session cookie
    pub fn new(name: &str, value: &str, domain: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            path: path.to_string(),
            expires: None,
            secure: false,
            http_only: false,
            same_site: SameSite::Lax,
            host_only: false,
        }
    }

    /// Parse a `Set-Cookie` header received from `url`
    pub fn parse(header: &str, url: &Url) -> Option<Self> {
        let mut parts = header.split(';');

        // First part is name=value
        let (name, value) = parts.next()?.trim().split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let host = url.host_str()?.to_ascii_lowercase();
        let mut cookie = Cookie::new(name, value.trim(), &host, &default_path(url));
        cookie.host_only = true;
        let mut max_age_seen = false;

        for part in parts {
            let part = part.trim();
            let (attr, val) = match part.split_once('=') {
                Some((attr, val)) => (attr.trim().to_ascii_lowercase(), val.trim()),
                None => (part.to_ascii_lowercase(), ""),
            };

            match attr.as_str() {
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "domain" if !val.is_empty() => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    // A server may only set cookies for its own domain tree
                    if host != domain && !host.ends_with(&format!(".{domain}")) {
                        return None;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "max-age" => {
                    if let Ok(seconds) = val.parse::<i64>() {
                        cookie.expires = Duration::try_seconds(seconds)
                            .and_then(|d| Utc::now().checked_add_signed(d));
                        max_age_seen = true;
                    }
                }
                "expires" if !max_age_seen => {
                    if let Some(date) = parse_http_date(val) {
                        cookie.expires = Some(date);
                    }
                }
                "samesite" => {
                    cookie.same_site = match val.to_ascii_lowercase().as_str() {
                        "strict" => SameSite::Strict,
                        "none" => SameSite::None,
                        _ => SameSite::Lax,
                    };
                }
                _ => {}
            }
        }

        Some(cookie)
    }

    /// Check if cookie has expired
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= Utc::now())
    }

    /// Check if cookie matches the given host
    pub fn matches_domain(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.host_only {
            return host == self.domain;
        }
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }

    /// Check if cookie matches the given path
    pub fn matches_path(&self, path: &str) -> bool {
        if self.path == "/" || self.path == path {
            return true;
        }
        path.starts_with(&self.path)
            && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/'))
    }

    /// Check if cookie should be sent for a request to `url`
    pub fn matches(&self, url: &Url) -> bool {
        if self.is_expired() {
            return false;
        }
        if self.secure && url.scheme() != "https" && url.scheme() != "wss" {
            return false;
        }
        url.host_str().is_some_and(|host| self.matches_domain(host)) && self.matches_path(url.path())
    }

    /// Serialize to Cookie header format (name=value)
    pub fn serialize(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Directory of the request path, as used for the default cookie path
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

/// Cookie store for a browsing context
///
/// Cloning yields another handle to the same cookies.
#[derive(Debug, Clone, Default)]
pub struct CookieContainer {
    /// Cookies indexed by domain
    cookies: Arc<Mutex<HashMap<String, Vec<Cookie>>>>,
}

impl CookieContainer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Cookie>>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add cookies; a cookie replaces any with the same name, domain and path
    pub fn add_cookies(&self, cookies: impl IntoIterator<Item = Cookie>) {
        let mut jar = self.lock();
        for cookie in cookies {
            let bucket = jar.entry(cookie.domain.clone()).or_default();
            bucket.retain(|c| !(c.name == cookie.name && c.path == cookie.path));

            // An already expired cookie only deletes
            if !cookie.is_expired() {
                bucket.push(cookie);
            }
        }
    }

    /// Add from a `Set-Cookie` header received from `url`
    pub fn add_set_cookie(&self, url: &Url, header: &str) {
        match Cookie::parse(header, url) {
            Some(cookie) => self.add_cookies([cookie]),
            None => tracing::debug!("Ignoring Set-Cookie from {}: {}", url, header),
        }
    }

    /// Cookies to send to `url`, longest path first
    pub fn get_cookies(&self, url: &Url, include_http_only: bool) -> Vec<Cookie> {
        let jar = self.lock();
        let mut result: Vec<Cookie> = jar
            .values()
            .flatten()
            .filter(|c| c.matches(url) && (include_http_only || !c.http_only))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        result
    }

    /// `Cookie` request header value for `url`
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.get_cookies(url, true);
        if cookies.is_empty() {
            return None;
        }
        Some(cookies.iter().map(Cookie::serialize).collect::<Vec<_>>().join("; "))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
