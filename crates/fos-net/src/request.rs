//! Fetch Request
//!
//! Request description shared by the async pipeline and the synchronous shim.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::headers::Headers;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
        }
    }

    /// Parse a method name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "HEAD" => Some(Method::Head),
            "OPTIONS" => Some(Method::Options),
            "PATCH" => Some(Method::Patch),
            _ => None,
        }
    }
}

/// Credentials mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsMode {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// Redirect mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedirectMode {
    #[default]
    Follow,
    Error,
    Manual,
}

/// Referrer policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferrerPolicy {
    NoReferrer,
    NoReferrerWhenDowngrade,
    Origin,
    OriginWhenCrossOrigin,
    SameOrigin,
    StrictOrigin,
    #[default]
    StrictOriginWhenCrossOrigin,
    UnsafeUrl,
}

impl ReferrerPolicy {
    /// Parse a `Referrer-Policy` token
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "no-referrer" => Some(Self::NoReferrer),
            "no-referrer-when-downgrade" => Some(Self::NoReferrerWhenDowngrade),
            "origin" => Some(Self::Origin),
            "origin-when-cross-origin" => Some(Self::OriginWhenCrossOrigin),
            "same-origin" => Some(Self::SameOrigin),
            "strict-origin" => Some(Self::StrictOrigin),
            "strict-origin-when-cross-origin" => Some(Self::StrictOriginWhenCrossOrigin),
            "unsafe-url" => Some(Self::UnsafeUrl),
            _ => None,
        }
    }

    /// Referrer value to send from `referrer` to `target`
    pub fn referrer_for(&self, referrer: &Url, target: &Url) -> Option<String> {
        if !matches!(referrer.scheme(), "http" | "https") {
            return None;
        }
        let mut full = referrer.clone();
        full.set_fragment(None);
        let _ = full.set_username("");
        let _ = full.set_password(None);
        let origin = format!("{}/", referrer.origin().ascii_serialization());
        let same_origin = referrer.origin() == target.origin();
        let downgrade = referrer.scheme() == "https" && target.scheme() != "https";

        match self {
            Self::NoReferrer => None,
            Self::UnsafeUrl => Some(full.to_string()),
            Self::Origin => Some(origin),
            Self::SameOrigin => same_origin.then(|| full.to_string()),
            Self::NoReferrerWhenDowngrade => (!downgrade).then(|| full.to_string()),
            Self::OriginWhenCrossOrigin => {
                Some(if same_origin { full.to_string() } else { origin })
            }
            Self::StrictOrigin => (!downgrade).then_some(origin),
            Self::StrictOriginWhenCrossOrigin => {
                if same_origin {
                    Some(full.to_string())
                } else if downgrade {
                    None
                } else {
                    Some(origin)
                }
            }
        }
    }
}

/// Request configuration
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub credentials: CredentialsMode,
    pub redirect: RedirectMode,
    pub referrer: Option<Url>,
    pub referrer_policy: ReferrerPolicy,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
            credentials: CredentialsMode::default(),
            redirect: RedirectMode::default(),
            referrer: None,
            referrer_policy: ReferrerPolicy::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.set(key, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_json(self, json: &str) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(json.as_bytes().to_vec())
    }

    pub fn with_credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_referrer(mut self, referrer: Url, policy: ReferrerPolicy) -> Self {
        self.referrer = Some(referrer);
        self.referrer_policy = policy;
        self
    }

    /// Whether cookies should be attached for this request
    pub fn sends_cookies(&self) -> bool {
        match self.credentials {
            CredentialsMode::Omit => false,
            CredentialsMode::Include => true,
            CredentialsMode::SameOrigin => self
                .referrer
                .as_ref()
                .is_none_or(|referrer| referrer.origin() == self.url.origin()),
        }
    }

    /// `Referer` header value derived from referrer and policy
    pub fn referrer_header(&self) -> Option<String> {
        self.referrer
            .as_ref()
            .and_then(|referrer| self.referrer_policy.referrer_for(referrer, &self.url))
    }
}
