//! fOS Networking
//!
//! Fetch pipeline, HTTP response cache, cookie storage and the
//! synchronous fetch shim used by blocking script APIs.

pub mod abort;
pub mod cache;
pub mod client;
pub mod clock;
pub mod cookies;
pub mod fetch;
pub mod headers;
pub mod request;
pub mod response;
pub mod sync_fetch;
pub mod worker;

pub use abort::{AbortController, AbortSignal};
pub use cache::{CacheState, CachedResponse, ClearOptions, ResponseCache, StoredResponse};
pub use client::{ClientConfig, HttpClient, HttpClientBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cookies::{Cookie, CookieContainer, SameSite};
pub use fetch::{Fetcher, HttpFetcher};
pub use headers::Headers;
pub use request::{CredentialsMode, Method, RedirectMode, ReferrerPolicy, Request};
pub use response::Response;
pub use sync_fetch::{SyncFetch, SyncWorkerConfig};
pub use url::Url;

/// Network error
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("The operation was aborted.")]
    Aborted,

    #[error("The operation timed out after {0} ms.")]
    Timeout(u64),

    #[error("Synchronous request failed")]
    SyncRequestFailed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetError {
    /// Whether the error came from an abort signal or a timeout
    pub fn is_abort(&self) -> bool {
        matches!(self, NetError::Aborted | NetError::Timeout(_))
    }
}
