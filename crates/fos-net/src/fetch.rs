//! Fetch Pipeline
//!
//! The async `Fetcher` seam used by navigation, and `HttpFetcher`, which puts
//! the cookie store and response cache in front of the blocking HTTP client.

use async_trait::async_trait;
use smol::future;

use crate::abort::AbortSignal;
use crate::cache::ResponseCache;
use crate::client::HttpClient;
use crate::cookies::CookieContainer;
use crate::request::{CredentialsMode, Request};
use crate::response::Response;
use crate::NetError;

/// Performs requests on behalf of a browsing context
#[async_trait(?Send)]
pub trait Fetcher {
    async fn fetch(&self, request: Request, signal: AbortSignal) -> Result<Response, NetError>;
}

/// Fetcher backed by the HTTP client, the context cache and cookie store
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: HttpClient,
    cache: Option<ResponseCache>,
    cookies: CookieContainer,
}

impl HttpFetcher {
    /// Fetcher with its own empty cache and cookie store
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            cache: Some(ResponseCache::new()),
            cookies: CookieContainer::new(),
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_cookies(mut self, cookies: CookieContainer) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn cookies(&self) -> &CookieContainer {
        &self.cookies
    }

    fn store_cookies(&self, request: &Request, response: &Response) {
        if request.credentials == CredentialsMode::Omit {
            return;
        }
        for header in response.headers.get_all("set-cookie") {
            self.cookies.add_set_cookie(&response.url, header);
        }
    }
}

#[async_trait(?Send)]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, mut request: Request, signal: AbortSignal) -> Result<Response, NetError> {
        if signal.is_aborted() {
            return Err(NetError::Aborted);
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return Err(NetError::InvalidUrl(request.url.to_string()));
        }

        if request.sends_cookies() {
            if let Some(header) = self.cookies.cookie_header(&request.url) {
                request.headers.set("Cookie", &header);
            }
        }

        let cached = self.cache.as_ref().and_then(|cache| {
            let entry = cache.get(&request)?;
            Some((entry, cache.now()))
        });
        let outgoing = match &cached {
            Some((entry, now)) if entry.is_fresh(*now) => {
                if let Some(stored) = &entry.response {
                    tracing::debug!("Cache hit: {}", request.url);
                    return Ok(stored.to_response());
                }
                request.clone()
            }
            Some((entry, _)) if entry.is_revalidatable() => entry.conditional_request(&request),
            _ => request.clone(),
        };

        let client = self.client.clone();
        let cache = self.cache.clone();
        let original = request.clone();
        let transfer_signal = signal.clone();
        let transfer = smol::unblock(move || -> Result<Response, NetError> {
            let pending = client.send(&outgoing)?;
            let cacheable = pending.head.status != 304 && !transfer_signal.is_aborted();
            let registered = match &cache {
                Some(cache) if cacheable => cache.add_pending(&original, &pending.head).is_some(),
                _ => false,
            };

            let body = pending.read_body();
            if let (true, Some(cache)) = (registered, &cache) {
                match &body {
                    Ok(response) if !transfer_signal.is_aborted() => {
                        cache.complete_body(&original, &response.body);
                    }
                    _ => {
                        cache.remove_pending(&original);
                    }
                }
            }
            body
        });

        let response = future::or(transfer, async {
            signal.aborted().await;
            if let Some(cache) = &self.cache {
                cache.remove_pending(&request);
            }
            Err(NetError::Aborted)
        })
        .await?;

        self.store_cookies(&request, &response);

        if response.status == 304 {
            let refreshed = self.cache.as_ref().and_then(|cache| cache.add(&request, &response));
            let entry = refreshed.or(cached.map(|(entry, _)| entry));
            if let Some(stored) = entry.as_ref().and_then(|entry| entry.response.as_ref()) {
                tracing::debug!("Revalidated: {}", request.url);
                return Ok(stored.to_response());
            }
        }

        Ok(response)
    }
}
