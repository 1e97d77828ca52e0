//! HTTP Client
//!
//! Blocking HTTP transport used by the fetch pipeline. Calls are made from
//! `smol::unblock` so the event loop never waits on a socket.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::redirect::Policy;

use crate::headers::Headers;
use crate::request::{RedirectMode, Request};
use crate::response::Response;
use crate::NetError;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent string
    pub user_agent: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max redirects to follow in `follow` mode
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("fOS-Headless/", env!("CARGO_PKG_VERSION")).into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_redirects: 20,
        }
    }
}

/// HTTP client builder
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    config: ClientConfig,
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.config.user_agent = ua.to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    pub fn build(self) -> Result<HttpClient, NetError> {
        HttpClient::with_config(self.config)
    }
}

/// Response whose headers have arrived but whose body has not been read
pub struct PendingResponse {
    pub head: Response,
    inner: reqwest::blocking::Response,
}

impl PendingResponse {
    /// Read the rest of the body
    pub fn read_body(self) -> Result<Response, NetError> {
        let mut response = self.head;
        response.body = self
            .inner
            .bytes()
            .map_err(|e| NetError::Network(e.to_string()))?
            .to_vec();
        Ok(response)
    }
}

/// Blocking HTTP client
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: ClientConfig,
    following: Client,
    manual: Client,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, NetError> {
        let build = |policy: Policy| {
            Client::builder()
                .user_agent(config.user_agent.clone())
                .connect_timeout(config.connect_timeout)
                .timeout(config.request_timeout)
                .redirect(policy)
                .build()
                .map_err(|e| NetError::Network(e.to_string()))
        };

        Ok(Self {
            following: build(Policy::limited(config.max_redirects))?,
            manual: build(Policy::none())?,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn prepare(&self, request: &Request) -> Result<RequestBuilder, NetError> {
        let client = match request.redirect {
            RedirectMode::Follow => &self.following,
            RedirectMode::Error | RedirectMode::Manual => &self.manual,
        };
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| NetError::Network(e.to_string()))?;

        let mut builder = client.request(method, request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(referrer) = request.referrer_header() {
            builder = builder.header("Referer", referrer);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        Ok(builder)
    }

    /// Send a request and wait for the response headers
    pub fn send(&self, request: &Request) -> Result<PendingResponse, NetError> {
        tracing::info!("HTTP {} {}", request.method.as_str(), request.url);

        let inner = self
            .prepare(request)?
            .send()
            .map_err(|e| NetError::Network(e.to_string()))?;

        let status = inner.status();
        if request.redirect == RedirectMode::Error && status.is_redirection() {
            return Err(NetError::Network(format!("Unexpected redirect to {}", request.url)));
        }

        let headers: Headers = inner
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();

        let head = Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            url: inner.url().clone(),
            headers,
            body: Vec::new(),
            from_cache: false,
        };

        Ok(PendingResponse { head, inner })
    }
}
