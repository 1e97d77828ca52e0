//! Fetch Response

use url::Url;

use crate::headers::Headers;

/// HTTP Response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub url: Url,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// Served from the response cache rather than the network
    pub from_cache: bool,
}

impl Response {
    pub fn new(url: Url, status: u16) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            url,
            headers: Headers::new(),
            body: Vec::new(),
            from_cache: false,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Status in the 200-299 range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossy
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Reason phrase for common status codes
pub fn default_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}
