//! Sync Fetch Worker Protocol
//!
//! JSON exchanged between `SyncFetch` and the `fos-fetch-worker` process.
//! The request arrives on stdin; the worker answers on stdout with either
//! `{"response": {...}}` or `{"error": "..."}`. Bodies travel as base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::abort::AbortSignal;
use crate::fetch::Fetcher;
use crate::headers::Headers;
use crate::request::{CredentialsMode, Method, RedirectMode, ReferrerPolicy, Request};
use crate::response::Response;
use crate::NetError;

/// Request as written to the worker's stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub method: Method,
    pub url: Url,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub credentials: CredentialsMode,
    #[serde(default)]
    pub redirect: RedirectMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<Url>,
    #[serde(default)]
    pub referrer_policy: ReferrerPolicy,
}

impl From<&Request> for WorkerRequest {
    fn from(request: &Request) -> Self {
        Self {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.as_ref().map(|body| STANDARD.encode(body)),
            credentials: request.credentials,
            redirect: request.redirect,
            referrer: request.referrer.clone(),
            referrer_policy: request.referrer_policy,
        }
    }
}

impl WorkerRequest {
    pub fn into_request(self) -> Result<Request, NetError> {
        let body = match self.body {
            Some(encoded) => Some(
                STANDARD
                    .decode(encoded)
                    .map_err(|e| NetError::Network(format!("Invalid request body: {e}")))?,
            ),
            None => None,
        };

        Ok(Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body,
            credentials: self.credentials,
            redirect: self.redirect,
            referrer: self.referrer,
            referrer_policy: self.referrer_policy,
        })
    }
}

/// Response as written to the worker's stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    pub url: Url,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
}

impl From<&Response> for WorkerResponse {
    fn from(response: &Response) -> Self {
        Self {
            status: response.status,
            status_text: response.status_text.clone(),
            url: response.url.clone(),
            headers: response.headers.clone(),
            body: STANDARD.encode(&response.body),
        }
    }
}

impl WorkerResponse {
    pub fn into_response(self) -> Result<Response, NetError> {
        let body = STANDARD
            .decode(self.body)
            .map_err(|e| NetError::Network(format!("Invalid response body: {e}")))?;

        Ok(Response {
            status: self.status,
            status_text: self.status_text,
            url: self.url,
            headers: self.headers,
            body,
            from_cache: false,
        })
    }
}

/// Everything the worker can print
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerOutput {
    Response(WorkerResponse),
    Error(String),
}

/// Handle one worker invocation: parse `input`, fetch, render the output JSON
pub fn run(input: &str, fetcher: &dyn Fetcher) -> String {
    let output = match execute(input, fetcher) {
        Ok(response) => WorkerOutput::Response(WorkerResponse::from(&response)),
        Err(err) => {
            tracing::warn!("Sync fetch worker failed: {}", err);
            WorkerOutput::Error(err.to_string())
        }
    };

    serde_json::to_string(&output)
        .unwrap_or_else(|err| format!(r#"{{"error":"{}"}}"#, err.to_string().replace('"', "'")))
}

fn execute(input: &str, fetcher: &dyn Fetcher) -> Result<Response, NetError> {
    let request = serde_json::from_str::<WorkerRequest>(input)?.into_request()?;
    smol::block_on(fetcher.fetch(request, AbortSignal::never()))
}
