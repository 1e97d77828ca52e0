//! Synchronous Fetch
//!
//! Blocking fetch used by synchronous script APIs. The request is handed to a
//! child process (`fos-fetch-worker`) and the caller blocks until it exits.
//! Results go through the shared response cache like any other fetch.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use serde::Deserialize;

use crate::cache::{CacheState, ResponseCache};
use crate::cookies::CookieContainer;
use crate::request::{CredentialsMode, Request};
use crate::response::Response;
use crate::worker::{WorkerOutput, WorkerRequest};
use crate::NetError;

const WORKER_NAME: &str = "fos-fetch-worker";

/// How to launch the sync fetch worker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncWorkerConfig {
    /// Worker executable
    pub program: PathBuf,
    /// Arguments passed before the request is written to stdin
    pub args: Vec<String>,
}

impl SyncWorkerConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for SyncWorkerConfig {
    /// The worker installed next to the running executable, else from `PATH`
    fn default() -> Self {
        let sibling = std::env::current_exe()
            .ok()
            .and_then(|exe| Some(exe.parent()?.join(WORKER_NAME)))
            .filter(|path| path.is_file());

        Self::new(sibling.unwrap_or_else(|| PathBuf::from(WORKER_NAME)))
    }
}

/// One synchronous request bound to a context's cache and cookie store
#[derive(Debug, Clone)]
pub struct SyncFetch {
    request: Request,
    cache: ResponseCache,
    cookies: CookieContainer,
    worker: SyncWorkerConfig,
    disable_cache: bool,
}

impl SyncFetch {
    pub fn new(request: Request, cache: ResponseCache, cookies: CookieContainer, worker: SyncWorkerConfig) -> Self {
        Self {
            request,
            cache,
            cookies,
            worker,
            disable_cache: false,
        }
    }

    /// Skip cache reads and writes for this request
    pub fn with_cache_disabled(mut self, disabled: bool) -> Self {
        self.disable_cache = disabled;
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Cached response if usable, otherwise a network round trip
    pub fn fetch(&self) -> Result<Response, NetError> {
        match self.get_cached_response() {
            Some(response) => Ok(response),
            None => self.send(),
        }
    }

    /// Perform the request through the worker process
    pub fn send(&self) -> Result<Response, NetError> {
        let response = self.exchange(&self.outgoing())?;
        Ok(self.store(response, None))
    }

    /// Serve from cache, revalidating entries that carry validators
    ///
    /// Returns `None` when nothing usable is cached or revalidation failed.
    pub fn get_cached_response(&self) -> Option<Response> {
        if self.disable_cache {
            return None;
        }

        let entry = self.cache.get(&self.request)?;
        let cached = entry.response.as_ref()?.to_response();

        let revalidate = entry.etag.is_some() || (entry.state == CacheState::Stale && entry.last_modified.is_some());
        if !revalidate {
            return Some(cached);
        }

        let conditional = entry.conditional_request(&self.outgoing());
        // ETag validation always blocks
        if entry.etag.is_none() && entry.stale_while_revalidate {
            let background = self.clone();
            thread::spawn(move || {
                match background.exchange(&conditional) {
                    Ok(response) => {
                        background.store(response, None);
                    }
                    Err(err) => tracing::debug!("Background revalidation of {} failed: {}", background.request.url, err),
                }
            });
            return Some(cached);
        }

        match self.exchange(&conditional) {
            Ok(response) => Some(self.store(response, Some(cached))),
            Err(err) => {
                tracing::debug!("Revalidation of {} failed: {}", self.request.url, err);
                None
            }
        }
    }

    /// Request as sent: cookies attached per credentials mode
    fn outgoing(&self) -> Request {
        let mut request = self.request.clone();
        if request.sends_cookies() {
            if let Some(header) = self.cookies.cookie_header(&request.url) {
                request.headers.set("Cookie", &header);
            }
        }
        request
    }

    /// Write `response` to the cache; a 304 resolves to the cached body
    fn store(&self, response: Response, cached: Option<Response>) -> Response {
        if self.disable_cache {
            return response;
        }

        if response.status == 304 {
            let merged = self.cache.add(&self.request, &response);
            return merged
                .and_then(|entry| entry.response.map(|stored| stored.to_response()))
                .or(cached)
                .unwrap_or(response);
        }

        self.cache.add(&self.request, &response);
        response
    }

    /// Run the worker for `request` and collect its cookies
    fn exchange(&self, request: &Request) -> Result<Response, NetError> {
        let input = serde_json::to_string(&WorkerRequest::from(request))?;
        let output = self.run_worker(&input)?;

        let response = match serde_json::from_str::<WorkerOutput>(&output) {
            Ok(WorkerOutput::Response(response)) => response.into_response().map_err(|err| {
                tracing::warn!("Sync fetch of {} returned a bad body: {}", request.url, err);
                NetError::SyncRequestFailed
            })?,
            Ok(WorkerOutput::Error(message)) => {
                tracing::warn!("Sync fetch of {} failed: {}", request.url, message);
                return Err(NetError::SyncRequestFailed);
            }
            Err(err) => {
                tracing::warn!("Sync fetch worker produced invalid output: {}", err);
                return Err(NetError::SyncRequestFailed);
            }
        };

        if request.credentials != CredentialsMode::Omit {
            for header in response.headers.get_all("set-cookie") {
                self.cookies.add_set_cookie(&response.url, header);
            }
        }
        Ok(response)
    }

    fn run_worker(&self, input: &str) -> Result<String, NetError> {
        tracing::debug!("Sync fetch via {}", self.worker.program.display());

        let mut child = Command::new(&self.worker.program)
            .args(&self.worker.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| {
                tracing::warn!("Failed to start {}: {}", self.worker.program.display(), err);
                NetError::SyncRequestFailed
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(input.as_bytes()) {
                tracing::warn!("Failed to write sync fetch request: {}", err);
            }
        }

        let output = child.wait_with_output().map_err(|_| NetError::SyncRequestFailed)?;
        if !output.status.success() {
            tracing::warn!("Sync fetch worker exited with {}", output.status);
            return Err(NetError::SyncRequestFailed);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(NetError::SyncRequestFailed);
        }
        Ok(stdout)
    }
}
