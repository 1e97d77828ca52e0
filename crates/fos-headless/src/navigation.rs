//! Frame Navigation
//!
//! `BrowserFrameUtility` drives a frame from one committed window to the next:
//! resolve, check policy, tear down, fetch, commit.

use std::rc::Rc;
use std::time::Duration;

use fos_js::{JsValue, Script};
use fos_net::{AbortController, CredentialsMode, NetError, ReferrerPolicy, Request, Response};
use smol::{Timer, future};
use url::Url;

use crate::browser::{BrowserFrame, BrowserPage, FrameKind};
use crate::console::Console;
use crate::error::BrowserError;
use crate::window::{Window, WindowFactory, WindowOptions};

/// Options for `BrowserFrameUtility::goto`
#[derive(Debug, Clone, Default)]
pub struct GotoOptions {
    pub referrer: Option<Url>,
    pub referrer_policy: Option<ReferrerPolicy>,
    /// Timeout in milliseconds; the navigation setting when unset
    pub timeout: Option<u64>,
}

impl GotoOptions {
    pub fn with_referrer(mut self, referrer: Url) -> Self {
        self.referrer = Some(referrer);
        self
    }

    pub fn with_referrer_policy(mut self, policy: ReferrerPolicy) -> Self {
        self.referrer_policy = Some(policy);
        self
    }

    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }
}

/// Navigation and teardown for frames
pub struct BrowserFrameUtility;

impl BrowserFrameUtility {
    /// Navigate `frame` to `url`
    ///
    /// Returns the response for fetched documents and `None` for `javascript:`
    /// and `about:` targets, refused navigations and navigations superseded
    /// by a later one.
    pub async fn goto(
        window_factory: &dyn WindowFactory,
        frame: &BrowserFrame,
        url: &str,
        options: GotoOptions,
    ) -> Result<Option<Response>, BrowserError> {
        let target = Self::resolve(frame, url)?;
        let context = frame.context()?;
        let settings = context.settings();

        if target.scheme() == "javascript" {
            if settings.disable_javascript_evaluation {
                return Ok(None);
            }
            future::yield_now().await;
            Self::run_javascript_url(frame, &target, settings.disable_error_capturing)?;
            return Ok(None);
        }

        if !Self::is_navigation_allowed(frame, &target) {
            tracing::debug!("Navigation to {} refused", target);
            if !settings.navigation.disable_fallback_to_set_url {
                if let Some(window) = frame.window() {
                    window.set_location(target);
                }
            }
            return Ok(None);
        }

        let page = frame.page().ok_or(BrowserError::Closed)?;
        let window = Self::replace_window(window_factory, frame, &page, &target);

        if target.scheme() == "about" {
            return Ok(None);
        }

        let mut request = Request::get(target.clone()).with_credentials(CredentialsMode::Include);
        if let Some(referrer) = options.referrer {
            request = request.with_referrer(referrer, options.referrer_policy.unwrap_or_default());
        }
        let timeout = options.timeout.unwrap_or(settings.navigation.timeout_ms);

        let controller = AbortController::new();
        let task = window.tasks().start_task_with_abort(controller.clone());
        let fetcher = context.fetcher();

        tracing::info!("Navigating to {}", target);
        let result = future::or(fetcher.fetch(request, controller.signal()), async {
            Timer::after(Duration::from_millis(timeout)).await;
            controller.abort();
            Err(NetError::Timeout(timeout))
        })
        .await;

        if window.is_closed() || !frame.is_current_window(&window) {
            tracing::debug!("Navigation to {} superseded", target);
            window.tasks().end_task(task);
            return Ok(None);
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                window.tasks().end_task(task);
                return Err(err.into());
            }
        };

        if let Some(parent) = frame.parent_frame() {
            if let Err(err) = Self::check_frame_options(&parent, &target, &response) {
                window.tasks().end_task(task);
                return Err(err);
            }
        }

        let text = response.text();
        window.write_document(text.clone());
        frame.set_content(Some(text));
        window.tasks().end_task(task);

        if !response.ok() {
            window.console().error(&format!(
                "GET {} {} ({})",
                target, response.status, response.status_text
            ));
        }

        Ok(Some(response))
    }

    fn resolve(frame: &BrowserFrame, url: &str) -> Result<Url, BrowserError> {
        let base = frame.location();
        Url::options().base_url(base.as_ref()).parse(url).map_err(|_| {
            BrowserError::UriMismatch(match base.as_ref().filter(|b| b.host_str().is_some()) {
                Some(base) => format!("\"{}\" relative to \"{}\"", url, base),
                None => url.to_string(),
            })
        })
    }

    fn run_javascript_url(frame: &BrowserFrame, target: &Url, propagate: bool) -> Result<(), BrowserError> {
        let Some(window) = frame.window() else {
            return Ok(());
        };

        let body = &target.as_str()["javascript:".len()..];
        let source = urlencoding::decode(body).map(|s| s.into_owned()).unwrap_or_else(|_| body.to_string());

        match window.evaluate(&Script::new(&source, target.as_str())) {
            Ok(_) => Ok(()),
            Err(err) if propagate => Err(err),
            Err(err) => {
                window.console().error(&err.to_string());
                Ok(())
            }
        }
    }

    /// Tear down the frame's children and window, then install a fresh one
    fn replace_window(
        window_factory: &dyn WindowFactory,
        frame: &BrowserFrame,
        page: &BrowserPage,
        target: &Url,
    ) -> Rc<Window> {
        for child in frame.take_children() {
            Self::close_frame(&child);
        }
        if let Some(previous) = frame.take_window() {
            previous.close();
        }

        let window = window_factory.construct(WindowOptions {
            owning_frame: frame,
            console: page.console(),
            url: target.clone(),
        });
        frame.set_window(window.clone());
        frame.set_content(None);
        window
    }

    fn check_frame_options(parent: &BrowserFrame, target: &Url, response: &Response) -> Result<(), BrowserError> {
        let Some(value) = response.headers.get("x-frame-options") else {
            return Ok(());
        };

        let blocked = match value.trim().to_ascii_lowercase().as_str() {
            "deny" => true,
            "sameorigin" => parent.location().is_some_and(|parent_url| {
                let origin = parent_url.origin();
                origin.is_tuple() && origin != target.origin()
            }),
            _ => false,
        };

        if blocked {
            return Err(BrowserError::Security(format!(
                "Refused to display '{}' in a frame because it set 'X-Frame-Options' to '{}'.",
                target, value
            )));
        }
        Ok(())
    }

    /// Whether policy lets `frame` load `to`
    pub fn is_navigation_allowed(frame: &BrowserFrame, to: &Url) -> bool {
        if Self::is_detached_main_frame(frame) {
            return false;
        }
        let Ok(context) = frame.context() else {
            return false;
        };
        let policy = &context.settings().navigation;

        if policy.allow_all {
            return true;
        }

        if policy.same_origin_only {
            if let Some(from) = Self::origin_source(frame) {
                let ignored = |url: &Url| matches!(url.scheme(), "about" | "javascript");
                if !ignored(&from) && !ignored(to) && from.origin() != to.origin() {
                    return false;
                }
            }
        }

        let main = frame.is_main_frame();
        if policy.disable_main_frame_navigation && main {
            return false;
        }
        if policy.disable_child_frame_navigation && !main {
            return false;
        }
        if policy.allow_child_pages && frame.opener().is_some() {
            return true;
        }
        false
    }

    /// Location compared against the target: opener, then parent, then own
    fn origin_source(frame: &BrowserFrame) -> Option<Url> {
        if let Some(opener) = frame.opener() {
            return opener.location();
        }
        if let Some(parent) = frame.parent_frame() {
            return parent.location();
        }
        frame.location()
    }

    /// Main frame of the first page of a detached browser's default context
    pub fn is_detached_main_frame(frame: &BrowserFrame) -> bool {
        if frame.kind() != FrameKind::Detached || !frame.is_main_frame() {
            return false;
        }
        let (Some(page), Ok(context)) = (frame.page(), frame.context()) else {
            return false;
        };
        context.is_default() && context.pages().first().is_some_and(|first| first.ptr_eq(&page))
    }

    /// Close `frame` and its subtree; children close first
    pub fn close_frame(frame: &BrowserFrame) {
        let Some(window) = frame.take_window() else {
            return;
        };

        if let Some(parent) = frame.parent_frame() {
            parent.remove_child(frame);
        }
        for child in frame.take_children() {
            Self::close_frame(&child);
        }

        window.close();
        frame.set_content(None);
        frame.clear_links();
    }

    /// Attach a blank child frame to `parent`
    pub fn new_frame(parent: &BrowserFrame) -> Result<BrowserFrame, BrowserError> {
        parent.new_child()
    }

    /// Run script in the frame's current window
    pub fn evaluate(frame: &BrowserFrame, script: impl Into<Script>) -> Result<JsValue, BrowserError> {
        let window = frame.window().ok_or(BrowserError::Closed)?;
        window.evaluate(&script.into())
    }

    /// Open a page in `opener`'s context with the opener link set, then navigate it
    pub async fn open_page(opener: &BrowserFrame, url: &str) -> Result<BrowserPage, BrowserError> {
        let context = opener.context()?;
        let page = context.new_page()?;
        let frame = page.main_frame().ok_or(BrowserError::Closed)?;
        frame.set_opener(Some(opener));

        let mut options = GotoOptions::default();
        if let Some(referrer) = opener.location().filter(|u| matches!(u.scheme(), "http" | "https")) {
            options = options.with_referrer(referrer);
        }
        let target = Self::resolve(opener, url)?;

        Self::goto(context.window_factory().as_ref(), &frame, target.as_str(), options).await?;
        Ok(page)
    }

    /// Wait until no task runs in `frame` or its descendants
    pub async fn wait_until_complete(frame: &BrowserFrame) {
        loop {
            let busy: Vec<Rc<Window>> = Self::subtree(frame)
                .iter()
                .filter_map(BrowserFrame::window)
                .filter(|window| window.tasks().count() > 0)
                .collect();
            if busy.is_empty() {
                return;
            }
            for window in busy {
                window.tasks().wait_until_complete().await;
            }
        }
    }

    fn subtree(frame: &BrowserFrame) -> Vec<BrowserFrame> {
        let mut frames = vec![frame.clone()];
        let mut index = 0;
        while index < frames.len() {
            let children = frames[index].child_frames();
            frames.extend(children);
            index += 1;
        }
        frames
    }
}
