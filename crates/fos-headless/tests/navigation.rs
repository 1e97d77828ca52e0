//! Navigation and frame lifecycle tests

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use fos_headless::{
    Browser, BrowserError, BrowserFrame, BrowserFrameUtility, BrowserSettings, ConsoleLevel, GotoOptions,
};
use fos_net::{AbortSignal, Fetcher, NetError, Request, Response};
use smol::{Timer, future};
use url::Url;

// ============================================================================
// FIXTURES
// ============================================================================

/// Serves canned responses after an optional delay, honouring the abort signal
#[derive(Default)]
struct MockFetcher {
    routes: RefCell<HashMap<String, Response>>,
    delay: Option<Duration>,
    requests: RefCell<Vec<Request>>,
}

impl MockFetcher {
    fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn delayed(delay: Duration) -> Rc<Self> {
        Rc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    fn route(&self, url: &str, status: u16, body: &str) -> &Self {
        self.route_with(url, Response::new(Url::parse(url).unwrap(), status).with_body(body))
    }

    fn route_with(&self, url: &str, response: Response) -> &Self {
        self.routes.borrow_mut().insert(url.to_string(), response);
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.url.to_string()).collect()
    }
}

#[async_trait(?Send)]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: Request, signal: AbortSignal) -> Result<Response, NetError> {
        self.requests.borrow_mut().push(request.clone());
        let route = self.routes.borrow().get(request.url.as_str()).cloned();

        let respond = async {
            if let Some(delay) = self.delay {
                Timer::after(delay).await;
            }
            route.ok_or_else(|| NetError::Network(format!("connection refused: {}", request.url)))
        };
        future::or(respond, async {
            signal.aborted().await;
            Err(NetError::Aborted)
        })
        .await
    }
}

fn browser_with(settings: BrowserSettings, fetcher: &Rc<MockFetcher>) -> Browser {
    Browser::builder()
        .with_settings(settings)
        .with_fetcher(fetcher.clone())
        .build()
        .unwrap()
}

fn restrictive() -> BrowserSettings {
    let mut settings = BrowserSettings::default();
    settings.navigation.allow_all = false;
    settings
}

fn goto(frame: &BrowserFrame, url: &str) -> Result<Option<Response>, BrowserError> {
    let factory = frame.context().unwrap().window_factory();
    smol::block_on(BrowserFrameUtility::goto(factory.as_ref(), frame, url, GotoOptions::default()))
}

fn record_unload(frame: &BrowserFrame, name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) {
    let log = log.clone();
    frame.window().unwrap().add_unload_listener(move || log.borrow_mut().push(name));
}

// ============================================================================
// COMMIT
// ============================================================================

#[test]
fn test_goto_commits_document() {
    let fetcher = MockFetcher::new();
    fetcher.route("https://a.test/", 200, "<html><title>Hello</title></html>");
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();

    let response = smol::block_on(page.goto("https://a.test/", GotoOptions::default()))
        .unwrap()
        .unwrap();
    assert!(response.ok());

    let frame = page.main_frame().unwrap();
    assert_eq!(frame.location().unwrap().as_str(), "https://a.test/");
    assert_eq!(frame.content().as_deref(), Some("<html><title>Hello</title></html>"));

    let window = frame.window().unwrap();
    assert_eq!(window.document().title.as_deref(), Some("Hello"));
    assert_eq!(window.tasks().count(), 0);
    assert!(page.console().entries().is_empty());
}

#[test]
fn test_relative_navigation_and_referrer() {
    let fetcher = MockFetcher::new();
    fetcher.route("https://a.test/dir/", 200, "").route("https://a.test/dir/next", 200, "next");
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let frame = browser.new_page().unwrap().main_frame().unwrap();

    goto(&frame, "https://a.test/dir/").unwrap();
    let factory = frame.context().unwrap().window_factory();
    let options = GotoOptions::default().with_referrer(frame.location().unwrap());
    smol::block_on(BrowserFrameUtility::goto(factory.as_ref(), &frame, "next", options)).unwrap();

    assert_eq!(fetcher.requested(), ["https://a.test/dir/", "https://a.test/dir/next"]);
    let last = fetcher.requests.borrow().last().cloned().unwrap();
    assert_eq!(last.referrer.unwrap().as_str(), "https://a.test/dir/");
    assert_eq!(frame.content().as_deref(), Some("next"));
}

#[test]
fn test_error_status_logs_console_line() {
    let fetcher = MockFetcher::new();
    fetcher.route("https://a.test/missing", 404, "nope");
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();

    let response = smol::block_on(page.goto("https://a.test/missing", GotoOptions::default()))
        .unwrap()
        .unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(
        page.console().lines(ConsoleLevel::Error),
        ["GET https://a.test/missing 404 (Not Found)"]
    );
    assert_eq!(page.main_frame().unwrap().content().as_deref(), Some("nope"));
}

#[test]
fn test_error_status_logs_navigation_target() {
    let fetcher = MockFetcher::new();
    let moved = Response::new(Url::parse("https://a.test/new").unwrap(), 404).with_body("gone");
    fetcher.route_with("https://a.test/old", moved);
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();

    let response = smol::block_on(page.goto("https://a.test/old", GotoOptions::default()))
        .unwrap()
        .unwrap();
    assert_eq!(response.url.as_str(), "https://a.test/new");
    assert_eq!(
        page.console().lines(ConsoleLevel::Error),
        ["GET https://a.test/old 404 (Not Found)"]
    );
}

#[test]
fn test_fetch_failure_leaves_empty_window() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let frame = browser.new_page().unwrap().main_frame().unwrap();
    let before = frame.window().unwrap();

    let err = goto(&frame, "https://down.test/").unwrap_err();
    assert!(matches!(err, BrowserError::Net(NetError::Network(_))));

    let window = frame.window().unwrap();
    assert!(before.is_closed());
    assert_ne!(window.id(), before.id());
    assert_eq!(window.location().as_str(), "https://down.test/");
    assert!(frame.content().is_none());
    assert_eq!(window.tasks().count(), 0);
}

#[test]
fn test_invalid_url() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let frame = browser.new_page().unwrap().main_frame().unwrap();

    let err = goto(&frame, "relative/path").unwrap_err();
    assert_eq!(err.to_string(), "Failed to construct 'URL': Invalid URL: relative/path");
    assert!(fetcher.requested().is_empty());
}

// ============================================================================
// SPECIAL SCHEMES
// ============================================================================

#[test]
fn test_about_blank_replaces_window_without_fetch() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let frame = browser.new_page().unwrap().main_frame().unwrap();
    let before = frame.window().unwrap();

    assert!(goto(&frame, "about:blank").unwrap().is_none());
    assert!(before.is_closed());
    assert_ne!(frame.window().unwrap().id(), before.id());
    assert!(fetcher.requested().is_empty());
}

#[test]
fn test_javascript_url_runs_in_current_window() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();
    let frame = page.main_frame().unwrap();
    let window = frame.window().unwrap();

    assert!(goto(&frame, "javascript:console.log('hi%20there')").unwrap().is_none());
    assert_eq!(page.console().lines(ConsoleLevel::Log), ["hi there"]);
    assert_eq!(frame.window().unwrap().id(), window.id());
    assert!(!window.is_closed());
}

#[test]
fn test_javascript_url_error_capture() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();
    let frame = page.main_frame().unwrap();

    assert!(goto(&frame, "javascript:throw new Error('boom')").unwrap().is_none());
    let errors = page.console().lines(ConsoleLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("boom"));

    let mut settings = BrowserSettings::default();
    settings.disable_error_capturing = true;
    let browser = browser_with(settings, &fetcher);
    let frame = browser.new_page().unwrap().main_frame().unwrap();
    let err = goto(&frame, "javascript:throw new Error('boom')").unwrap_err();
    assert!(matches!(err, BrowserError::Script(_)));
}

#[test]
fn test_javascript_url_disabled() {
    let mut settings = BrowserSettings::default();
    settings.disable_javascript_evaluation = true;
    let fetcher = MockFetcher::new();
    let browser = browser_with(settings, &fetcher);
    let page = browser.new_page().unwrap();

    assert!(goto(&page.main_frame().unwrap(), "javascript:console.log(1)").unwrap().is_none());
    assert!(page.console().entries().is_empty());
}

// ============================================================================
// POLICY
// ============================================================================

#[test]
fn test_refused_navigation_sets_url() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(restrictive(), &fetcher);
    let frame = browser.new_page().unwrap().main_frame().unwrap();
    let window = frame.window().unwrap();

    assert!(goto(&frame, "https://a.test/").unwrap().is_none());
    assert_eq!(frame.window().unwrap().id(), window.id());
    assert_eq!(window.location().as_str(), "https://a.test/");
    assert!(fetcher.requested().is_empty());
}

#[test]
fn test_refused_navigation_without_fallback() {
    let mut settings = restrictive();
    settings.navigation.disable_fallback_to_set_url = true;
    let fetcher = MockFetcher::new();
    let browser = browser_with(settings, &fetcher);
    let frame = browser.new_page().unwrap().main_frame().unwrap();

    assert!(goto(&frame, "https://a.test/").unwrap().is_none());
    assert_eq!(frame.location().unwrap().as_str(), "about:blank");
}

#[test]
fn test_opened_pages_follow_same_origin_rule() {
    let mut settings = restrictive();
    settings.navigation.same_origin_only = true;
    let fetcher = MockFetcher::new();
    fetcher
        .route("https://a.test/", 200, "opener")
        .route("https://a.test/popup", 200, "popup")
        .route("https://b.test/", 200, "other");
    let browser = browser_with(settings, &fetcher);
    let opener = browser.new_page().unwrap().main_frame().unwrap();
    opener.set_opener(Some(&opener));
    goto(&opener, "https://a.test/").unwrap();

    let popup = smol::block_on(BrowserFrameUtility::open_page(&opener, "/popup")).unwrap();
    let frame = popup.main_frame().unwrap();
    assert!(frame.opener().unwrap().ptr_eq(&opener));
    assert_eq!(frame.content().as_deref(), Some("popup"));

    let last = fetcher.requests.borrow().last().cloned().unwrap();
    assert_eq!(last.referrer.unwrap().as_str(), "https://a.test/");

    assert!(!BrowserFrameUtility::is_navigation_allowed(&frame, &Url::parse("https://b.test/").unwrap()));
    assert!(goto(&frame, "https://b.test/").unwrap().is_none());
    assert_eq!(frame.content().as_deref(), Some("popup"));
}

#[test]
fn test_child_frame_navigation_disabled() {
    let mut settings = restrictive();
    settings.navigation.disable_child_frame_navigation = true;
    let fetcher = MockFetcher::new();
    let browser = browser_with(settings, &fetcher);
    let main = browser.new_page().unwrap().main_frame().unwrap();
    main.set_opener(Some(&main));
    let child = BrowserFrameUtility::new_frame(&main).unwrap();
    child.set_opener(Some(&main));

    let to = Url::parse("https://a.test/").unwrap();
    assert!(BrowserFrameUtility::is_navigation_allowed(&main, &to));
    assert!(!BrowserFrameUtility::is_navigation_allowed(&child, &to));
}

#[test]
fn test_detached_main_frame_never_navigates() {
    let fetcher = MockFetcher::new();
    fetcher.route("https://a.test/", 200, "body");
    let browser = Browser::builder()
        .with_fetcher(fetcher.clone())
        .detached()
        .build()
        .unwrap();
    let page = browser.new_page().unwrap();
    let frame = page.main_frame().unwrap();

    assert!(goto(&frame, "https://a.test/").unwrap().is_none());
    assert!(fetcher.requested().is_empty());
    assert_eq!(frame.location().unwrap().as_str(), "https://a.test/");

    let result = BrowserFrameUtility::evaluate(&frame, "location.hostname").unwrap();
    assert_eq!(result.as_str(), Some("a.test"));
}

// ============================================================================
// FRAME OPTIONS
// ============================================================================

fn framed(fetcher: &Rc<MockFetcher>, parent_url: &str) -> (Browser, BrowserFrame, BrowserFrame) {
    fetcher.route(parent_url, 200, "<iframe></iframe>");
    let browser = browser_with(BrowserSettings::default(), fetcher);
    let main = browser.new_page().unwrap().main_frame().unwrap();
    goto(&main, parent_url).unwrap();
    let child = BrowserFrameUtility::new_frame(&main).unwrap();
    (browser, main, child)
}

#[test]
fn test_sameorigin_blocks_cross_origin_child() {
    let fetcher = MockFetcher::new();
    fetcher.route_with(
        "https://other.test/",
        Response::new(Url::parse("https://other.test/").unwrap(), 200)
            .with_header("X-Frame-Options", "SAMEORIGIN")
            .with_body("secret"),
    );
    let (_browser, _main, child) = framed(&fetcher, "https://parent.test/");

    let err = goto(&child, "https://other.test/").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Security error: Refused to display 'https://other.test/' in a frame because it set 'X-Frame-Options' to 'SAMEORIGIN'."
    );
    assert!(child.content().is_none());
    assert!(child.window().unwrap().document().is_empty());
    assert_eq!(child.window().unwrap().tasks().count(), 0);
}

#[test]
fn test_sameorigin_allows_same_origin_child() {
    let fetcher = MockFetcher::new();
    fetcher.route_with(
        "https://parent.test/inner",
        Response::new(Url::parse("https://parent.test/inner").unwrap(), 200)
            .with_header("X-Frame-Options", "sameorigin")
            .with_body("inner"),
    );
    let (_browser, _main, child) = framed(&fetcher, "https://parent.test/");

    goto(&child, "https://parent.test/inner").unwrap().unwrap();
    assert_eq!(child.content().as_deref(), Some("inner"));
}

#[test]
fn test_deny_blocks_and_main_frame_is_exempt() {
    let fetcher = MockFetcher::new();
    fetcher.route_with(
        "https://parent.test/deny",
        Response::new(Url::parse("https://parent.test/deny").unwrap(), 200)
            .with_header("X-Frame-Options", "deny")
            .with_body("denied"),
    );
    let (_browser, main, child) = framed(&fetcher, "https://parent.test/");

    assert!(matches!(goto(&child, "https://parent.test/deny"), Err(BrowserError::Security(_))));
    goto(&main, "https://parent.test/deny").unwrap().unwrap();
    assert_eq!(main.content().as_deref(), Some("denied"));
}

#[test]
fn test_sameorigin_exempt_for_opaque_parent() {
    let fetcher = MockFetcher::new();
    fetcher.route_with(
        "https://other.test/",
        Response::new(Url::parse("https://other.test/").unwrap(), 200).with_header("X-Frame-Options", "sameorigin"),
    );
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let main = browser.new_page().unwrap().main_frame().unwrap();
    let child = BrowserFrameUtility::new_frame(&main).unwrap();

    assert!(goto(&child, "https://other.test/").unwrap().is_some());
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_later_navigation_supersedes_earlier() {
    let fetcher = MockFetcher::delayed(Duration::from_millis(30));
    fetcher.route("https://a.test/first", 200, "first").route("https://a.test/second", 200, "second");
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();

    let (first, second) = smol::block_on(future::zip(
        page.goto("https://a.test/first", GotoOptions::default()),
        async {
            future::yield_now().await;
            page.goto("https://a.test/second", GotoOptions::default()).await
        },
    ));

    assert!(first.unwrap().is_none());
    assert_eq!(second.unwrap().unwrap().text(), "second");

    let frame = page.main_frame().unwrap();
    assert_eq!(frame.content().as_deref(), Some("second"));
    assert_eq!(frame.location().unwrap().as_str(), "https://a.test/second");
}

#[test]
fn test_timeout_aborts_fetch() {
    let fetcher = MockFetcher::delayed(Duration::from_secs(5));
    fetcher.route("https://slow.test/", 200, "late");
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let frame = browser.new_page().unwrap().main_frame().unwrap();
    let factory = frame.context().unwrap().window_factory();

    let options = GotoOptions::default().with_timeout(20);
    let err = smol::block_on(BrowserFrameUtility::goto(factory.as_ref(), &frame, "https://slow.test/", options))
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(frame.content().is_none());
    assert_eq!(frame.window().unwrap().tasks().count(), 0);
}

#[test]
fn test_wait_until_complete() {
    let fetcher = MockFetcher::delayed(Duration::from_millis(20));
    fetcher.route("https://a.test/", 200, "done");
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();
    let frame = page.main_frame().unwrap();

    let ex = smol::LocalExecutor::new();
    let navigation = ex.spawn({
        let page = page.clone();
        async move { page.goto("https://a.test/", GotoOptions::default()).await }
    });

    smol::block_on(ex.run(async {
        for _ in 0..100 {
            if frame.window().unwrap().tasks().count() > 0 {
                break;
            }
            future::yield_now().await;
        }
        BrowserFrameUtility::wait_until_complete(&frame).await;
        assert_eq!(frame.content().as_deref(), Some("done"));
        navigation.await.unwrap();
    }));
}

// ============================================================================
// TEARDOWN
// ============================================================================

#[test]
fn test_close_tears_down_children_first() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();
    let main = page.main_frame().unwrap();
    let a = BrowserFrameUtility::new_frame(&main).unwrap();
    let a1 = BrowserFrameUtility::new_frame(&a).unwrap();
    let b = BrowserFrameUtility::new_frame(&main).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    record_unload(&main, "main", &log);
    record_unload(&a, "a", &log);
    record_unload(&a1, "a1", &log);
    record_unload(&b, "b", &log);

    page.close();
    page.close();
    BrowserFrameUtility::close_frame(&main);

    assert_eq!(*log.borrow(), ["a1", "a", "b", "main"]);
    assert!(a.parent_frame().is_none());
    assert!(a1.page().is_none());
    assert!(main.window().is_none());
    assert!(browser.default_context().pages().is_empty());
}

#[test]
fn test_closing_child_detaches_from_parent() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let main = browser.new_page().unwrap().main_frame().unwrap();
    let child = BrowserFrameUtility::new_frame(&main).unwrap();

    BrowserFrameUtility::close_frame(&child);
    assert!(main.child_frames().is_empty());
    assert!(child.window().is_none());
    assert!(main.window().is_some());
}

#[test]
fn test_navigation_closes_child_frames() {
    let fetcher = MockFetcher::new();
    fetcher.route("https://a.test/", 200, "a");
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let main = browser.new_page().unwrap().main_frame().unwrap();
    let child = BrowserFrameUtility::new_frame(&main).unwrap();
    let child_window = child.window().unwrap();

    goto(&main, "https://a.test/").unwrap();
    assert!(child_window.is_closed());
    assert!(main.child_frames().is_empty());
}

#[test]
fn test_closed_frame_rejects_work() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let page = browser.new_page().unwrap();
    let main = page.main_frame().unwrap();
    page.close();

    assert!(matches!(BrowserFrameUtility::evaluate(&main, "1"), Err(BrowserError::Closed)));
    assert!(matches!(BrowserFrameUtility::new_frame(&main), Err(BrowserError::Closed)));
    assert!(matches!(goto(&main, "https://a.test/"), Err(BrowserError::Closed)));
}

#[test]
fn test_reusable_script_across_frames() {
    let fetcher = MockFetcher::new();
    let browser = browser_with(BrowserSettings::default(), &fetcher);
    let first = browser.new_page().unwrap().main_frame().unwrap();
    let second = browser.new_page().unwrap().main_frame().unwrap();
    first.window().unwrap().set_location(Url::parse("https://one.test/").unwrap());
    second.window().unwrap().set_location(Url::parse("https://two.test/").unwrap());

    let script = fos_headless::Script::new("location.hostname", "hostname.js");
    let a = BrowserFrameUtility::evaluate(&first, script.clone()).unwrap();
    let b = BrowserFrameUtility::evaluate(&second, script).unwrap();
    assert_eq!(a.as_str(), Some("one.test"));
    assert_eq!(b.as_str(), Some("two.test"));
}
