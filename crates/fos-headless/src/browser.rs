//! Browser, Contexts, Pages and Frames
//!
//! Ownership runs downward: a browser owns its contexts, a context its pages,
//! a page its main frame, a frame its children and current window. Every
//! upward link (frame to page, page to context, window to frame) is weak.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use fos_net::{
    ClearOptions, CookieContainer, Fetcher, HttpClient, HttpFetcher, Request, Response, ResponseCache, SyncFetch,
};
use url::Url;

use crate::console::VirtualConsole;
use crate::error::BrowserError;
use crate::navigation::{BrowserFrameUtility, GotoOptions};
use crate::settings::BrowserSettings;
use crate::window::{DefaultWindowFactory, Window, WindowFactory, WindowOptions};

static NEXT_PAGE_ID: AtomicU64 = AtomicU64::new(1);

const ABOUT_BLANK: &str = "about:blank";

/// Page ID type
pub type PageId = u64;

pub(crate) fn about_blank() -> Result<Url, BrowserError> {
    Url::parse(ABOUT_BLANK).map_err(|_| BrowserError::UriMismatch(ABOUT_BLANK.into()))
}

/// Frame variant
///
/// Detached frames back the throwaway page used for isolated evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameKind {
    #[default]
    Normal,
    Detached,
}

// ============================================================================
// FRAME
// ============================================================================

#[derive(Debug)]
struct FrameInner {
    kind: FrameKind,
    page: RefCell<Weak<PageInner>>,
    parent: RefCell<Weak<FrameInner>>,
    children: RefCell<Vec<BrowserFrame>>,
    opener: RefCell<Weak<FrameInner>>,
    window: RefCell<Option<Rc<Window>>>,
    content: RefCell<Option<String>>,
}

/// A frame in a page's frame tree
#[derive(Debug, Clone)]
pub struct BrowserFrame {
    inner: Rc<FrameInner>,
}

/// Non-owning frame handle held by windows
#[derive(Debug, Clone, Default)]
pub(crate) struct WeakFrame(Weak<FrameInner>);

impl WeakFrame {
    pub fn upgrade(&self) -> Option<BrowserFrame> {
        self.0.upgrade().map(|inner| BrowserFrame { inner })
    }
}

impl BrowserFrame {
    fn new(kind: FrameKind, page: &BrowserPage, parent: Option<&BrowserFrame>) -> Self {
        Self {
            inner: Rc::new(FrameInner {
                kind,
                page: RefCell::new(Rc::downgrade(&page.inner)),
                parent: RefCell::new(parent.map(|p| Rc::downgrade(&p.inner)).unwrap_or_default()),
                children: RefCell::new(Vec::new()),
                opener: RefCell::new(Weak::new()),
                window: RefCell::new(None),
                content: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakFrame {
        WeakFrame(Rc::downgrade(&self.inner))
    }

    pub fn kind(&self) -> FrameKind {
        self.inner.kind
    }

    /// Same frame
    pub fn ptr_eq(&self, other: &BrowserFrame) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn page(&self) -> Option<BrowserPage> {
        self.inner.page.borrow().upgrade().map(|inner| BrowserPage { inner })
    }

    /// Context this frame belongs to
    pub fn context(&self) -> Result<BrowserContext, BrowserError> {
        self.page().and_then(|page| page.context()).ok_or(BrowserError::Closed)
    }

    pub fn parent_frame(&self) -> Option<BrowserFrame> {
        self.inner.parent.borrow().upgrade().map(|inner| BrowserFrame { inner })
    }

    pub fn child_frames(&self) -> Vec<BrowserFrame> {
        self.inner.children.borrow().clone()
    }

    /// Frame that opened this frame's page through `open_page`
    pub fn opener(&self) -> Option<BrowserFrame> {
        self.inner.opener.borrow().upgrade().map(|inner| BrowserFrame { inner })
    }

    pub fn set_opener(&self, opener: Option<&BrowserFrame>) {
        *self.inner.opener.borrow_mut() = opener.map(|o| Rc::downgrade(&o.inner)).unwrap_or_default();
    }

    /// Current window; `None` once the frame is closed
    pub fn window(&self) -> Option<Rc<Window>> {
        self.inner.window.borrow().clone()
    }

    /// Current window's location
    pub fn location(&self) -> Option<Url> {
        self.inner.window.borrow().as_ref().map(|window| window.location())
    }

    /// Last committed document source
    pub fn content(&self) -> Option<String> {
        self.inner.content.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.window.borrow().is_none()
    }

    /// Whether this is its page's main frame
    pub fn is_main_frame(&self) -> bool {
        self.parent_frame().is_none()
            && self
                .page()
                .and_then(|page| page.main_frame())
                .is_some_and(|main| main.ptr_eq(self))
    }

    /// `window` is still the frame's current window
    pub(crate) fn is_current_window(&self, window: &Rc<Window>) -> bool {
        self.inner
            .window
            .borrow()
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, window))
    }

    pub(crate) fn set_window(&self, window: Rc<Window>) {
        *self.inner.window.borrow_mut() = Some(window);
    }

    pub(crate) fn take_window(&self) -> Option<Rc<Window>> {
        self.inner.window.borrow_mut().take()
    }

    pub(crate) fn set_content(&self, content: Option<String>) {
        *self.inner.content.borrow_mut() = content;
    }

    pub(crate) fn push_child(&self, child: BrowserFrame) {
        self.inner.children.borrow_mut().push(child);
    }

    pub(crate) fn remove_child(&self, child: &BrowserFrame) {
        self.inner.children.borrow_mut().retain(|c| !c.ptr_eq(child));
    }

    pub(crate) fn take_children(&self) -> Vec<BrowserFrame> {
        std::mem::take(&mut *self.inner.children.borrow_mut())
    }

    /// Drop page, parent and opener links
    pub(crate) fn clear_links(&self) {
        *self.inner.page.borrow_mut() = Weak::new();
        *self.inner.parent.borrow_mut() = Weak::new();
        *self.inner.opener.borrow_mut() = Weak::new();
    }

    /// Create a child frame with a blank window
    pub(crate) fn new_child(&self) -> Result<BrowserFrame, BrowserError> {
        if self.is_closed() {
            return Err(BrowserError::Closed);
        }
        let page = self.page().ok_or(BrowserError::Closed)?;
        let context = page.context().ok_or(BrowserError::Closed)?;

        let child = BrowserFrame::new(self.kind(), &page, Some(self));
        child.set_window(context.blank_window(&page, &child)?);
        self.push_child(child.clone());
        Ok(child)
    }
}

// ============================================================================
// PAGE
// ============================================================================

#[derive(Debug)]
struct PageInner {
    id: PageId,
    context: Weak<ContextInner>,
    main_frame: RefCell<Option<BrowserFrame>>,
    console: Rc<VirtualConsole>,
}

/// A top-level page
#[derive(Debug, Clone)]
pub struct BrowserPage {
    inner: Rc<PageInner>,
}

impl BrowserPage {
    pub fn id(&self) -> PageId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &BrowserPage) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn context(&self) -> Option<BrowserContext> {
        self.inner.context.upgrade().map(|inner| BrowserContext { inner })
    }

    pub fn main_frame(&self) -> Option<BrowserFrame> {
        self.inner.main_frame.borrow().clone()
    }

    pub fn console(&self) -> Rc<VirtualConsole> {
        self.inner.console.clone()
    }

    /// Navigate the main frame
    pub async fn goto(&self, url: &str, options: GotoOptions) -> Result<Option<Response>, BrowserError> {
        let frame = self.main_frame().ok_or(BrowserError::Closed)?;
        let factory = self.context().ok_or(BrowserError::Closed)?.window_factory();
        BrowserFrameUtility::goto(factory.as_ref(), &frame, url, options).await
    }

    /// Close the page and its frame tree
    pub fn close(&self) {
        let frame = self.inner.main_frame.borrow_mut().take();
        if let Some(frame) = frame {
            BrowserFrameUtility::close_frame(&frame);
        }
        if let Some(context) = self.context() {
            context.inner.pages.borrow_mut().retain(|page| !page.ptr_eq(self));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.main_frame.borrow().is_none()
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

struct ContextInner {
    browser: Weak<BrowserInner>,
    settings: Rc<BrowserSettings>,
    is_default: bool,
    kind: FrameKind,
    response_cache: ResponseCache,
    cookies: CookieContainer,
    fetcher: Rc<dyn Fetcher>,
    window_factory: Rc<dyn WindowFactory>,
    pages: RefCell<Vec<BrowserPage>>,
}

impl std::fmt::Debug for ContextInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserContext")
            .field("is_default", &self.is_default)
            .field("kind", &self.kind)
            .field("pages", &self.pages.borrow().len())
            .finish()
    }
}

/// A browsing context: pages sharing one cache and cookie store
#[derive(Debug, Clone)]
pub struct BrowserContext {
    inner: Rc<ContextInner>,
}

impl BrowserContext {
    fn new(browser: &Weak<BrowserInner>, setup: &ContextSetup, is_default: bool) -> Self {
        let response_cache = ResponseCache::new();
        let cookies = CookieContainer::new();

        let fetcher: Rc<dyn Fetcher> = match &setup.transport {
            Transport::Shared(fetcher) => fetcher.clone(),
            Transport::Http(client) => {
                let fetcher = HttpFetcher::new(client.clone()).with_cookies(cookies.clone());
                Rc::new(if setup.settings.fetch.disable_cache {
                    fetcher.without_cache()
                } else {
                    fetcher.with_cache(response_cache.clone())
                })
            }
        };

        Self {
            inner: Rc::new(ContextInner {
                browser: browser.clone(),
                settings: setup.settings.clone(),
                is_default,
                kind: setup.kind,
                response_cache,
                cookies,
                fetcher,
                window_factory: setup.window_factory.clone(),
                pages: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn browser(&self) -> Option<Browser> {
        self.inner.browser.upgrade().map(|inner| Browser { inner })
    }

    pub fn settings(&self) -> &BrowserSettings {
        &self.inner.settings
    }

    pub fn is_default(&self) -> bool {
        self.inner.is_default
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.inner.response_cache
    }

    pub fn cookie_container(&self) -> &CookieContainer {
        &self.inner.cookies
    }

    pub fn fetcher(&self) -> Rc<dyn Fetcher> {
        self.inner.fetcher.clone()
    }

    pub fn window_factory(&self) -> Rc<dyn WindowFactory> {
        self.inner.window_factory.clone()
    }

    /// Open pages, oldest first
    pub fn pages(&self) -> Vec<BrowserPage> {
        self.inner.pages.borrow().clone()
    }

    /// Open a blank page
    pub fn new_page(&self) -> Result<BrowserPage, BrowserError> {
        let page = BrowserPage {
            inner: Rc::new(PageInner {
                id: NEXT_PAGE_ID.fetch_add(1, Ordering::Relaxed),
                context: Rc::downgrade(&self.inner),
                main_frame: RefCell::new(None),
                console: Rc::new(VirtualConsole::new()),
            }),
        };

        let frame = BrowserFrame::new(self.inner.kind, &page, None);
        frame.set_window(self.blank_window(&page, &frame)?);
        *page.inner.main_frame.borrow_mut() = Some(frame);

        self.inner.pages.borrow_mut().push(page.clone());
        tracing::debug!("Page {} opened", page.id());
        Ok(page)
    }

    fn blank_window(&self, page: &BrowserPage, frame: &BrowserFrame) -> Result<Rc<Window>, BrowserError> {
        Ok(self.inner.window_factory.construct(WindowOptions {
            owning_frame: frame,
            console: page.console(),
            url: about_blank()?,
        }))
    }

    /// Synchronous fetch bound to this context's cache and cookies
    pub fn sync_fetch(&self, request: Request) -> SyncFetch {
        let fetch = &self.inner.settings.fetch;
        SyncFetch::new(
            request,
            self.inner.response_cache.clone(),
            self.inner.cookies.clone(),
            fetch.sync_worker.clone(),
        )
        .with_cache_disabled(fetch.disable_cache)
    }

    /// Close every page; a non-default context also drops its cache
    pub fn close(&self) {
        for page in self.pages() {
            page.close();
        }
        if !self.inner.is_default {
            self.inner.response_cache.clear(ClearOptions::default());
            self.inner.cookies.clear();
        }
    }

    pub fn ptr_eq(&self, other: &BrowserContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// BROWSER
// ============================================================================

/// How contexts reach the network
enum Transport {
    /// One embedder-supplied fetcher for every context
    Shared(Rc<dyn Fetcher>),
    /// Per-context `HttpFetcher` over the context's cache and cookies
    Http(HttpClient),
}

struct ContextSetup {
    settings: Rc<BrowserSettings>,
    kind: FrameKind,
    transport: Transport,
    window_factory: Rc<dyn WindowFactory>,
}

struct BrowserInner {
    setup: ContextSetup,
    default_context: BrowserContext,
    contexts: RefCell<Vec<BrowserContext>>,
}

/// Headless browser
#[derive(Clone)]
pub struct Browser {
    inner: Rc<BrowserInner>,
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("kind", &self.inner.setup.kind)
            .field("contexts", &(self.inner.contexts.borrow().len() + 1))
            .finish()
    }
}

/// Browser builder
pub struct BrowserBuilder {
    settings: BrowserSettings,
    kind: FrameKind,
    fetcher: Option<Rc<dyn Fetcher>>,
    window_factory: Rc<dyn WindowFactory>,
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self {
            settings: BrowserSettings::default(),
            kind: FrameKind::Normal,
            fetcher: None,
            window_factory: Rc::new(DefaultWindowFactory),
        }
    }
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: BrowserSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use `fetcher` for every context instead of the HTTP transport
    pub fn with_fetcher(mut self, fetcher: Rc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_window_factory(mut self, factory: Rc<dyn WindowFactory>) -> Self {
        self.window_factory = factory;
        self
    }

    /// Frames of this browser are `FrameKind::Detached`
    pub fn detached(mut self) -> Self {
        self.kind = FrameKind::Detached;
        self
    }

    pub fn build(self) -> Result<Browser, BrowserError> {
        let transport = match self.fetcher {
            Some(fetcher) => Transport::Shared(fetcher),
            None => Transport::Http(
                HttpClient::builder()
                    .user_agent(&self.settings.user_agent)
                    .request_timeout(Duration::from_millis(self.settings.navigation.timeout_ms))
                    .build()?,
            ),
        };

        let setup = ContextSetup {
            settings: Rc::new(self.settings),
            kind: self.kind,
            transport,
            window_factory: self.window_factory,
        };

        let inner = Rc::new_cyclic(|browser| BrowserInner {
            default_context: BrowserContext::new(browser, &setup, true),
            setup,
            contexts: RefCell::new(Vec::new()),
        });

        tracing::info!("Browser started ({:?})", inner.setup.kind);
        Ok(Browser { inner })
    }
}

impl Browser {
    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    pub fn new(settings: BrowserSettings) -> Result<Self, BrowserError> {
        Self::builder().with_settings(settings).build()
    }

    /// Browser whose frames are detached, for isolated evaluation
    pub fn new_detached(settings: BrowserSettings) -> Result<Self, BrowserError> {
        Self::builder().with_settings(settings).detached().build()
    }

    pub fn settings(&self) -> &BrowserSettings {
        &self.inner.setup.settings
    }

    pub fn kind(&self) -> FrameKind {
        self.inner.setup.kind
    }

    pub fn default_context(&self) -> BrowserContext {
        self.inner.default_context.clone()
    }

    /// Open an isolated context with its own cache and cookies
    pub fn new_context(&self) -> BrowserContext {
        let context = BrowserContext::new(&Rc::downgrade(&self.inner), &self.inner.setup, false);
        self.inner.contexts.borrow_mut().push(context.clone());
        context
    }

    /// Every context, default first
    pub fn contexts(&self) -> Vec<BrowserContext> {
        let mut contexts = vec![self.default_context()];
        contexts.extend(self.inner.contexts.borrow().iter().cloned());
        contexts
    }

    /// Open a page in the default context
    pub fn new_page(&self) -> Result<BrowserPage, BrowserError> {
        self.inner.default_context.new_page()
    }

    /// Close every context; extra contexts are discarded
    pub fn close(&self) {
        let extra = std::mem::take(&mut *self.inner.contexts.borrow_mut());
        for context in extra {
            context.close();
        }
        self.inner.default_context.close();
    }
}
