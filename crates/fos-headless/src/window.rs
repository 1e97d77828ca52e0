//! Window
//!
//! The per-navigation global object of a frame. Navigation replaces a frame's
//! window wholesale; a closed window never comes back.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use fos_js::{ContextOptions, JsValue, Script, ScriptContext};
use url::Url;

use crate::browser::{BrowserFrame, WeakFrame};
use crate::console::{Console, ScriptConsole};
use crate::document::Document;
use crate::error::BrowserError;
use crate::task_manager::AsyncTaskManager;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// Window ID type
pub type WindowId = u64;

/// Inputs for `WindowFactory::construct`
pub struct WindowOptions<'a> {
    pub owning_frame: &'a BrowserFrame,
    pub console: Rc<dyn Console>,
    pub url: Url,
}

/// Builds the window installed on each navigation
pub trait WindowFactory {
    fn construct(&self, options: WindowOptions<'_>) -> Rc<Window>;
}

/// Factory producing plain `Window`s
#[derive(Debug, Default)]
pub struct DefaultWindowFactory;

impl WindowFactory for DefaultWindowFactory {
    fn construct(&self, options: WindowOptions<'_>) -> Rc<Window> {
        Rc::new(Window::new(options))
    }
}

type UnloadListener = Box<dyn FnOnce()>;

/// A browsing window
pub struct Window {
    id: WindowId,
    frame: WeakFrame,
    location: RefCell<Url>,
    closed: Cell<bool>,
    document: RefCell<Document>,
    console: Rc<dyn Console>,
    tasks: AsyncTaskManager,
    script: RefCell<Option<ScriptContext>>,
    unload_listeners: RefCell<Vec<UnloadListener>>,
}

impl Window {
    pub fn new(options: WindowOptions<'_>) -> Self {
        let id = NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Window {} created for {}", id, options.url);

        Self {
            id,
            frame: options.owning_frame.downgrade(),
            document: RefCell::new(Document::new(options.url.clone())),
            location: RefCell::new(options.url),
            closed: Cell::new(false),
            console: options.console,
            tasks: AsyncTaskManager::new(),
            script: RefCell::new(None),
            unload_listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Owning frame, while it is alive
    pub fn frame(&self) -> Option<BrowserFrame> {
        self.frame.upgrade()
    }

    pub fn location(&self) -> Url {
        self.location.borrow().clone()
    }

    /// Update `location` without loading anything
    pub fn set_location(&self, url: Url) {
        if let Some(script) = self.script.borrow().as_ref() {
            if let Err(err) = script.set_location(&url) {
                tracing::debug!("Failed to update script location: {}", err);
            }
        }
        *self.location.borrow_mut() = url;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub fn document(&self) -> Ref<'_, Document> {
        self.document.borrow()
    }

    /// Commit raw HTML as the document content
    pub fn write_document(&self, html: String) {
        let mut document = self.document.borrow_mut();
        document.url = self.location();
        document.write(html);
    }

    pub fn console(&self) -> &Rc<dyn Console> {
        &self.console
    }

    pub fn tasks(&self) -> &AsyncTaskManager {
        &self.tasks
    }

    /// Run `listener` when the window closes
    pub fn add_unload_listener(&self, listener: impl FnOnce() + 'static) {
        if self.is_closed() {
            return;
        }
        self.unload_listeners.borrow_mut().push(Box::new(listener));
    }

    /// Run `script` in this window's script context
    pub fn evaluate(&self, script: &Script) -> Result<JsValue, BrowserError> {
        if self.is_closed() {
            return Err(BrowserError::Closed);
        }

        let mut slot = self.script.borrow_mut();
        if slot.is_none() {
            let options = ContextOptions::default()
                .with_url(self.location())
                .with_console(Rc::new(ScriptConsole(self.console.clone())));
            *slot = Some(ScriptContext::new(options)?);
        }
        let Some(context) = slot.as_ref() else {
            return Err(BrowserError::Closed);
        };

        Ok(script.run_in_context(context)?)
    }

    /// Close the window: listeners run, tasks are destroyed, script state dropped
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        tracing::debug!("Window {} closed", self.id);

        let listeners = std::mem::take(&mut *self.unload_listeners.borrow_mut());
        for listener in listeners {
            listener();
        }

        self.tasks.destroy();
        self.script.borrow_mut().take();
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("location", &self.location.borrow().as_str())
            .field("closed", &self.closed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Browser;
    use crate::settings::BrowserSettings;
    use fos_js::ConsoleLevel;

    fn main_window() -> (Browser, Rc<Window>) {
        let browser = Browser::new(BrowserSettings::default()).unwrap();
        let page = browser.new_page().unwrap();
        let window = page.main_frame().unwrap().window().unwrap();
        (browser, window)
    }

    #[test]
    fn test_blank_window() {
        let (_browser, window) = main_window();
        assert_eq!(window.location().as_str(), "about:blank");
        assert!(!window.is_closed());
        assert!(window.document().is_empty());
        assert!(window.frame().is_some());
    }

    #[test]
    fn test_evaluate_with_console() {
        let (browser, window) = main_window();
        window.set_location(Url::parse("https://x.test/page").unwrap());

        let result = window.evaluate(&Script::from("console.error('bad'); location.hostname")).unwrap();
        assert_eq!(result.as_str(), Some("x.test"));

        let page = browser.default_context().pages()[0].clone();
        assert_eq!(page.console().lines(ConsoleLevel::Error), ["bad"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_browser, window) = main_window();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        window.add_unload_listener(move || counter.set(counter.get() + 1));
        window.tasks().start_task();

        window.close();
        window.close();
        assert_eq!(calls.get(), 1);
        assert!(window.tasks().is_destroyed());
        assert!(matches!(window.evaluate(&Script::from("1")), Err(BrowserError::Closed)));
    }
}
