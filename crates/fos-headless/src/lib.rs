//! fOS Headless - Browser Emulation Core
//!
//! Frames, windows and navigation on top of fos-net and fos-js.
//!
//! # Features
//! - Frame tree with parent, child and opener links
//! - Per-navigation windows with lazily created script contexts
//! - Navigation policy, timeouts and `X-Frame-Options` enforcement
//! - Per-context response cache, cookie store and synchronous fetch

pub mod browser;
pub mod console;
pub mod document;
pub mod error;
pub mod navigation;
pub mod settings;
pub mod task_manager;
pub mod window;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use browser::{Browser, BrowserBuilder, BrowserContext, BrowserFrame, BrowserPage, FrameKind, PageId};
pub use console::{Console, ConsoleEntry, VirtualConsole};
pub use document::Document;
pub use error::BrowserError;
pub use navigation::{BrowserFrameUtility, GotoOptions};
pub use settings::{BrowserSettings, FetchSettings, NavigationSettings};
pub use task_manager::{AsyncTaskManager, TaskId};
pub use window::{DefaultWindowFactory, Window, WindowFactory, WindowId, WindowOptions};

pub use fos_js::{ConsoleLevel, JsError, JsValue, Script};
