//! Virtual Console
//!
//! Page console that buffers output for the embedder and mirrors it to
//! `tracing`.

use std::cell::RefCell;
use std::rc::Rc;

use fos_js::{ConsoleLevel, ConsoleSink};

/// Console a window writes to
pub trait Console {
    fn message(&self, level: ConsoleLevel, text: &str);

    fn log(&self, text: &str) {
        self.message(ConsoleLevel::Log, text);
    }

    fn warn(&self, text: &str) {
        self.message(ConsoleLevel::Warn, text);
    }

    fn error(&self, text: &str) {
        self.message(ConsoleLevel::Error, text);
    }
}

/// One buffered console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub text: String,
}

/// Buffering console
#[derive(Debug, Default)]
pub struct VirtualConsole {
    entries: RefCell<Vec<ConsoleEntry>>,
}

impl VirtualConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.entries.borrow().clone()
    }

    /// Text of every entry at `level`
    pub fn lines(&self, level: ConsoleLevel) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.level == level)
            .map(|entry| entry.text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl Console for VirtualConsole {
    fn message(&self, level: ConsoleLevel, text: &str) {
        match level {
            ConsoleLevel::Error => tracing::error!("[console] {}", text),
            ConsoleLevel::Warn => tracing::warn!("[console] {}", text),
            _ => tracing::debug!("[console] {}", text),
        }
        self.entries.borrow_mut().push(ConsoleEntry {
            level,
            text: text.to_string(),
        });
    }
}

/// Routes script console output into a `Console`
pub(crate) struct ScriptConsole(pub Rc<dyn Console>);

impl ConsoleSink for ScriptConsole {
    fn message(&self, level: ConsoleLevel, text: &str) {
        self.0.message(level, text);
    }
}
