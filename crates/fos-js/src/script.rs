//! Script Units
//!
//! Source text paired with a file name, runnable in any number of contexts.

use std::rc::Rc;

use crate::{JsError, JsValue, ScriptContext};

/// Reusable script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    source: Rc<str>,
    filename: Rc<str>,
}

impl Script {
    pub fn new(source: &str, filename: &str) -> Self {
        Self {
            source: Rc::from(source),
            filename: Rc::from(filename),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Run in `context`; the script itself is left untouched
    ///
    /// Errors are prefixed with the script's file name.
    pub fn run_in_context(&self, context: &ScriptContext) -> Result<JsValue, JsError> {
        tracing::debug!("Running script {}", self.filename);
        context.eval(&self.source).map_err(|err| err.in_file(&self.filename))
    }
}

impl From<&str> for Script {
    fn from(source: &str) -> Self {
        Script::new(source, "anonymous")
    }
}
