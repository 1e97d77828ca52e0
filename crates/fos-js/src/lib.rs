//! fOS JavaScript Runtime
//!
//! QuickJS-based script evaluation for headless windows.
//!
//! Features:
//! - One QuickJS runtime + context per window (`ScriptContext`)
//! - Reusable compiled-by-source units (`Script`)
//! - Console API routed to an embedder-supplied `ConsoleSink`
//! - `window`, `self` and `location` globals

mod console;
mod context;
mod script;

pub use console::{ConsoleLevel, ConsoleSink, TracingSink};
pub use context::{ContextOptions, ScriptContext};
pub use script::Script;

use rquickjs::{Ctx, Value};

/// Evaluate JavaScript code in a throwaway context
pub fn eval(code: &str) -> Result<JsValue, JsError> {
    ScriptContext::new(ContextOptions::default())?.eval(code)
}

/// JavaScript value
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object,
    Array,
    Function,
}

impl JsValue {
    pub(crate) fn from_value(value: &Value) -> Self {
        if value.is_undefined() {
            JsValue::Undefined
        } else if value.is_null() {
            JsValue::Null
        } else if let Some(b) = value.as_bool() {
            JsValue::Bool(b)
        } else if let Some(n) = value.as_int() {
            JsValue::Number(n as f64)
        } else if let Some(n) = value.as_float() {
            JsValue::Number(n)
        } else if let Some(s) = value.as_string() {
            JsValue::String(s.to_string().unwrap_or_default())
        } else if value.is_array() {
            JsValue::Array
        } else if value.is_function() {
            JsValue::Function
        } else {
            JsValue::Object
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// JavaScript error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JsError {
    #[error("JavaScript error: {0}")]
    Runtime(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Type error: {0}")]
    TypeError(String),
}

impl JsError {
    /// Convert an rquickjs error, pulling the pending exception out of `ctx`
    pub(crate) fn from_quickjs(ctx: &Ctx, error: rquickjs::Error) -> Self {
        if !matches!(error, rquickjs::Error::Exception) {
            return JsError::Runtime(error.to_string());
        }

        let thrown = ctx.catch();
        let Some(exception) = thrown.as_exception() else {
            let mut text = String::new();
            console::format_value(&mut text, &thrown);
            return JsError::Runtime(format!("Uncaught {text}"));
        };

        let message = exception.message().unwrap_or_default();
        let name: Option<String> = exception.as_object().get("name").ok();
        match name.as_deref() {
            Some("SyntaxError") => JsError::Syntax(message),
            Some("TypeError") => JsError::TypeError(message),
            Some(name) => JsError::Runtime(format!("{name}: {message}")),
            None => JsError::Runtime(message),
        }
    }

    /// Message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            JsError::Runtime(m) | JsError::Syntax(m) | JsError::TypeError(m) => m,
        }
    }

    /// Same error with `filename` leading the message
    pub fn in_file(self, filename: &str) -> Self {
        match self {
            JsError::Runtime(m) => JsError::Runtime(format!("{filename}: {m}")),
            JsError::Syntax(m) => JsError::Syntax(format!("{filename}: {m}")),
            JsError::TypeError(m) => JsError::TypeError(format!("{filename}: {m}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_simple() {
        assert_eq!(eval("1 + 1").unwrap(), JsValue::Number(2.0));
        assert_eq!(eval("'a' + 'b'").unwrap().as_str(), Some("ab"));
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(eval("let = ;"), Err(JsError::Syntax(_))));
        assert!(matches!(eval("null.x"), Err(JsError::TypeError(_))));

        let err = eval("undefinedName").unwrap_err();
        assert!(err.message().contains("ReferenceError"));

        let err = eval("throw 'plain'").unwrap_err();
        assert_eq!(err, JsError::Runtime("Uncaught plain".into()));
    }
}
