//! Console API
//!
//! Implements console.log, console.warn, console.error, etc. Output is handed
//! to a `ConsoleSink` so the embedder decides where it goes.

use std::fmt::Write;
use std::rc::Rc;

use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};

/// Console message level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl ConsoleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Debug => "debug",
        }
    }
}

/// Receiver for script console output
pub trait ConsoleSink {
    fn message(&self, level: ConsoleLevel, text: &str);
}

/// Sink that forwards to `tracing`
#[derive(Debug, Default)]
pub struct TracingSink;

impl ConsoleSink for TracingSink {
    fn message(&self, level: ConsoleLevel, text: &str) {
        match level {
            ConsoleLevel::Error => tracing::error!("[JS] {}", text),
            ConsoleLevel::Warn => tracing::warn!("[JS] {}", text),
            ConsoleLevel::Debug => tracing::debug!("[JS] {}", text),
            ConsoleLevel::Log | ConsoleLevel::Info => tracing::info!("[JS] {}", text),
        }
    }
}

/// Install console API into the global object
pub fn install_console(ctx: &Ctx, sink: Rc<dyn ConsoleSink>) -> Result<(), rquickjs::Error> {
    let console = Object::new(ctx.clone())?;

    for level in [
        ConsoleLevel::Log,
        ConsoleLevel::Info,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
        ConsoleLevel::Debug,
    ] {
        let sink = sink.clone();
        let function = Function::new(ctx.clone(), move |_ctx: Ctx, args: Rest<Value>| {
            sink.message(level, &join_values(&args.0));
            Ok::<(), rquickjs::Error>(())
        })?;
        console.set(level.as_str(), function)?;
    }

    ctx.globals().set("console", console)?;
    Ok(())
}

/// Space-separated rendering of console arguments
fn join_values(values: &[Value]) -> String {
    let mut output = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        format_value(&mut output, value);
    }
    output
}

/// Format a JavaScript value for logging
pub(crate) fn format_value(out: &mut String, value: &Value) {
    if value.is_undefined() {
        out.push_str("undefined");
    } else if value.is_null() {
        out.push_str("null");
    } else if let Some(b) = value.as_bool() {
        write!(out, "{}", b).ok();
    } else if let Some(n) = value.as_int() {
        write!(out, "{}", n).ok();
    } else if let Some(n) = value.as_float() {
        write!(out, "{}", n).ok();
    } else if let Some(s) = value.as_string() {
        if let Ok(s) = s.to_string() {
            out.push_str(&s);
        }
    } else if let Some(exception) = value.as_exception() {
        out.push_str(&exception.message().unwrap_or_else(|| "Error".into()));
    } else if value.is_array() {
        out.push_str("[Array]");
    } else if value.is_function() {
        out.push_str("[Function]");
    } else if value.is_object() {
        out.push_str("[Object]");
    } else {
        out.push_str("[unknown]");
    }
}
