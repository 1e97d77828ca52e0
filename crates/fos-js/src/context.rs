//! Script Context
//!
//! A QuickJS runtime and context owned by one window.

use std::rc::Rc;

use rquickjs::{Context, Ctx, Object, Runtime, Value};
use url::Url;

use crate::console::{self, ConsoleSink, TracingSink};
use crate::{JsError, JsValue};

/// Default heap limit per context
const MEMORY_LIMIT: usize = 32 * 1024 * 1024;

/// Options for a new `ScriptContext`
#[derive(Clone)]
pub struct ContextOptions {
    /// Initial `location.href`
    pub url: Option<Url>,
    /// Console output receiver
    pub console: Rc<dyn ConsoleSink>,
    pub memory_limit: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            url: None,
            console: Rc::new(TracingSink),
            memory_limit: MEMORY_LIMIT,
        }
    }
}

impl ContextOptions {
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_console(mut self, console: Rc<dyn ConsoleSink>) -> Self {
        self.console = console;
        self
    }
}

/// JavaScript context with the window globals installed
pub struct ScriptContext {
    context: Context,
    runtime: Runtime,
}

impl ScriptContext {
    pub fn new(options: ContextOptions) -> Result<Self, JsError> {
        let runtime = Runtime::new().map_err(|e| JsError::Runtime(e.to_string()))?;
        runtime.set_memory_limit(options.memory_limit);

        let context = Context::full(&runtime).map_err(|e| JsError::Runtime(e.to_string()))?;

        context.with(|ctx| {
            install_globals(&ctx, &options).map_err(|e| JsError::Runtime(e.to_string()))
        })?;

        Ok(Self { context, runtime })
    }

    /// Evaluate JavaScript code
    pub fn eval(&self, code: &str) -> Result<JsValue, JsError> {
        let result = self.context.with(|ctx| {
            let value: Value = ctx.eval(code).map_err(|e| JsError::from_quickjs(&ctx, e))?;
            Ok::<_, JsError>(JsValue::from_value(&value))
        });
        self.run_pending_jobs();
        result
    }

    /// Execute JavaScript (ignore result)
    pub fn exec(&self, code: &str) -> Result<(), JsError> {
        self.eval(code).map(|_| ())
    }

    /// Point `location` at `url`
    pub fn set_location(&self, url: &Url) -> Result<(), JsError> {
        self.context.with(|ctx| {
            let location = location_object(&ctx, Some(url)).map_err(|e| JsError::Runtime(e.to_string()))?;
            ctx.globals()
                .set("location", location)
                .map_err(|e| JsError::Runtime(e.to_string()))
        })
    }

    /// Drain queued promise jobs
    fn run_pending_jobs(&self) {
        while self.runtime.is_job_pending() {
            if self.runtime.execute_pending_job().is_err() {
                tracing::debug!("Pending script job threw");
            }
        }
    }
}

fn install_globals(ctx: &Ctx, options: &ContextOptions) -> Result<(), rquickjs::Error> {
    console::install_console(ctx, options.console.clone())?;

    let globals = ctx.globals();
    globals.set("window", globals.clone())?;
    globals.set("self", globals.clone())?;
    globals.set("location", location_object(ctx, options.url.as_ref())?)?;
    Ok(())
}

fn location_object<'js>(ctx: &Ctx<'js>, url: Option<&Url>) -> Result<Object<'js>, rquickjs::Error> {
    let location = Object::new(ctx.clone())?;
    let Some(url) = url else {
        location.set("href", "about:blank")?;
        location.set("protocol", "about:")?;
        location.set("origin", "null")?;
        return Ok(location);
    };

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    };

    location.set("href", url.as_str())?;
    location.set("protocol", format!("{}:", url.scheme()))?;
    location.set("host", host)?;
    location.set("hostname", url.host_str().unwrap_or(""))?;
    location.set("port", url.port().map(|p| p.to_string()).unwrap_or_default())?;
    location.set("pathname", url.path())?;
    location.set("search", url.query().map(|q| format!("?{q}")).unwrap_or_default())?;
    location.set("hash", url.fragment().map(|f| format!("#{f}")).unwrap_or_default())?;
    location.set("origin", url.origin().ascii_serialization())?;
    Ok(location)
}
