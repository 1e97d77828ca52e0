//! Cache-Control Parsing

/// Parsed `Cache-Control` directives relevant to the response cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub max_age: Option<i64>,
    pub no_cache: bool,
    pub no_store: bool,
    pub must_revalidate: bool,
    pub stale_while_revalidate: bool,
}

impl CacheControl {
    /// Parse a header value such as `max-age=60, must-revalidate`
    pub fn parse(value: &str) -> Self {
        let mut directives = Self::default();

        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, arg) = match part.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                None => (part, None),
            };

            match name.to_ascii_lowercase().as_str() {
                "max-age" => {
                    directives.max_age = arg.and_then(|a| a.parse::<i64>().ok());
                }
                "no-cache" => directives.no_cache = true,
                "no-store" => directives.no_store = true,
                "must-revalidate" => directives.must_revalidate = true,
                "stale-while-revalidate" => directives.stale_while_revalidate = true,
                _ => {}
            }
        }

        directives
    }

    /// Write must not be stored
    pub fn forbids_storage(&self) -> bool {
        self.no_cache || self.no_store
    }
}

/// Whether a request's `Cache-Control` asks to bypass the cache
pub fn request_bypasses_cache(value: Option<&str>) -> bool {
    value.is_some_and(|v| CacheControl::parse(v).no_cache)
}

/// Names listed in a `Vary` header, lower-cased
pub fn parse_vary(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}
