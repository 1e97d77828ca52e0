//! Document
//!
//! Raw document source committed to a window by navigation.

use url::Url;

/// A window's document
#[derive(Debug, Clone)]
pub struct Document {
    /// Document URL
    pub url: Url,
    /// Document title
    pub title: Option<String>,
    /// HTML source
    pub html: String,
}

impl Document {
    /// Create a new empty document
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: None,
            html: String::new(),
        }
    }

    /// Replace the content with `html`
    pub fn write(&mut self, html: String) {
        self.title = extract_title(&html);
        self.html = html;
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty()
    }
}

/// Extract title from HTML (simple regex-free extraction)
fn extract_title(html: &str) -> Option<String> {
    let html_lower = html.to_ascii_lowercase();

    let start = html_lower.find("<title>")? + "<title>".len();
    let end = start + html_lower[start..].find("</title>")?;

    let title = html[start..end].trim();
    (!title.is_empty()).then(|| title.to_string())
}
