//! Browser Errors

use fos_js::JsError;
use fos_net::NetError;

/// Error surfaced by navigation and evaluation
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// Navigation target could not be resolved
    #[error("Failed to construct 'URL': Invalid URL: {0}")]
    UriMismatch(String),

    /// Blocked by a frame embedding policy
    #[error("Security error: {0}")]
    Security(String),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Script(#[from] JsError),

    /// Frame, page or window has been closed
    #[error("The browsing context has been closed.")]
    Closed,
}

impl BrowserError {
    /// Whether the navigation was cut short by its timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::Net(NetError::Timeout(_)))
    }
}
