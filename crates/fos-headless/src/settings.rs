//! Browser Settings

use fos_net::SyncWorkerConfig;
use serde::Deserialize;

/// Browser configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Ignore `javascript:` navigations
    pub disable_javascript_evaluation: bool,

    /// Let script errors propagate to the caller instead of logging them
    pub disable_error_capturing: bool,

    /// User agent string for the HTTP transport
    pub user_agent: String,

    pub navigation: NavigationSettings,

    pub fetch: FetchSettings,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            disable_javascript_evaluation: false,
            disable_error_capturing: false,
            user_agent: format!("fOS-Headless/{}", crate::VERSION),
            navigation: NavigationSettings::default(),
            fetch: FetchSettings::default(),
        }
    }
}

/// Navigation policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Allow every navigation, skipping the remaining rules
    pub allow_all: bool,

    /// Deny navigation to another origin
    pub same_origin_only: bool,

    pub disable_main_frame_navigation: bool,

    pub disable_child_frame_navigation: bool,

    /// Allow navigation of pages opened by another frame
    pub allow_child_pages: bool,

    /// A denied navigation leaves `location` untouched
    pub disable_fallback_to_set_url: bool,

    /// Default navigation timeout (ms)
    pub timeout_ms: u64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            allow_all: true,
            same_origin_only: false,
            disable_main_frame_navigation: false,
            disable_child_frame_navigation: false,
            allow_child_pages: true,
            disable_fallback_to_set_url: false,
            timeout_ms: 30_000,
        }
    }
}

/// Fetch configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Bypass the response cache
    pub disable_cache: bool,

    /// Worker used by synchronous fetches
    pub sync_worker: SyncWorkerConfig,
}
