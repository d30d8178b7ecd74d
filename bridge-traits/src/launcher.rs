//! URL Launching Abstraction

use async_trait::async_trait;

use crate::error::Result;

/// Options for a launch request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Open inside an in-app web view instead of the default handler
    pub use_web_view: bool,
    /// Enable JavaScript in the in-app web view
    pub enable_javascript: bool,
    /// Extra HTTP headers for the in-app web view
    pub headers: Vec<(String, String)>,
}

/// Hands URLs to the platform's default handler
///
/// - **Android**: `Intent.ACTION_VIEW` through the foreground activity
/// - **iOS**: `UIApplication.open`
/// - **Desktop**: `xdg-open` / `open` / `start`
#[async_trait]
pub trait UrlLauncher: Send + Sync {
    /// Whether some handler on this device accepts the URL
    async fn can_launch(&self, url: &str) -> Result<bool>;

    /// Launch the URL; returns `false` when no handler accepted it
    async fn launch(&self, url: &str, options: LaunchOptions) -> Result<bool>;

    /// Close an in-app web view opened by a previous launch
    async fn close_web_view(&self) -> Result<()> {
        Ok(())
    }
}
