//! # URL Launcher
//!
//! Hands URLs to the host's default handler.
//!
//! `launch` needs a foreground activity; without one it fails with
//! `NO_ACTIVITY`. `canLaunch` and `closeWebView` work at any time.

use async_trait::async_trait;
use bridge_traits::{LaunchOptions, UrlLauncher};
use core_channel::{
    codes, MethodCall, MethodRouter, Messenger, Plugin, PluginError, Result as ChannelResult, Value,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const CHANNEL: &str = "plugins.flutter.io/url_launcher";

pub struct LauncherState {
    launcher: Arc<dyn UrlLauncher>,
    activity: AtomicBool,
}

/// The URL launcher plugin
pub struct UrlLauncherPlugin {
    state: Arc<LauncherState>,
}

impl UrlLauncherPlugin {
    pub fn new(launcher: Arc<dyn UrlLauncher>) -> Self {
        Self {
            state: Arc::new(LauncherState {
                launcher,
                activity: AtomicBool::new(false),
            }),
        }
    }

    pub fn has_activity(&self) -> bool {
        self.state.activity.load(Ordering::Acquire)
    }

    pub fn router(&self) -> MethodRouter<LauncherState> {
        MethodRouter::builder(self.state.clone())
            .route("canLaunch", can_launch)
            .route("launch", launch)
            .route("closeWebView", close_web_view)
            .build()
    }
}

#[async_trait]
impl Plugin for UrlLauncherPlugin {
    fn name(&self) -> &str {
        "url_launcher"
    }

    async fn on_attached(&self, messenger: &Messenger) -> ChannelResult<()> {
        messenger
            .set_method_call_handler(CHANNEL, Arc::new(self.router()))
            .await
    }

    async fn on_activity_attached(&self) {
        self.state.activity.store(true, Ordering::Release);
    }

    async fn on_activity_detached(&self) {
        self.state.activity.store(false, Ordering::Release);
    }
}

async fn can_launch(state: Arc<LauncherState>, call: MethodCall) -> Result<bool, PluginError> {
    let url: String = call.required("url")?;
    let can_launch = state.launcher.can_launch(&url).await?;
    debug!(url = %url, can_launch, "canLaunch");
    Ok(can_launch)
}

async fn launch(state: Arc<LauncherState>, call: MethodCall) -> Result<bool, PluginError> {
    let url: String = call.required("url")?;
    let options = LaunchOptions {
        use_web_view: call.argument("useWebView")?.unwrap_or(false),
        enable_javascript: call.argument("enableJavaScript")?.unwrap_or(false),
        headers: call
            .argument::<BTreeMap<String, String>>("headers")?
            .unwrap_or_default()
            .into_iter()
            .collect(),
    };

    if !state.activity.load(Ordering::Acquire) {
        return Err(PluginError::new(
            codes::NO_ACTIVITY,
            "Launching a URL requires a foreground activity.",
        ));
    }

    let launched = state.launcher.launch(&url, options).await?;
    debug!(url = %url, launched, "launch");
    Ok(launched)
}

async fn close_web_view(state: Arc<LauncherState>, _call: MethodCall) -> Result<Value, PluginError> {
    state.launcher.close_web_view().await?;
    Ok(Value::Null)
}
