//! Plugin service façade and bootstrap helpers.
//!
//! This crate wires a [`BridgeConfig`] (host capabilities plus channel
//! tunables) into a running [`PluginHost`] with every first-party plugin
//! attached. Desktop apps typically enable the `desktop-shims` feature and
//! call [`bootstrap_desktop`]; mobile hosts build the config with their own
//! capability implementations and call [`PluginService::start`].
//!
//! The service owns the inbound side: calls are queued on a bounded channel
//! and dispatched in arrival order by one host task. The outbound receiver is
//! handed back to the caller, whose thread drains it and delivers replies
//! and stream writes to the application layer.

pub mod error;

pub use error::{Result, ServiceError};

use std::sync::Arc;

use core_channel::{
    ChannelError, InboundMessage, JsonMethodCodec, MethodCall, OutboundMessage, Plugin,
    PluginHost, ReplyId,
};
use core_plugins::{
    CallbackDispatcherPlugin, CallbackRegistry, ConnectivityPlugin, PathProviderPlugin,
    SharedPreferencesPlugin, UrlLauncherPlugin, VideoPlayerPlugin,
};
use core_runtime::BridgeConfig;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Build the plugin set a config can support.
///
/// Plugins whose optional capability is absent are left out.
pub fn plugins_for(config: &BridgeConfig, callbacks: CallbackRegistry) -> Vec<Arc<dyn Plugin>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(SharedPreferencesPlugin::with_prefix(
            Arc::clone(&config.preferences_store),
            config.preferences_prefix.clone(),
        )),
        Arc::new(CallbackDispatcherPlugin::new(callbacks)),
    ];

    match &config.network_monitor {
        Some(monitor) => plugins.push(Arc::new(ConnectivityPlugin::new(Arc::clone(monitor)))),
        None => debug!("No NetworkMonitor configured, connectivity plugin skipped"),
    }
    match &config.path_provider {
        Some(provider) => plugins.push(Arc::new(PathProviderPlugin::new(Arc::clone(provider)))),
        None => debug!("No PathProvider configured, path provider plugin skipped"),
    }
    match &config.media_backend {
        Some(backend) => plugins.push(Arc::new(VideoPlayerPlugin::new(Arc::clone(backend)))),
        None => debug!("No MediaBackend configured, video player plugin skipped"),
    }
    match &config.url_launcher {
        Some(launcher) => plugins.push(Arc::new(UrlLauncherPlugin::new(Arc::clone(launcher)))),
        None => debug!("No UrlLauncher configured, URL launcher plugin skipped"),
    }

    plugins
}

/// Primary façade exposed to host applications.
pub struct PluginService {
    host: Arc<PluginHost>,
    callbacks: CallbackRegistry,
    inbound: mpsc::Sender<InboundMessage>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl PluginService {
    /// Attach every supported plugin and start the inbound loop.
    ///
    /// Returns the service and the receiver of the outbound queue. Must be
    /// called inside a Tokio runtime.
    pub async fn start(
        config: BridgeConfig,
        callbacks: CallbackRegistry,
    ) -> Result<(Self, mpsc::UnboundedReceiver<OutboundMessage>)> {
        config.validate()?;

        let (host, outbound) = PluginHost::new(config.listen_policies());
        let host = Arc::new(host);

        let plugins = plugins_for(&config, callbacks.clone());
        host.attach(plugins).await?;

        let (inbound, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let runner = tokio::spawn({
            let host = Arc::clone(&host);
            async move { host.run(inbound_rx).await }
        });

        info!(
            plugins = ?host.plugin_names().await,
            inbound_capacity = config.inbound_capacity,
            "Plugin service started"
        );

        Ok((
            Self {
                host,
                callbacks,
                inbound,
                runner: Mutex::new(Some(runner)),
            },
            outbound,
        ))
    }

    pub fn host(&self) -> &PluginHost {
        &self.host
    }

    /// Native callbacks the callback dispatcher can invoke.
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Queue one call, waiting while the inbound queue is full.
    pub async fn submit(&self, message: InboundMessage) -> Result<()> {
        self.inbound
            .send(message)
            .await
            .map_err(|_| ServiceError::Stopped)
    }

    /// Queue a call built from its parts.
    pub async fn call(
        &self,
        channel: impl Into<String>,
        reply_id: ReplyId,
        call: MethodCall,
    ) -> Result<()> {
        self.submit(InboundMessage::new(channel, reply_id, call))
            .await
    }

    /// Decode a JSON call payload and queue it.
    pub async fn submit_encoded(
        &self,
        channel: &str,
        reply_id: ReplyId,
        payload: &[u8],
    ) -> Result<()> {
        let message = InboundMessage::decode(channel, reply_id, payload, &JsonMethodCodec)
            .map_err(ChannelError::from)?;
        self.submit(message).await
    }

    pub async fn attach_activity(&self) {
        self.host.attach_activity().await;
    }

    pub async fn detach_activity(&self) {
        self.host.detach_activity().await;
    }

    /// Detach every plugin and stop the inbound loop.
    ///
    /// Calls queued but not yet dispatched are dropped. Later submissions
    /// fail with [`ServiceError::Stopped`].
    pub async fn shutdown(&self) {
        self.host.detach().await;
        if let Some(runner) = self.runner.lock().await.take() {
            if let Err(err) = runner.await {
                warn!(error = %err, "Inbound loop ended abnormally");
            }
        }
        info!("Plugin service stopped");
    }
}

/// Start a service on the desktop capability implementations.
///
/// Preferences live in `<support dir>/shared_preferences.db`, the support
/// directory being namespaced by `app_name`.
///
/// ```ignore
/// use core_service::bootstrap_desktop;
///
/// let (service, mut outbound) = bootstrap_desktop("my-app").await?;
/// service.attach_activity().await;
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    app_name: &str,
) -> Result<(PluginService, mpsc::UnboundedReceiver<OutboundMessage>)> {
    use bridge_desktop::{DesktopPathProvider, SqlitePreferencesStore};
    use bridge_traits::PathProvider;
    use core_runtime::config::PREFERENCES_FILE;

    let paths = Arc::new(DesktopPathProvider::new(app_name));
    let support = paths
        .support_directory()
        .await
        .map_err(|err| ServiceError::InitializationFailed(err.to_string()))?
        .ok_or_else(|| {
            ServiceError::InitializationFailed("No application support directory".to_string())
        })?;
    let store = SqlitePreferencesStore::new(support.join(PREFERENCES_FILE))
        .await
        .map_err(|err| ServiceError::InitializationFailed(err.to_string()))?;

    let config = BridgeConfig::builder()
        .app_name(app_name)
        .preferences_store(Arc::new(store))
        .path_provider(paths)
        .build()?;

    PluginService::start(config, CallbackRegistry::new()).await
}
