//! # Plugin Host
//!
//! Attach/detach lifecycle for a set of plugins sharing one [`Messenger`].
//!
//! ```text
//! attach(plugins) --> run(inbound) ... attach_activity / detach_activity ... detach()
//! ```
//!
//! `detach` is the host teardown: it cancels every active event
//! subscription, lets each plugin sweep its handle registries, then drops all
//! channel registrations. Calls arriving afterwards are answered
//! not-implemented.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::codec::MethodCodec;
use crate::error::{ChannelError, Result};
use crate::event::ListenPolicies;
use crate::messenger::{InboundMessage, Messenger, OutboundMessage, Outbox, ReplyId};

/// A first-party plugin: one or more channels over a host capability.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Register channels. Keep a clone of `messenger` for channels created
    /// later (per-handle event channels, for example).
    async fn on_attached(&self, messenger: &Messenger) -> Result<()>;

    /// Release every native resource the plugin still owns.
    async fn on_detached(&self) {}

    /// A foreground activity became available.
    async fn on_activity_attached(&self) {}

    /// The foreground activity went away.
    async fn on_activity_detached(&self) {}
}

/// Owns the messenger, the attached plugins and the inbound loop.
pub struct PluginHost {
    messenger: Messenger,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
    activity: AtomicBool,
    shutdown: Mutex<CancellationToken>,
}

impl PluginHost {
    /// Create a host and the receiver of its outbound queue.
    pub fn new(policies: ListenPolicies) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbox, outbound) = Outbox::channel();
        let host = Self {
            messenger: Messenger::new(outbox, policies),
            plugins: RwLock::new(Vec::new()),
            activity: AtomicBool::new(false),
            shutdown: Mutex::new(CancellationToken::new()),
        };
        (host, outbound)
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    pub async fn plugin_names(&self) -> Vec<String> {
        self.plugins
            .read()
            .await
            .iter()
            .map(|plugin| plugin.name().to_string())
            .collect()
    }

    pub fn has_activity(&self) -> bool {
        self.activity.load(Ordering::Acquire)
    }

    fn token(&self) -> CancellationToken {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach plugins, registering their channels.
    ///
    /// If one plugin fails, the plugins attached by this call are detached
    /// again, every channel registered during the call (including the
    /// failing plugin's partial registrations) is removed, and the error is
    /// returned.
    pub async fn attach(&self, plugins: Vec<Arc<dyn Plugin>>) -> Result<()> {
        {
            let mut token = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
            if token.is_cancelled() {
                *token = CancellationToken::new();
            }
        }

        let mut attached: Vec<Arc<dyn Plugin>> = Vec::with_capacity(plugins.len());
        let mut registered: Vec<String> = Vec::new();
        for plugin in plugins {
            let before: HashSet<String> = self.messenger.channel_names().await.into_iter().collect();
            let outcome = plugin.on_attached(&self.messenger).await;
            registered.extend(
                self.messenger
                    .channel_names()
                    .await
                    .into_iter()
                    .filter(|name| !before.contains(name)),
            );

            if let Err(err) = outcome {
                warn!(plugin = plugin.name(), error = %err, "Plugin failed to attach, rolling back");
                for previous in attached.iter().rev() {
                    previous.on_detached().await;
                }
                for channel in &registered {
                    self.messenger.remove_channel(channel).await;
                }
                debug!(channels = registered.len(), "Rolled back channel registrations");
                return Err(ChannelError::AttachFailed {
                    plugin: plugin.name().to_string(),
                    message: err.to_string(),
                });
            }
            if self.has_activity() {
                plugin.on_activity_attached().await;
            }
            info!(plugin = plugin.name(), "Plugin attached");
            attached.push(plugin);
        }

        self.plugins.write().await.extend(attached);
        Ok(())
    }

    pub async fn attach_activity(&self) {
        if self.activity.swap(true, Ordering::AcqRel) {
            return;
        }
        let plugins = self.plugins.read().await.clone();
        for plugin in &plugins {
            plugin.on_activity_attached().await;
        }
        debug!(plugins = plugins.len(), "Activity attached");
    }

    pub async fn detach_activity(&self) {
        if !self.activity.swap(false, Ordering::AcqRel) {
            return;
        }
        let plugins = self.plugins.read().await.clone();
        for plugin in &plugins {
            plugin.on_activity_detached().await;
        }
        debug!(plugins = plugins.len(), "Activity detached");
    }

    /// Route one inbound call.
    #[instrument(
        skip(self, message),
        fields(channel = %message.channel, method = message.call.method(), reply_id = message.reply_id)
    )]
    pub async fn handle_message(&self, message: InboundMessage) {
        self.messenger.dispatch(message).await;
    }

    /// Decode a raw call payload and route it.
    pub async fn handle_encoded(
        &self,
        channel: &str,
        reply_id: ReplyId,
        payload: &[u8],
        codec: &dyn MethodCodec,
    ) -> Result<()> {
        let message = InboundMessage::decode(channel, reply_id, payload, codec)?;
        self.handle_message(message).await;
        Ok(())
    }

    /// Drive inbound calls in arrival order until the queue closes or the
    /// host detaches.
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundMessage>) {
        let token = self.token();
        info!("Plugin host running");
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Host detached, inbound loop stopping");
                    break;
                }
                message = inbound.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        debug!("Inbound queue closed");
                        break;
                    }
                },
            }
        }
        info!("Plugin host stopped");
    }

    /// Tear everything down.
    pub async fn detach(&self) {
        self.token().cancel();

        let streams = self.messenger.shutdown_streams().await;

        let plugins: Vec<Arc<dyn Plugin>> = std::mem::take(&mut *self.plugins.write().await);
        for plugin in plugins.iter().rev() {
            plugin.on_detached().await;
            debug!(plugin = plugin.name(), "Plugin detached");
        }

        self.messenger.clear().await;
        self.activity.store(false, Ordering::Release);
        info!(streams, plugins = plugins.len(), "Plugin host detached");
    }
}
