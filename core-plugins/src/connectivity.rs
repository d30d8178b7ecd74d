//! # Connectivity
//!
//! `check` on [`CHANNEL`] replies the current connection type (`wifi`,
//! `mobile`, `ethernet` or `none`). Listening on [`STATUS_CHANNEL`] forwards
//! every change reported by the host [`NetworkMonitor`] until cancelled.

use async_trait::async_trait;
use bridge_traits::NetworkMonitor;
use core_channel::{
    EventSink, MethodCall, MethodRouter, Messenger, Plugin, PluginError,
    Result as ChannelResult, StreamHandler, Value,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const CHANNEL: &str = "plugins.flutter.io/connectivity";
pub const STATUS_CHANNEL: &str = "plugins.flutter.io/connectivity_status";

pub struct ConnectivityState {
    monitor: Arc<dyn NetworkMonitor>,
}

/// Forwards monitor changes into the active event sink
struct StatusStream {
    monitor: Arc<dyn NetworkMonitor>,
    forwarder: Mutex<Option<CancellationToken>>,
}

impl StatusStream {
    fn replace_forwarder(&self, token: Option<CancellationToken>) {
        let previous = std::mem::replace(
            &mut *self
                .forwarder
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            token,
        );
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn is_forwarding(&self) -> bool {
        self.forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

#[async_trait]
impl StreamHandler for StatusStream {
    async fn on_listen(&self, _arguments: Value, sink: EventSink) -> Result<(), PluginError> {
        let mut changes = self.monitor.subscribe_changes().await?;
        let token = CancellationToken::new();
        self.replace_forwarder(Some(token.clone()));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    change = changes.next() => match change {
                        Some(connectivity) => {
                            debug!(connectivity = %connectivity, "Connectivity changed");
                            if !sink.success(connectivity.as_str()) {
                                break;
                            }
                        }
                        None => {
                            sink.end_of_stream();
                            break;
                        }
                    },
                }
            }
            debug!("Connectivity forwarding stopped");
        });

        info!(channel = STATUS_CHANNEL, "Listening for connectivity changes");
        Ok(())
    }

    async fn on_cancel(&self, _arguments: Value) {
        self.replace_forwarder(None);
        info!(channel = STATUS_CHANNEL, "Stopped listening for connectivity changes");
    }
}

/// The connectivity plugin
pub struct ConnectivityPlugin {
    state: Arc<ConnectivityState>,
    status: Arc<StatusStream>,
}

impl ConnectivityPlugin {
    pub fn new(monitor: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            state: Arc::new(ConnectivityState {
                monitor: monitor.clone(),
            }),
            status: Arc::new(StatusStream {
                monitor,
                forwarder: Mutex::new(None),
            }),
        }
    }

    /// Whether a change-forwarding task is running
    pub fn is_forwarding(&self) -> bool {
        self.status.is_forwarding()
    }

    pub fn router(&self) -> MethodRouter<ConnectivityState> {
        MethodRouter::builder(self.state.clone())
            .route("check", check)
            .build()
    }
}

#[async_trait]
impl Plugin for ConnectivityPlugin {
    fn name(&self) -> &str {
        "connectivity"
    }

    async fn on_attached(&self, messenger: &Messenger) -> ChannelResult<()> {
        messenger
            .set_method_call_handler(CHANNEL, Arc::new(self.router()))
            .await?;
        messenger
            .set_stream_handler(STATUS_CHANNEL, self.status.clone())
            .await?;
        Ok(())
    }

    async fn on_detached(&self) {
        self.status.replace_forwarder(None);
    }
}

async fn check(state: Arc<ConnectivityState>, _call: MethodCall) -> Result<&'static str, PluginError> {
    let connectivity = state.monitor.check().await?;
    Ok(connectivity.as_str())
}
