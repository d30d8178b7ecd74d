//! # Messenger
//!
//! Channel registry and the outbound queue.
//!
//! The transport hands every inbound call to [`Messenger::dispatch`]; every
//! reply and stream write leaves through the single [`Outbox`] FIFO, whose
//! receiver is drained by the designated callback thread. Handlers may
//! complete from any task: posting is a non-blocking message handoff.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::call::MethodCall;
use crate::codec::{self, MethodCodec};
use crate::envelope::{Response, StreamEnvelope};
use crate::error::{ChannelError, Result};
use crate::event::{EventChannel, ListenPolicies, ListenPolicy, StreamHandler};
use crate::result::MethodResult;

/// Correlates a reply with the inbound call that produced it.
pub type ReplyId = u64;

/// A decoded call arriving from the application layer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel: String,
    pub reply_id: ReplyId,
    pub call: MethodCall,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, reply_id: ReplyId, call: MethodCall) -> Self {
        Self {
            channel: channel.into(),
            reply_id,
            call,
        }
    }

    /// Decode a call payload received on `channel`.
    pub fn decode(
        channel: impl Into<String>,
        reply_id: ReplyId,
        payload: &[u8],
        codec: &dyn MethodCodec,
    ) -> codec::Result<Self> {
        Ok(Self::new(channel, reply_id, codec.decode_method_call(payload)?))
    }
}

/// A message leaving the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Completion of one inbound call
    Reply {
        reply_id: ReplyId,
        response: Response,
    },
    /// One write on an event channel
    Stream {
        channel: String,
        envelope: StreamEnvelope,
    },
}

impl OutboundMessage {
    /// Encode the payload for the transport.
    pub fn encode(&self, codec: &dyn MethodCodec) -> codec::Result<Bytes> {
        match self {
            OutboundMessage::Reply { response, .. } => codec.encode_response(response),
            OutboundMessage::Stream { envelope, .. } => codec.encode_stream_envelope(envelope),
        }
    }
}

/// Sender half of the outbound queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox {
    /// Create the queue; the receiver belongs to the callback thread.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Post a message from any thread.
    ///
    /// Returns `false` when the receiver is gone; the message is dropped.
    pub fn post(&self, message: OutboundMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                debug!(?message, "Outbound queue closed, dropping message");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receives calls for one method channel.
#[async_trait]
pub trait MethodCallHandler: Send + Sync {
    /// Handle `call` and eventually complete `result`.
    async fn on_method_call(&self, call: MethodCall, result: MethodResult);
}

#[derive(Clone)]
enum ChannelEntry {
    Method(Arc<dyn MethodCallHandler>),
    Event(Arc<EventChannel>),
}

struct MessengerInner {
    channels: RwLock<HashMap<String, ChannelEntry>>,
    outbox: Outbox,
    policies: ListenPolicies,
}

/// Registry of named channels sharing one outbound queue.
///
/// Cheap to clone; plugins keep a clone to register channels after attach.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<MessengerInner>,
}

impl Messenger {
    pub fn new(outbox: Outbox, policies: ListenPolicies) -> Self {
        Self {
            inner: Arc::new(MessengerInner {
                channels: RwLock::new(HashMap::new()),
                outbox,
                policies,
            }),
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }

    pub fn policies(&self) -> &ListenPolicies {
        &self.inner.policies
    }

    /// Install a method channel.
    pub async fn set_method_call_handler(
        &self,
        channel: impl Into<String>,
        handler: Arc<dyn MethodCallHandler>,
    ) -> Result<()> {
        let channel = channel.into();
        self.insert(channel, ChannelEntry::Method(handler)).await
    }

    /// Install an event channel using the configured listen policy.
    pub async fn set_stream_handler(
        &self,
        channel: impl Into<String>,
        handler: Arc<dyn StreamHandler>,
    ) -> Result<Arc<EventChannel>> {
        self.install_stream(channel.into(), handler, None).await
    }

    /// Install an event channel with a plugin-declared listen policy.
    ///
    /// A per-channel override in the configuration still takes precedence.
    pub async fn set_stream_handler_with_policy(
        &self,
        channel: impl Into<String>,
        handler: Arc<dyn StreamHandler>,
        policy: ListenPolicy,
    ) -> Result<Arc<EventChannel>> {
        self.install_stream(channel.into(), handler, Some(policy))
            .await
    }

    async fn install_stream(
        &self,
        channel: String,
        handler: Arc<dyn StreamHandler>,
        declared: Option<ListenPolicy>,
    ) -> Result<Arc<EventChannel>> {
        let policy = self.inner.policies.resolve(&channel, declared);
        let event_channel = Arc::new(EventChannel::new(
            channel.clone(),
            handler,
            policy,
            self.inner.outbox.clone(),
        ));
        self.insert(channel, ChannelEntry::Event(event_channel.clone()))
            .await?;
        Ok(event_channel)
    }

    async fn insert(&self, channel: String, entry: ChannelEntry) -> Result<()> {
        let mut channels = self.inner.channels.write().await;
        if channels.contains_key(&channel) {
            warn!(channel = %channel, "Channel already registered");
            return Err(ChannelError::DuplicateChannel(channel));
        }
        debug!(channel = %channel, "Channel registered");
        channels.insert(channel, entry);
        Ok(())
    }

    /// Remove a channel, cancelling its subscription if it is an event
    /// channel. Returns whether the channel existed.
    pub async fn remove_channel(&self, channel: &str) -> bool {
        let removed = self.inner.channels.write().await.remove(channel);
        match removed {
            Some(ChannelEntry::Event(event_channel)) => {
                event_channel.shutdown().await;
                true
            }
            Some(ChannelEntry::Method(_)) => true,
            None => false,
        }
    }

    pub async fn contains(&self, channel: &str) -> bool {
        self.inner.channels.read().await.contains_key(channel)
    }

    /// Registered channel names, sorted.
    pub async fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Route one inbound call to its channel.
    ///
    /// Calls on unknown channels complete with not-implemented.
    pub async fn dispatch(&self, message: InboundMessage) {
        let InboundMessage {
            channel,
            reply_id,
            call,
        } = message;

        let entry = self.inner.channels.read().await.get(&channel).cloned();
        let result = MethodResult::new(reply_id, call.method(), self.inner.outbox.clone());

        match entry {
            Some(ChannelEntry::Method(handler)) => handler.on_method_call(call, result).await,
            Some(ChannelEntry::Event(event_channel)) => {
                event_channel.handle_call(call, result).await
            }
            None => {
                debug!(channel = %channel, method = call.method(), "No channel registered");
                result.not_implemented();
            }
        }
    }

    /// Cancel every active event subscription. Returns how many were active.
    pub async fn shutdown_streams(&self) -> usize {
        let event_channels: Vec<Arc<EventChannel>> = self
            .inner
            .channels
            .read()
            .await
            .values()
            .filter_map(|entry| match entry {
                ChannelEntry::Event(event_channel) => Some(event_channel.clone()),
                ChannelEntry::Method(_) => None,
            })
            .collect();

        let mut cancelled = 0;
        for event_channel in event_channels {
            if event_channel.shutdown().await {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drop every channel registration.
    pub async fn clear(&self) {
        let mut channels = self.inner.channels.write().await;
        let count = channels.len();
        channels.clear();
        info!(count, "Channels cleared");
    }
}
