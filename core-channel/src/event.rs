//! # Event Streams
//!
//! Push-style channels layered on the same transport as method calls.
//!
//! ## State machine
//!
//! Each [`EventChannel`] holds at most one subscription:
//!
//! ```text
//! Unsubscribed --listen ok--> Active --cancel | end | error--> Unsubscribed
//! ```
//!
//! Every Active instance carries a generation number. Terminal writes from an
//! [`EventSink`] only clear the slot when their generation is still current,
//! so a stale sink from a replaced subscription never tears down its
//! successor.
//!
//! ## Second listener
//!
//! A second `listen` while Active follows the channel's [`ListenPolicy`]:
//! `Replace` detaches the old subscription first, `Reject` answers
//! `ALREADY_LISTENING` and keeps it.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info, warn};

use crate::call::MethodCall;
use crate::envelope::{codes, PluginError, StreamEnvelope};
use crate::messenger::{OutboundMessage, Outbox};
use crate::result::MethodResult;
use crate::value::Value;

/// Native side of an event channel.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// Attach the native listener and start emitting into `sink`.
    ///
    /// Returning an error fails the `listen` call; the sink is deactivated.
    async fn on_listen(&self, arguments: Value, sink: EventSink) -> Result<(), PluginError>;

    /// Detach the native listener.
    async fn on_cancel(&self, arguments: Value);
}

/// What a second `listen` does while a subscription is Active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenPolicy {
    /// Detach the current subscription, then install the new one
    #[default]
    Replace,
    /// Keep the current subscription and fail the new `listen`
    Reject,
}

/// Listen policy table: a default plus per-channel overrides.
#[derive(Debug, Clone, Default)]
pub struct ListenPolicies {
    default: ListenPolicy,
    overrides: HashMap<String, ListenPolicy>,
}

impl ListenPolicies {
    pub fn new(default: ListenPolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, channel: impl Into<String>, policy: ListenPolicy) -> Self {
        self.overrides.insert(channel.into(), policy);
        self
    }

    pub fn default_policy(&self) -> ListenPolicy {
        self.default
    }

    /// Configured override, then the plugin's declared policy, then the
    /// default.
    pub fn resolve(&self, channel: &str, declared: Option<ListenPolicy>) -> ListenPolicy {
        self.overrides
            .get(channel)
            .copied()
            .or(declared)
            .unwrap_or(self.default)
    }
}

struct Subscription {
    generation: u64,
    sink: EventSink,
}

#[derive(Default)]
struct SubscriptionSlot {
    next_generation: u64,
    active: Option<Subscription>,
}

impl SubscriptionSlot {
    fn clear_if_current(&mut self, generation: u64) -> bool {
        if self
            .active
            .as_ref()
            .is_some_and(|sub| sub.generation == generation)
        {
            self.active = None;
            true
        } else {
            false
        }
    }
}

type SharedSlot = Arc<Mutex<SubscriptionSlot>>;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SinkInner {
    channel: String,
    generation: u64,
    outbox: Outbox,
    active: Mutex<bool>,
    slot: Weak<Mutex<SubscriptionSlot>>,
}

/// Multi-write sink for one subscription instance.
///
/// Cloneable and usable from any thread. Writes after cancellation or after
/// a terminal write are dropped and never reach the wire.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("channel", &self.inner.channel)
            .field("generation", &self.inner.generation)
            .field("active", &self.is_active())
            .finish()
    }
}

impl EventSink {
    fn new(channel: String, generation: u64, outbox: Outbox, slot: &SharedSlot) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                channel,
                generation,
                outbox,
                active: Mutex::new(true),
                slot: Arc::downgrade(slot),
            }),
        }
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn is_active(&self) -> bool {
        *lock(&self.inner.active)
    }

    /// Emit one event. Returns `false` if the subscription is gone.
    pub fn success(&self, event: impl Into<Value>) -> bool {
        let active = lock(&self.inner.active);
        if !*active {
            debug!(
                channel = %self.inner.channel,
                generation = self.inner.generation,
                "Event dropped, subscription inactive"
            );
            return false;
        }
        // Posting under the lock orders this event before any cancel
        self.post(StreamEnvelope::Event(event.into()))
    }

    /// Terminal error; ends the subscription.
    pub fn error(&self, code: impl Into<String>, message: impl Into<String>, details: impl Into<Value>) {
        self.error_from(PluginError::new(code, message).with_details(details));
    }

    pub fn error_from(&self, error: impl Into<PluginError>) {
        self.terminate(StreamEnvelope::Error(error.into()));
    }

    /// Terminal end-of-stream; ends the subscription.
    pub fn end_of_stream(&self) {
        self.terminate(StreamEnvelope::EndOfStream);
    }

    fn terminate(&self, envelope: StreamEnvelope) {
        {
            let mut active = lock(&self.inner.active);
            if !*active {
                debug!(
                    channel = %self.inner.channel,
                    generation = self.inner.generation,
                    "Terminal write dropped, subscription inactive"
                );
                return;
            }
            *active = false;
            self.post(envelope);
        }

        if let Some(slot) = self.inner.slot.upgrade() {
            if lock(&slot).clear_if_current(self.inner.generation) {
                debug!(
                    channel = %self.inner.channel,
                    generation = self.inner.generation,
                    "Subscription ended by native source"
                );
            }
        }
    }

    /// Stop accepting writes. Returns whether the sink was active.
    fn deactivate(&self) -> bool {
        std::mem::replace(&mut *lock(&self.inner.active), false)
    }

    fn post(&self, envelope: StreamEnvelope) -> bool {
        self.inner.outbox.post(OutboundMessage::Stream {
            channel: self.inner.channel.clone(),
            envelope,
        })
    }
}

/// One named event channel and its subscription slot.
pub struct EventChannel {
    name: String,
    handler: Arc<dyn StreamHandler>,
    policy: ListenPolicy,
    outbox: Outbox,
    slot: SharedSlot,
    // Serializes listen/cancel/shutdown
    transitions: tokio::sync::Mutex<()>,
}

impl EventChannel {
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn StreamHandler>,
        policy: ListenPolicy,
        outbox: Outbox,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            policy,
            outbox,
            slot: Arc::new(Mutex::new(SubscriptionSlot::default())),
            transitions: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> ListenPolicy {
        self.policy
    }

    pub fn is_active(&self) -> bool {
        lock(&self.slot).active.is_some()
    }

    /// Generation of the Active subscription, if any.
    pub fn active_generation(&self) -> Option<u64> {
        lock(&self.slot).active.as_ref().map(|sub| sub.generation)
    }

    /// Handle a `listen` / `cancel` call addressed to this channel.
    pub async fn handle_call(&self, call: MethodCall, result: MethodResult) {
        match call.method() {
            "listen" => self.listen(call.into_arguments(), result).await,
            "cancel" => self.cancel(call.into_arguments(), result).await,
            other => {
                debug!(channel = %self.name, method = other, "Unknown stream method");
                result.not_implemented();
            }
        }
    }

    pub async fn listen(&self, arguments: Value, result: MethodResult) {
        let _transition = self.transitions.lock().await;

        if self.is_active() {
            match self.policy {
                ListenPolicy::Reject => {
                    warn!(channel = %self.name, "Listen rejected, stream already active");
                    result.error(
                        codes::ALREADY_LISTENING,
                        format!("Stream {} already has an active listener", self.name),
                        (),
                    );
                    return;
                }
                ListenPolicy::Replace => {
                    debug!(channel = %self.name, "Replacing active subscription");
                    self.detach_current(Value::Null).await;
                }
            }
        }

        let sink = {
            let mut slot = lock(&self.slot);
            slot.next_generation += 1;
            let generation = slot.next_generation;
            let sink = EventSink::new(self.name.clone(), generation, self.outbox.clone(), &self.slot);
            slot.active = Some(Subscription {
                generation,
                sink: sink.clone(),
            });
            sink
        };

        match self.handler.on_listen(arguments, sink.clone()).await {
            Ok(()) => {
                info!(channel = %self.name, generation = sink.generation(), "Stream listening");
                result.success(());
            }
            Err(err) => {
                warn!(channel = %self.name, error = %err, "Listen failed");
                sink.deactivate();
                lock(&self.slot).clear_if_current(sink.generation());
                result.error_from(err);
            }
        }
    }

    pub async fn cancel(&self, arguments: Value, result: MethodResult) {
        let _transition = self.transitions.lock().await;

        if self.detach_current(arguments).await {
            info!(channel = %self.name, "Stream cancelled");
            result.success(());
        } else {
            debug!(channel = %self.name, "Cancel without active stream");
            result.error(
                codes::NO_ACTIVE_STREAM,
                format!("No active stream to cancel on {}", self.name),
                (),
            );
        }
    }

    /// Force-cancel the active subscription. Returns whether one was active.
    pub async fn shutdown(&self) -> bool {
        let _transition = self.transitions.lock().await;
        let cancelled = self.detach_current(Value::Null).await;
        if cancelled {
            info!(channel = %self.name, "Stream shut down");
        }
        cancelled
    }

    async fn detach_current(&self, arguments: Value) -> bool {
        let current = lock(&self.slot).active.take();
        match current {
            Some(subscription) => {
                subscription.sink.deactivate();
                self.handler.on_cancel(arguments).await;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Default)]
struct QueueState {
    delegate: Option<EventSink>,
    pending: VecDeque<StreamEnvelope>,
    done: bool,
}

/// Buffers writes until a listener attaches.
///
/// Native sources that start emitting before the application listens (a
/// player finishing initialization, for example) write here; the buffered
/// envelopes flush in order once [`set_delegate`](Self::set_delegate)
/// installs a sink. Nothing is accepted after a terminal write.
#[derive(Default)]
pub struct QueuingEventSink {
    state: Mutex<QueueState>,
}

impl QueuingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or remove the downstream sink.
    pub fn set_delegate(&self, delegate: Option<EventSink>) {
        let mut state = lock(&self.state);
        state.delegate = delegate;
        Self::flush(&mut state);
    }

    pub fn has_delegate(&self) -> bool {
        lock(&self.state).delegate.is_some()
    }

    /// Envelopes waiting for a delegate.
    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn success(&self, event: impl Into<Value>) {
        self.enqueue(StreamEnvelope::Event(event.into()));
    }

    pub fn error(&self, code: impl Into<String>, message: impl Into<String>, details: impl Into<Value>) {
        self.enqueue(StreamEnvelope::Error(
            PluginError::new(code, message).with_details(details),
        ));
    }

    pub fn end_of_stream(&self) {
        self.enqueue(StreamEnvelope::EndOfStream);
    }

    fn enqueue(&self, envelope: StreamEnvelope) {
        let mut state = lock(&self.state);
        if state.done {
            return;
        }
        state.done = envelope.is_terminal();
        state.pending.push_back(envelope);
        Self::flush(&mut state);
    }

    fn flush(state: &mut QueueState) {
        let Some(delegate) = state.delegate.clone() else {
            return;
        };
        while let Some(envelope) = state.pending.pop_front() {
            match envelope {
                StreamEnvelope::Event(value) => {
                    delegate.success(value);
                }
                StreamEnvelope::Error(error) => delegate.error_from(error),
                StreamEnvelope::EndOfStream => delegate.end_of_stream(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Default)]
    struct Recorder {
        sinks: Mutex<Vec<EventSink>>,
        cancels: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl StreamHandler for Recorder {
        async fn on_listen(&self, _arguments: Value, sink: EventSink) -> Result<(), PluginError> {
            if self.fail {
                return Err(PluginError::new(codes::NO_ACTIVITY, "no activity"));
            }
            lock(&self.sinks).push(sink);
            Ok(())
        }

        async fn on_cancel(&self, _arguments: Value) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Recorder {
        fn sink(&self, index: usize) -> EventSink {
            lock(&self.sinks)[index].clone()
        }
    }

    fn channel(
        policy: ListenPolicy,
        handler: Arc<Recorder>,
    ) -> (EventChannel, Outbox, UnboundedReceiver<OutboundMessage>) {
        let (outbox, rx) = Outbox::channel();
        (
            EventChannel::new("events", handler, policy, outbox.clone()),
            outbox,
            rx,
        )
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn reply_code(message: &OutboundMessage) -> Option<&str> {
        match message {
            OutboundMessage::Reply { response, .. } => response.error_code(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_replace_detaches_previous() {
        let handler = Arc::new(Recorder::default());
        let (channel, outbox, mut rx) = channel(ListenPolicy::Replace, handler.clone());

        channel.listen(Value::Null, MethodResult::new(1, "listen", outbox.clone())).await;
        channel.listen(Value::Null, MethodResult::new(2, "listen", outbox.clone())).await;

        let old = handler.sink(0);
        let new = handler.sink(1);
        assert!(!old.is_active());
        assert!(new.is_active());
        assert_eq!(handler.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(channel.active_generation(), Some(new.generation()));

        // A stale terminal write leaves the new subscription alone
        old.end_of_stream();
        assert!(channel.is_active());
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn test_reject_keeps_previous() {
        let handler = Arc::new(Recorder::default());
        let (channel, outbox, mut rx) = channel(ListenPolicy::Reject, handler.clone());

        channel.listen(Value::Null, MethodResult::new(1, "listen", outbox.clone())).await;
        channel.listen(Value::Null, MethodResult::new(2, "listen", outbox.clone())).await;

        let messages = drain(&mut rx);
        assert_eq!(reply_code(&messages[1]), Some(codes::ALREADY_LISTENING));
        assert!(handler.sink(0).is_active());
        assert_eq!(handler.cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_listen_stays_unsubscribed() {
        let handler = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let (channel, outbox, mut rx) = channel(ListenPolicy::Replace, handler);

        channel.listen(Value::Null, MethodResult::new(1, "listen", outbox.clone())).await;

        assert!(!channel.is_active());
        assert_eq!(reply_code(&drain(&mut rx)[0]), Some(codes::NO_ACTIVITY));
    }

    #[tokio::test]
    async fn test_cancel_without_listen() {
        let handler = Arc::new(Recorder::default());
        let (channel, outbox, mut rx) = channel(ListenPolicy::Replace, handler);

        channel.cancel(Value::Null, MethodResult::new(1, "cancel", outbox)).await;
        assert_eq!(reply_code(&drain(&mut rx)[0]), Some(codes::NO_ACTIVE_STREAM));
    }

    #[tokio::test]
    async fn test_error_is_terminal() {
        let handler = Arc::new(Recorder::default());
        let (channel, outbox, mut rx) = channel(ListenPolicy::Replace, handler.clone());
        channel.listen(Value::Null, MethodResult::new(1, "listen", outbox)).await;
        drain(&mut rx);

        let sink = handler.sink(0);
        sink.error("VideoError", "decoder failed", ());
        assert!(!sink.success(1));
        assert!(!channel.is_active());

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            OutboundMessage::Stream { envelope: StreamEnvelope::Error(e), .. } if e.code == "VideoError"
        ));
    }

    #[tokio::test]
    async fn test_queuing_sink_flushes_in_order() {
        let handler = Arc::new(Recorder::default());
        let (channel, outbox, mut rx) = channel(ListenPolicy::Replace, handler.clone());
        let queue = QueuingEventSink::new();

        queue.success(1);
        queue.success(2);
        assert_eq!(queue.pending(), 2);

        channel.listen(Value::Null, MethodResult::new(1, "listen", outbox)).await;
        drain(&mut rx);
        queue.set_delegate(Some(handler.sink(0)));
        queue.success(3);
        queue.end_of_stream();
        queue.success(4);

        let events: Vec<StreamEnvelope> = drain(&mut rx)
            .into_iter()
            .filter_map(|message| match message {
                OutboundMessage::Stream { envelope, .. } => Some(envelope),
                _ => None,
            })
            .collect();
        assert_eq!(
            events,
            vec![
                StreamEnvelope::Event(Value::Int(1)),
                StreamEnvelope::Event(Value::Int(2)),
                StreamEnvelope::Event(Value::Int(3)),
                StreamEnvelope::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_policy_resolution() {
        let policies = ListenPolicies::new(ListenPolicy::Replace)
            .with_override("a", ListenPolicy::Reject);
        assert_eq!(policies.resolve("a", Some(ListenPolicy::Replace)), ListenPolicy::Reject);
        assert_eq!(policies.resolve("b", Some(ListenPolicy::Reject)), ListenPolicy::Reject);
        assert_eq!(policies.resolve("b", None), ListenPolicy::Replace);
    }
}
