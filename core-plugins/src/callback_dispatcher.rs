//! # Callback Dispatcher
//!
//! Runs native callbacks registered by id, immediately or on a schedule.
//!
//! The host registers callbacks on a [`CallbackRegistry`] before attaching
//! the plugin. The application layer then refers to them by id:
//!
//! - `call {callbackId}` runs the callback once and replies `null`
//! - `oneShot {requestCode, callbackId, delayMillis}` runs it once after a delay
//! - `periodic {requestCode, callbackId, intervalMillis, delayMillis?}` runs it repeatedly
//! - `cancel {requestCode}` cancels a scheduled request, replying whether one existed
//!
//! Scheduling again with a request code that is already in use replaces the
//! earlier request. Every scheduled request is aborted when the plugin
//! detaches.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use core_channel::{
    codes, MethodCall, MethodRouter, Messenger, Plugin, PluginError, Result as ChannelResult, Value,
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const CHANNEL: &str = "plugins.flutter.io/callback_dispatcher";

type Callback = Arc<dyn Fn() -> BoxFuture<'static, BridgeResult<()>> + Send + Sync>;

/// Host-side table of callbacks the application layer may invoke by id.
///
/// Cheap to clone; clones share the table.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: Arc<RwLock<HashMap<String, Callback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `id`. Returns `true` if it replaced an
    /// earlier registration.
    pub async fn register<F, Fut>(&self, id: impl Into<String>, callback: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<()>> + Send + 'static,
    {
        let id = id.into();
        let callback: Callback = Arc::new(move || callback().boxed());
        let replaced = self.callbacks.write().await.insert(id.clone(), callback).is_some();
        debug!(callback_id = %id, replaced, "Callback registered");
        replaced
    }

    pub async fn unregister(&self, id: &str) -> bool {
        self.callbacks.write().await.remove(id).is_some()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.callbacks.read().await.contains_key(id)
    }

    /// Registered ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.callbacks.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn get(&self, id: &str) -> Option<Callback> {
        self.callbacks.read().await.get(id).cloned()
    }

    /// Run the callback registered under `id` once.
    ///
    /// Returns `None` when nothing is registered under `id`.
    pub async fn invoke(&self, id: &str) -> Option<BridgeResult<()>> {
        let callback = self.get(id).await?;
        Some(callback().await)
    }
}

struct Scheduled {
    generation: u64,
    callback_id: String,
    task: JoinHandle<()>,
}

pub struct DispatcherState {
    registry: CallbackRegistry,
    scheduled: Mutex<HashMap<i64, Scheduled>>,
    next_generation: AtomicU64,
}

impl DispatcherState {
    async fn schedule(
        self: &Arc<Self>,
        request_code: i64,
        callback_id: String,
        delay: Duration,
        interval: Option<Duration>,
    ) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        // `finish` waits on this lock, so the entry is in place first
        let mut scheduled = self.scheduled.lock().await;

        let state = Arc::clone(self);
        let id = callback_id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match interval {
                None => {
                    state.fire(request_code, &id).await;
                    state.finish(request_code, generation).await;
                }
                Some(interval) => loop {
                    state.fire(request_code, &id).await;
                    tokio::time::sleep(interval).await;
                },
            }
        });

        let previous = scheduled.insert(
            request_code,
            Scheduled {
                generation,
                callback_id,
                task,
            },
        );
        if let Some(previous) = previous {
            debug!(request_code, callback_id = %previous.callback_id, "Replacing scheduled request");
            previous.task.abort();
        }
    }

    async fn fire(&self, request_code: i64, callback_id: &str) {
        match self.registry.invoke(callback_id).await {
            Some(Ok(())) => debug!(request_code, callback_id, "Scheduled callback ran"),
            Some(Err(err)) => {
                warn!(request_code, callback_id, error = %err, "Scheduled callback failed")
            }
            None => warn!(request_code, callback_id, "Scheduled callback no longer registered"),
        }
    }

    async fn finish(&self, request_code: i64, generation: u64) {
        let mut scheduled = self.scheduled.lock().await;
        if scheduled
            .get(&request_code)
            .is_some_and(|entry| entry.generation == generation)
        {
            scheduled.remove(&request_code);
        }
    }

    async fn cancel(&self, request_code: i64) -> bool {
        match self.scheduled.lock().await.remove(&request_code) {
            Some(entry) => {
                entry.task.abort();
                true
            }
            None => false,
        }
    }

    async fn cancel_all(&self) -> usize {
        let drained: Vec<Scheduled> = self
            .scheduled
            .lock()
            .await
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in &drained {
            entry.task.abort();
        }
        drained.len()
    }

    async fn ensure_registered(&self, callback_id: &str) -> Result<(), PluginError> {
        if self.registry.contains(callback_id).await {
            Ok(())
        } else {
            Err(unknown_callback(callback_id))
        }
    }
}

fn unknown_callback(callback_id: &str) -> PluginError {
    PluginError::new(
        codes::UNKNOWN_CALLBACK,
        format!("No callback registered for id {}", callback_id),
    )
}

fn millis(call: &MethodCall, key: &str) -> Result<Duration, PluginError> {
    let millis: i64 = call.argument(key)?.unwrap_or(0);
    if millis < 0 {
        return Err(PluginError::new(
            codes::INVALID_ARGUMENT,
            format!("{} must not be negative", key),
        ));
    }
    Ok(Duration::from_millis(millis as u64))
}

/// The callback dispatcher plugin
pub struct CallbackDispatcherPlugin {
    state: Arc<DispatcherState>,
}

impl CallbackDispatcherPlugin {
    pub fn new(registry: CallbackRegistry) -> Self {
        Self {
            state: Arc::new(DispatcherState {
                registry,
                scheduled: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.state.registry
    }

    /// Request codes with a pending schedule, sorted.
    pub async fn scheduled(&self) -> Vec<i64> {
        let mut requests: Vec<i64> = self.state.scheduled.lock().await.keys().copied().collect();
        requests.sort_unstable();
        requests
    }

    pub fn router(&self) -> MethodRouter<DispatcherState> {
        MethodRouter::builder(self.state.clone())
            .route("call", call)
            .route("oneShot", one_shot)
            .route("periodic", periodic)
            .route("cancel", cancel)
            .build()
    }
}

#[async_trait]
impl Plugin for CallbackDispatcherPlugin {
    fn name(&self) -> &str {
        "callback_dispatcher"
    }

    async fn on_attached(&self, messenger: &Messenger) -> ChannelResult<()> {
        messenger
            .set_method_call_handler(CHANNEL, Arc::new(self.router()))
            .await
    }

    async fn on_detached(&self) {
        let aborted = self.state.cancel_all().await;
        if aborted > 0 {
            info!(aborted, "Scheduled callbacks aborted");
        }
    }
}

async fn call(state: Arc<DispatcherState>, call: MethodCall) -> Result<Value, PluginError> {
    let callback_id: String = call.required("callbackId")?;
    match state.registry.invoke(&callback_id).await {
        Some(Ok(())) => {
            debug!(callback_id = %callback_id, "Callback ran");
            Ok(Value::Null)
        }
        Some(Err(err)) => Err(err.into()),
        None => Err(unknown_callback(&callback_id)),
    }
}

async fn one_shot(state: Arc<DispatcherState>, call: MethodCall) -> Result<bool, PluginError> {
    let request_code: i64 = call.required("requestCode")?;
    let callback_id: String = call.required("callbackId")?;
    let delay = millis(&call, "delayMillis")?;
    state.ensure_registered(&callback_id).await?;

    debug!(request_code, callback_id = %callback_id, delay_ms = delay.as_millis() as u64, "Scheduling one-shot");
    state.schedule(request_code, callback_id, delay, None).await;
    Ok(true)
}

async fn periodic(state: Arc<DispatcherState>, call: MethodCall) -> Result<bool, PluginError> {
    let request_code: i64 = call.required("requestCode")?;
    let callback_id: String = call.required("callbackId")?;
    let interval = millis(&call, "intervalMillis")?;
    if interval.is_zero() {
        return Err(PluginError::new(
            codes::INVALID_ARGUMENT,
            "intervalMillis must be positive",
        ));
    }
    let delay = millis(&call, "delayMillis")?;
    state.ensure_registered(&callback_id).await?;

    debug!(request_code, callback_id = %callback_id, interval_ms = interval.as_millis() as u64, "Scheduling periodic");
    state
        .schedule(request_code, callback_id, delay, Some(interval))
        .await;
    Ok(true)
}

async fn cancel(state: Arc<DispatcherState>, call: MethodCall) -> Result<bool, PluginError> {
    let request_code: i64 = call.required("requestCode")?;
    let cancelled = state.cancel(request_code).await;
    debug!(request_code, cancelled, "Cancel scheduled request");
    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_channel::{MethodResult, OutboundMessage, Outbox, Response};
    use std::sync::atomic::AtomicUsize;

    async fn dispatch(router: &MethodRouter<DispatcherState>, call: MethodCall) -> Response {
        let (outbox, mut rx) = Outbox::channel();
        router.dispatch(call, MethodResult::new(1, "test", outbox)).await;
        match rx.recv().await.unwrap() {
            OutboundMessage::Reply { response, .. } => response,
            other => panic!("unexpected message {other:?}"),
        }
    }

    async fn counting(registry: &CallbackRegistry, id: &str) -> Arc<AtomicUsize> {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        registry
            .register(id, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        runs
    }

    fn schedule_args(request_code: i64, callback_id: &str, key: &str, millis: i64) -> Value {
        [
            ("requestCode", Value::Int(request_code)),
            ("callbackId", Value::from(callback_id)),
            (key, Value::Int(millis)),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_runs_once_and_clears() {
        let registry = CallbackRegistry::new();
        let runs = counting(&registry, "tick").await;
        let plugin = CallbackDispatcherPlugin::new(registry);
        let router = plugin.router();

        let response = dispatch(
            &router,
            MethodCall::new("oneShot", schedule_args(7, "tick", "delayMillis", 1_000)),
        )
        .await;
        assert_eq!(response, Response::Success(Value::Bool(true)));
        assert_eq!(plugin.scheduled().await, vec![7]);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(plugin.scheduled().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_repeats_until_cancelled() {
        let registry = CallbackRegistry::new();
        let runs = counting(&registry, "tick").await;
        let plugin = CallbackDispatcherPlugin::new(registry);
        let router = plugin.router();

        dispatch(
            &router,
            MethodCall::new("periodic", schedule_args(1, "tick", "intervalMillis", 100)),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(350)).await;
        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 3, "ran {seen} times");

        let cancel_args: Value = [("requestCode", Value::Int(1))].into_iter().collect();
        assert_eq!(
            dispatch(&router, MethodCall::new("cancel", cancel_args.clone())).await,
            Response::Success(Value::Bool(true))
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);

        assert_eq!(
            dispatch(&router, MethodCall::new("cancel", cancel_args)).await,
            Response::Success(Value::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_schedule_unknown_callback_rejected() {
        let plugin = CallbackDispatcherPlugin::new(CallbackRegistry::new());
        let response = dispatch(
            &plugin.router(),
            MethodCall::new("oneShot", schedule_args(1, "missing", "delayMillis", 0)),
        )
        .await;
        assert_eq!(response.error_code(), Some(codes::UNKNOWN_CALLBACK));
        assert!(plugin.scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let registry = CallbackRegistry::new();
        counting(&registry, "tick").await;
        let plugin = CallbackDispatcherPlugin::new(registry);
        let response = dispatch(
            &plugin.router(),
            MethodCall::new("periodic", schedule_args(1, "tick", "intervalMillis", 0)),
        )
        .await;
        assert_eq!(response.error_code(), Some(codes::INVALID_ARGUMENT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_aborts_scheduled() {
        let registry = CallbackRegistry::new();
        let runs = counting(&registry, "tick").await;
        let plugin = CallbackDispatcherPlugin::new(registry);
        let router = plugin.router();

        dispatch(
            &router,
            MethodCall::new("oneShot", schedule_args(3, "tick", "delayMillis", 1_000)),
        )
        .await;
        plugin.on_detached().await;
        tokio::time::sleep(Duration::from_millis(2_000)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(plugin.scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn test_registry_replace_and_unregister() {
        let registry = CallbackRegistry::new();
        assert!(!registry.register("a", || async { Ok(()) }).await);
        assert!(registry.register("a", || async { Ok(()) }).await);
        assert_eq!(registry.ids().await, vec!["a".to_string()]);

        assert!(registry.unregister("a").await);
        assert!(registry.invoke("a").await.is_none());
    }
}
